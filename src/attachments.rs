use std::path::{Path, PathBuf};

/// Where an attachment lives on disk and whether it is actually there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: String,
    pub missing: bool,
}

/// Maps the `attachment.filename` column to an on-disk location.
pub trait PathResolver: Send + Sync {
    fn resolve(&self, filename: &str) -> ResolvedPath;
}

/// Expands a leading `~` against the user's home directory and checks existence.
#[derive(Debug, Clone, Default)]
pub struct HomeDirResolver {
    home: Option<PathBuf>,
}

impl HomeDirResolver {
    pub fn new() -> Self {
        Self {
            home: dirs::home_dir(),
        }
    }

    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
        }
    }
}

impl PathResolver for HomeDirResolver {
    fn resolve(&self, filename: &str) -> ResolvedPath {
        if filename.is_empty() {
            return ResolvedPath {
                path: String::new(),
                missing: true,
            };
        }
        let path = expand_tilde(Path::new(filename), self.home.as_deref());
        let missing = !path.exists();
        ResolvedPath {
            path: path.to_string_lossy().into_owned(),
            missing,
        }
    }
}

/// Replace a leading `~` component with `home`. Paths without one, or with no
/// known home directory, are returned unchanged.
pub fn expand_tilde(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn expands_home_prefix() {
        let home = Path::new("/Users/someone");
        assert_eq!(
            expand_tilde(Path::new("~/Library/Messages/chat.db"), Some(home)),
            PathBuf::from("/Users/someone/Library/Messages/chat.db")
        );
        assert_eq!(
            expand_tilde(Path::new("/abs/file.jpg"), Some(home)),
            PathBuf::from("/abs/file.jpg")
        );
        assert_eq!(expand_tilde(Path::new("~/x"), None), PathBuf::from("~/x"));
    }

    #[test]
    fn resolves_existing_and_missing_files() {
        let dir = tempdir().expect("temp");
        std::fs::create_dir_all(dir.path().join("Library/Messages/Attachments")).expect("mkdir");
        std::fs::write(dir.path().join("Library/Messages/Attachments/a.jpg"), b"jpg").expect("write");
        let resolver = HomeDirResolver::with_home(dir.path());

        let found = resolver.resolve("~/Library/Messages/Attachments/a.jpg");
        assert!(!found.missing);
        assert!(found.path.ends_with("Library/Messages/Attachments/a.jpg"));
        assert!(!found.path.starts_with('~'));

        let gone = resolver.resolve("~/Library/Messages/Attachments/b.jpg");
        assert!(gone.missing);

        assert!(resolver.resolve("").missing);
    }
}
