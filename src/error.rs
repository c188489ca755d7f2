use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be opened because the process lacks access to it.
    /// On macOS this usually means the terminal needs Full Disk Access.
    #[error(
        "permission denied opening {}: {source}\n\
         Grant Full Disk Access to your terminal (System Settings > Privacy & Security) and retry.",
        path.display()
    )]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("snapshot failed: {0}")]
    Snapshot(#[source] std::io::Error),
}

impl StoreError {
    /// Turn an error raised while opening the store into `PermissionDenied` when
    /// the engine reports an access problem. Anything else passes through.
    pub(crate) fn classify_open(err: rusqlite::Error, path: &std::path::Path) -> Self {
        if is_access_failure(&err) {
            StoreError::PermissionDenied {
                path: path.to_path_buf(),
                source: err,
            }
        } else {
            StoreError::Sqlite(err)
        }
    }
}

fn is_access_failure(err: &rusqlite::Error) -> bool {
    if let Some(code) = err.sqlite_error_code()
        && matches!(
            code,
            ErrorCode::CannotOpen
                | ErrorCode::PermissionDenied
                | ErrorCode::AuthorizationForStatementDenied
        )
    {
        return true;
    }
    let message = err.to_string().to_lowercase();
    ["out of memory (14)", "authorization denied", "unable to open database", "cannot open"]
        .iter()
        .any(|needle| message.contains(needle))
}
