use crate::exporter::{self, ExportedMessage};
use crate::utils::{Enrichment, load_details};
use eyre::{Context, Result};
use imsg_history::{Chat, MessageStore};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ExportConfig {
    pub target_dir: PathBuf,
    pub chat_limit: usize,
    /// Most recent messages to keep per chat.
    pub message_limit: usize,
    pub quiet: bool,
    pub verbose: bool,
}

/// Write one Markdown file per chat into `config.target_dir`.
pub fn execute(store: &MessageStore, config: &ExportConfig) -> Result<()> {
    fs::create_dir_all(&config.target_dir).wrap_err_with(|| {
        format!(
            "Failed to create target directory: {}",
            config.target_dir.display()
        )
    })?;

    let chats = store
        .list_chats(config.chat_limit)
        .wrap_err("Failed to list chats")?;

    let pb = if config.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(chats.len() as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)",
        )
        .wrap_err("Invalid progress template")?
        .progress_chars("=>-");
        bar.set_style(style);
        bar.println(format!("Found {} chats.", chats.len()));
        bar
    };

    let mut written = 0usize;
    let mut errors = 0usize;
    for chat in &chats {
        match export_chat(store, chat, config) {
            Ok(path) => {
                written += 1;
                if config.verbose {
                    pb.println(format!("Wrote:  {}", path.display()));
                }
            }
            Err(e) => {
                errors += 1;
                pb.println(format!("Error [{}]: {:#}", chat.id, e));
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();

    if !config.quiet {
        let mut summary = format!("Done. {} chats exported.", written);
        if errors > 0 {
            summary.push_str(&format!(" Completed with {} error(s).", errors));
        }
        eprintln!("{}", summary);
    }

    Ok(())
}

fn export_chat(store: &MessageStore, chat: &Chat, config: &ExportConfig) -> Result<PathBuf> {
    let mut messages = store
        .messages(chat.id, config.message_limit)
        .wrap_err("Failed to load messages")?;
    // Newest first from the store; files read oldest first.
    messages.reverse();

    let enrich = Enrichment {
        attachments: true,
        reactions: true,
    };
    let mut entries = Vec::with_capacity(messages.len());
    for message in messages {
        let (attachments, reactions) = load_details(store, &message, enrich)?;
        entries.push(ExportedMessage {
            message,
            attachments,
            reactions,
        });
    }

    let path = chat_path(&config.target_dir, chat);
    let file = File::create(&path)
        .wrap_err_with(|| format!("Failed to create: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    exporter::write_chat_markdown(&mut writer, chat, &entries)
        .wrap_err("Failed to write chat markdown")?;
    writer.flush().wrap_err("Failed to flush markdown file")?;
    debug!(chat_id = chat.id, messages = entries.len(), path = %path.display(), "exported");
    Ok(path)
}

/// `<chat id>_<slug>.md`, or just `<chat id>.md` when the name slugs to nothing.
fn chat_path(target_dir: &Path, chat: &Chat) -> PathBuf {
    let raw_slug = slug::slugify(&chat.name);
    // slug output is ASCII-only, so byte == char
    let slug = raw_slug[..raw_slug.len().min(60)].trim_end_matches('-');
    let stem = if slug.is_empty() {
        chat.id.to_string()
    } else {
        format!("{}_{}", chat.id, slug)
    };
    target_dir.join(format!("{}.md", stem))
}
