use chrono::{DateTime, SecondsFormat, Utc};
use eyre::{Context, Result};
use imsg_history::{AttachmentMeta, Message, MessageStore, Reaction};
use std::path::Path;

/// Open the store the way every subcommand needs it.
pub fn open_store(db_path: &Path, snapshot: bool) -> Result<MessageStore> {
    let store = if snapshot {
        MessageStore::open_snapshot(db_path)
    } else {
        MessageStore::open(db_path)
    };
    store.wrap_err_with(|| format!("Failed to open database: {}", db_path.display()))
}

/// RFC 3339, millisecond precision, `Z` suffix.
pub fn format_timestamp(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// What to fetch alongside each message.
#[derive(Clone, Copy, Default)]
pub struct Enrichment {
    pub attachments: bool,
    pub reactions: bool,
}

/// Attachments and reactions for one message, fetched only when asked for.
pub fn load_details(
    store: &MessageStore,
    message: &Message,
    enrich: Enrichment,
) -> Result<(Vec<AttachmentMeta>, Vec<Reaction>)> {
    let attachments = if enrich.attachments && message.attachments_count > 0 {
        store
            .attachments(message.row_id)
            .wrap_err_with(|| format!("Failed to load attachments for {}", message.row_id))?
    } else {
        Vec::new()
    };
    let reactions = if enrich.reactions {
        store
            .reactions(message.row_id)
            .wrap_err_with(|| format!("Failed to load reactions for {}", message.row_id))?
    } else {
        Vec::new()
    };
    Ok((attachments, reactions))
}
