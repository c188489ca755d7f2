use crate::output;
use crate::utils::{Enrichment, load_details};
use crossbeam_channel::tick;
use eyre::{Context, Result};
use imsg_history::{Message, MessageStore};
use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, info};

pub struct WatchConfig {
    pub chat_id: Option<i64>,
    /// Start after this row id instead of the current maximum.
    pub since_row_id: Option<i64>,
    pub interval: Duration,
    pub batch_size: usize,
    pub enrich: Enrichment,
    pub json: bool,
}

/// Print new messages as they arrive. Runs until the process is interrupted.
pub fn execute(store: &MessageStore, config: &WatchConfig) -> Result<()> {
    let mut cursor = match config.since_row_id {
        Some(row_id) => row_id,
        None => store.max_row_id().wrap_err("Failed to read current max row id")?,
    };
    info!(cursor, chat_id = ?config.chat_id, "watching for new messages");

    let ticker = tick(config.interval);
    let stdout = io::stdout();
    loop {
        let mut out = stdout.lock();
        cursor = drain(store, cursor, config.chat_id, config.batch_size, |message| {
            let (attachments, reactions) = load_details(store, message, config.enrich)?;
            output::write_message(&mut out, message, &attachments, &reactions, config.json)?;
            Ok(())
        })?;
        out.flush()?;
        drop(out);

        if ticker.recv().is_err() {
            break;
        }
    }
    Ok(())
}

/// Fetch everything after `cursor` in batches, hand each message to `sink` in row-id
/// order and return the new cursor.
pub fn drain<F>(
    store: &MessageStore,
    mut cursor: i64,
    chat_id: Option<i64>,
    batch_size: usize,
    mut sink: F,
) -> Result<i64>
where
    F: FnMut(&Message) -> Result<()>,
{
    let batch_size = batch_size.max(1);
    loop {
        let batch = store
            .messages_after(cursor, chat_id, batch_size)
            .wrap_err("Failed to fetch new messages")?;
        for message in &batch {
            sink(message)?;
            cursor = cursor.max(message.row_id);
        }
        if batch.len() < batch_size {
            break;
        }
    }
    debug!(cursor, "caught up");
    Ok(cursor)
}
