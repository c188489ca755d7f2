use crate::utils::format_timestamp;
use chrono::{DateTime, Utc};
use imsg_history::{AttachmentMeta, Chat, Message, Reaction};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct Frontmatter<'a> {
    title: &'a str,
    identifier: &'a str,
    chat_id: i64,
    service: &'a str,
    last_message_at: DateTime<Utc>,
    message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_message_at: Option<DateTime<Utc>>,
}

/// A message together with what hangs off it.
pub struct ExportedMessage {
    pub message: Message,
    pub attachments: Vec<AttachmentMeta>,
    pub reactions: Vec<Reaction>,
}

/// Render one chat as Markdown with YAML frontmatter. `messages` must already be in
/// the order they should appear (oldest first).
pub fn write_chat_markdown<W: Write>(
    writer: &mut W,
    chat: &Chat,
    messages: &[ExportedMessage],
) -> std::io::Result<()> {
    let fm = Frontmatter {
        title: &chat.name,
        identifier: &chat.identifier,
        chat_id: chat.id,
        service: &chat.service,
        last_message_at: chat.last_message_at,
        message_count: messages.len(),
        first_message_at: messages.first().map(|m| m.message.date),
    };

    writeln!(writer, "---")?;
    let yaml = serde_yaml::to_string(&fm).map_err(std::io::Error::other)?;
    write!(writer, "{}", yaml)?;
    writeln!(writer, "---")?;
    writeln!(writer)?;
    writeln!(writer, "# {}", chat.name)?;
    writeln!(writer)?;

    for entry in messages {
        let message = &entry.message;
        let who = if message.is_from_me {
            "Me"
        } else if message.sender.is_empty() {
            "Unknown"
        } else {
            message.sender.as_str()
        };
        writeln!(writer, "## {} · {}", who, format_timestamp(message.date))?;
        writeln!(writer)?;
        if !message.text.is_empty() {
            writeln!(writer, "{}", message.text)?;
            writeln!(writer)?;
        }

        for meta in &entry.attachments {
            let name = if meta.transfer_name.is_empty() {
                meta.filename.as_str()
            } else {
                meta.transfer_name.as_str()
            };
            let kind = if meta.is_sticker { "sticker" } else { "attachment" };
            write!(writer, "- {}: `{}`", kind, name)?;
            if !meta.mime_type.is_empty() {
                write!(writer, " ({}, {} bytes)", meta.mime_type, meta.total_bytes)?;
            }
            if meta.missing {
                write!(writer, " (missing)")?;
            }
            writeln!(writer)?;
        }

        if !entry.reactions.is_empty() {
            let summary: Vec<String> = entry
                .reactions
                .iter()
                .map(|r| {
                    let by = if r.is_from_me { "me" } else { r.sender.as_str() };
                    format!("{} {}", r.reaction_type.emoji(), by)
                })
                .collect();
            writeln!(writer, "> {}", summary.join(", "))?;
        }

        if !entry.attachments.is_empty() || !entry.reactions.is_empty() {
            writeln!(writer)?;
        }
    }

    Ok(())
}
