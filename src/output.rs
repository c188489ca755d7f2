//! Line-oriented output: one JSON object per line with `--json`, a short human
//! readable line otherwise.

use crate::utils::format_timestamp;
use imsg_history::{AttachmentMeta, Chat, Message, Reaction};
use serde::Serialize;
use std::io::{self, Write};

#[derive(Serialize)]
pub struct ChatPayload<'a> {
    id: i64,
    name: &'a str,
    identifier: &'a str,
    service: &'a str,
    last_message_at: String,
}

impl<'a> From<&'a Chat> for ChatPayload<'a> {
    fn from(chat: &'a Chat) -> Self {
        Self {
            id: chat.id,
            name: &chat.name,
            identifier: &chat.identifier,
            service: &chat.service,
            last_message_at: format_timestamp(chat.last_message_at),
        }
    }
}

#[derive(Serialize)]
pub struct MessagePayload<'a> {
    id: i64,
    chat_id: i64,
    sender: &'a str,
    is_from_me: bool,
    text: &'a str,
    created_at: String,
    attachments: Vec<AttachmentPayload<'a>>,
    reactions: Vec<ReactionPayload<'a>>,
}

impl<'a> MessagePayload<'a> {
    pub fn new(
        message: &'a Message,
        attachments: &'a [AttachmentMeta],
        reactions: &'a [Reaction],
    ) -> Self {
        Self {
            id: message.row_id,
            chat_id: message.chat_id,
            sender: &message.sender,
            is_from_me: message.is_from_me,
            text: &message.text,
            created_at: format_timestamp(message.date),
            attachments: attachments.iter().map(AttachmentPayload::from).collect(),
            reactions: reactions.iter().map(ReactionPayload::from).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct ReactionPayload<'a> {
    id: i64,
    #[serde(rename = "type")]
    kind: &'static str,
    emoji: &'static str,
    sender: &'a str,
    is_from_me: bool,
    created_at: String,
}

impl<'a> From<&'a Reaction> for ReactionPayload<'a> {
    fn from(reaction: &'a Reaction) -> Self {
        Self {
            id: reaction.row_id,
            kind: reaction.reaction_type.name(),
            emoji: reaction.reaction_type.emoji(),
            sender: &reaction.sender,
            is_from_me: reaction.is_from_me,
            created_at: format_timestamp(reaction.date),
        }
    }
}

#[derive(Serialize)]
pub struct AttachmentPayload<'a> {
    filename: &'a str,
    transfer_name: &'a str,
    uti: &'a str,
    mime_type: &'a str,
    total_bytes: i64,
    is_sticker: bool,
    original_path: &'a str,
    missing: bool,
}

impl<'a> From<&'a AttachmentMeta> for AttachmentPayload<'a> {
    fn from(meta: &'a AttachmentMeta) -> Self {
        Self {
            filename: &meta.filename,
            transfer_name: &meta.transfer_name,
            uti: &meta.uti,
            mime_type: &meta.mime_type,
            total_bytes: meta.total_bytes,
            is_sticker: meta.is_sticker,
            original_path: &meta.original_path,
            missing: meta.missing,
        }
    }
}

pub fn write_chat<W: Write>(out: &mut W, chat: &Chat, json: bool) -> io::Result<()> {
    if json {
        serde_json::to_writer(&mut *out, &ChatPayload::from(chat))?;
        writeln!(out)
    } else {
        writeln!(
            out,
            "[{}] {} ({}) last={}",
            chat.id,
            chat.name,
            chat.identifier,
            format_timestamp(chat.last_message_at)
        )
    }
}

pub fn write_message<W: Write>(
    out: &mut W,
    message: &Message,
    attachments: &[AttachmentMeta],
    reactions: &[Reaction],
    json: bool,
) -> io::Result<()> {
    if json {
        serde_json::to_writer(
            &mut *out,
            &MessagePayload::new(message, attachments, reactions),
        )?;
        return writeln!(out);
    }

    let who = if message.is_from_me {
        "me"
    } else if message.sender.is_empty() {
        "unknown"
    } else {
        message.sender.as_str()
    };
    write!(
        out,
        "{} [{}] {}: {}",
        format_timestamp(message.date),
        message.row_id,
        who,
        message.text
    )?;
    if message.attachments_count > 0 {
        write!(out, " (attachments: {})", message.attachments_count)?;
    }
    writeln!(out)?;
    for meta in attachments {
        let name = if meta.transfer_name.is_empty() {
            meta.filename.as_str()
        } else {
            meta.transfer_name.as_str()
        };
        let missing = if meta.missing { " [missing]" } else { "" };
        writeln!(out, "    attachment: {} ({}){}", name, meta.mime_type, missing)?;
    }
    for reaction in reactions {
        let who = if reaction.is_from_me {
            "me"
        } else {
            reaction.sender.as_str()
        };
        writeln!(
            out,
            "    {} {} by {}",
            reaction.reaction_type.emoji(),
            reaction.reaction_type,
            who
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imsg_history::ReactionType;
    use imsg_history::mapper::apple_date;

    fn message() -> Message {
        Message {
            row_id: 7,
            chat_id: 1,
            sender: "+123".into(),
            text: "hello".into(),
            date: apple_date(Some(0)),
            is_from_me: false,
            service: "iMessage".into(),
            handle_id: Some(1),
            attachments_count: 1,
        }
    }

    #[test]
    fn json_message_uses_snake_case_keys() {
        let reaction = Reaction {
            row_id: 9,
            reaction_type: ReactionType::Laugh,
            sender: "+456".into(),
            is_from_me: true,
            date: apple_date(Some(0)),
            associated_message_id: 7,
        };
        let meta = AttachmentMeta {
            filename: "~/a.jpg".into(),
            transfer_name: "a.jpg".into(),
            uti: "public.jpeg".into(),
            mime_type: "image/jpeg".into(),
            total_bytes: 12,
            is_sticker: false,
            original_path: "/Users/x/a.jpg".into(),
            missing: true,
        };
        let mut out = Vec::new();
        write_message(&mut out, &message(), &[meta], &[reaction], true).expect("write");
        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(value["id"], 7);
        assert_eq!(value["chat_id"], 1);
        assert_eq!(value["created_at"], "2001-01-01T00:00:00.000Z");
        assert_eq!(value["reactions"][0]["type"], "laugh");
        assert_eq!(value["reactions"][0]["emoji"], "😂");
        assert_eq!(value["attachments"][0]["mime_type"], "image/jpeg");
        assert_eq!(value["attachments"][0]["missing"], true);
        assert!(out.ends_with(b"\n"));
    }

    #[test]
    fn human_line_mentions_sender_and_text() {
        let mut out = Vec::new();
        write_message(&mut out, &message(), &[], &[], false).expect("write");
        let line = String::from_utf8(out).expect("utf8");
        assert!(line.contains("+123: hello"));
        assert!(line.contains("(attachments: 1)"));
    }
}
