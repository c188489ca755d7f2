//! Read-only projections of the Messages database.
//!
//! Every record here is built fresh from one query row and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// A conversation, one row of the `chat` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chat {
    pub id: i64,
    /// Stable identifier (`chat_identifier`): a phone number, email or group id.
    pub identifier: String,
    /// `display_name`, falling back to the identifier when unnamed.
    pub name: String,
    pub service: String,
    pub last_message_at: DateTime<Utc>,
}

/// A message with its text already resolved.
///
/// `text` is the `text` column when non-empty, otherwise whatever could be
/// recovered from `attributedBody`. It is never an error and never absent;
/// an undecodable body simply yields `""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub row_id: i64,
    pub chat_id: i64,
    /// Handle id of the sender (`""` when unknown or sent by this account).
    pub sender: String,
    pub text: String,
    pub date: DateTime<Utc>,
    pub is_from_me: bool,
    pub service: String,
    pub handle_id: Option<i64>,
    pub attachments_count: i64,
}

/// A tapback attached to another message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reaction {
    /// Row id of the message row carrying the reaction.
    pub row_id: i64,
    pub reaction_type: ReactionType,
    pub sender: String,
    pub is_from_me: bool,
    pub date: DateTime<Utc>,
    /// Row id of the message being reacted to.
    pub associated_message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentMeta {
    pub filename: String,
    pub transfer_name: String,
    pub uti: String,
    pub mime_type: String,
    pub total_bytes: i64,
    pub is_sticker: bool,
    /// Absolute on-disk path as produced by the configured resolver.
    pub original_path: String,
    pub missing: bool,
}

/// The six tapback kinds.
///
/// Stored in `message.associated_message_type`: `2000..=2005` adds a reaction,
/// `3000..=3005` removes the same kind again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionType {
    Love,
    Like,
    Dislike,
    Laugh,
    Emphasis,
    Question,
}

impl ReactionType {
    pub const ALL: [ReactionType; 6] = [
        ReactionType::Love,
        ReactionType::Like,
        ReactionType::Dislike,
        ReactionType::Laugh,
        ReactionType::Emphasis,
        ReactionType::Question,
    ];

    pub const ADD_BASE: i64 = 2000;
    pub const REMOVE_BASE: i64 = 3000;

    /// Map an "add" code (`2000..=2005`) to its kind. Any other value is not a reaction.
    pub fn classify(code: i64) -> Option<ReactionType> {
        if !Self::is_add(code) {
            return None;
        }
        Self::from_offset(code - Self::ADD_BASE)
    }

    /// Map a removal code (`3000..=3005`) to the kind it retracts.
    pub fn classify_removal(code: i64) -> Option<ReactionType> {
        if !Self::is_removal(code) {
            return None;
        }
        Self::classify(code - (Self::REMOVE_BASE - Self::ADD_BASE))
    }

    pub fn is_add(code: i64) -> bool {
        (Self::ADD_BASE..Self::ADD_BASE + 6).contains(&code)
    }

    pub fn is_removal(code: i64) -> bool {
        (Self::REMOVE_BASE..Self::REMOVE_BASE + 6).contains(&code)
    }

    fn from_offset(offset: i64) -> Option<ReactionType> {
        let index = usize::try_from(offset).ok()?;
        Self::ALL.get(index).copied()
    }

    /// The code written when this reaction is added.
    pub fn code(self) -> i64 {
        let offset = Self::ALL
            .iter()
            .position(|kind| *kind == self)
            .unwrap_or_default();
        Self::ADD_BASE + offset as i64
    }

    pub fn name(self) -> &'static str {
        match self {
            ReactionType::Love => "love",
            ReactionType::Like => "like",
            ReactionType::Dislike => "dislike",
            ReactionType::Laugh => "laugh",
            ReactionType::Emphasis => "emphasis",
            ReactionType::Question => "question",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            ReactionType::Love => "❤️",
            ReactionType::Like => "👍",
            ReactionType::Dislike => "👎",
            ReactionType::Laugh => "😂",
            ReactionType::Emphasis => "‼️",
            ReactionType::Question => "❓",
        }
    }
}

impl std::fmt::Display for ReactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ReactionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_codes_map_in_order() {
        let kinds: Vec<_> = (2000..=2005).filter_map(ReactionType::classify).collect();
        assert_eq!(kinds, ReactionType::ALL.to_vec());
        assert_eq!(ReactionType::classify(2000), Some(ReactionType::Love));
        assert_eq!(ReactionType::classify(2003), Some(ReactionType::Laugh));
        assert_eq!(ReactionType::classify(2005), Some(ReactionType::Question));
    }

    #[test]
    fn out_of_range_codes_are_not_reactions() {
        for code in [i64::MIN, -1, 0, 1999, 2006, 2999, 3000, 9999, i64::MAX] {
            assert_eq!(ReactionType::classify(code), None, "code {code}");
        }
    }

    #[test]
    fn removal_codes_map_back_to_the_same_kind() {
        assert_eq!(ReactionType::classify_removal(3000), ReactionType::classify(2000));
        assert_eq!(ReactionType::classify_removal(3001), Some(ReactionType::Like));
        assert_eq!(ReactionType::classify_removal(3005), ReactionType::classify(2005));
        assert_eq!(ReactionType::classify_removal(2999), None);
        assert_eq!(ReactionType::classify_removal(3006), None);
        assert_eq!(ReactionType::classify_removal(2000), None);
    }

    #[test]
    fn range_predicates() {
        assert!(ReactionType::is_add(2000));
        assert!(ReactionType::is_add(2005));
        assert!(!ReactionType::is_add(1999));
        assert!(!ReactionType::is_add(2006));
        assert!(ReactionType::is_removal(3000));
        assert!(ReactionType::is_removal(3005));
        assert!(!ReactionType::is_removal(2999));
        assert!(!ReactionType::is_removal(3006));
    }

    #[test]
    fn names_emoji_and_codes() {
        assert_eq!(ReactionType::Love.name(), "love");
        assert_eq!(ReactionType::Love.emoji(), "❤️");
        assert_eq!(ReactionType::Like.emoji(), "👍");
        assert_eq!(ReactionType::Dislike.emoji(), "👎");
        assert_eq!(ReactionType::Laugh.emoji(), "😂");
        assert_eq!(ReactionType::Emphasis.emoji(), "‼️");
        assert_eq!(ReactionType::Question.emoji(), "❓");
        for kind in ReactionType::ALL {
            assert_eq!(ReactionType::classify(kind.code()), Some(kind));
        }
    }

    #[test]
    fn serializes_as_name() {
        let json = serde_json::to_string(&ReactionType::Emphasis).expect("serialize");
        assert_eq!(json, "\"emphasis\"");
    }
}
