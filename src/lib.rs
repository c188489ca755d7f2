//! # imsg-history
//!
//! Read chats, messages, tapbacks and attachment metadata out of the macOS Messages
//! database (`~/Library/Messages/chat.db`).
//!
//! ## What it does
//!
//! Recent versions of Messages often leave the `text` column empty and keep the body
//! only in `attributedBody`, an `NSAttributedString` archived in Apple's typed-stream
//! format. [`MessageStore`] resolves every message to plain text: the `text` column when
//! it has content, otherwise the string recovered by [`decode_attributed_body`].
//! Decoding never fails; a body that cannot be read just becomes `""`.
//!
//! The database is opened **read-only**. Your data is never modified.
//!
//! ## Tailing
//!
//! Row ids only grow, so [`MessageStore::max_row_id`] followed by repeated calls to
//! [`MessageStore::messages_after`] with the last seen row id streams new messages in
//! insertion order.
//!
//! ## Concurrency
//!
//! A store owns exactly one SQLite connection. All operations run one at a time on it,
//! from whichever thread calls them, and a call made while already inside another
//! operation runs inline rather than deadlocking. A locked database is waited on for
//! up to five seconds before the operation fails.
//!
//! ## Compatibility
//!
//! Tracks Apple's internal (undocumented) schema. `attributedBody` and the reaction
//! columns are optional; their absence is detected once when the store is opened.

pub mod attachments;
pub mod error;
pub mod mapper;
pub mod models;
pub mod serial;
pub mod store;
pub mod typedstream;

pub use attachments::{HomeDirResolver, PathResolver, ResolvedPath};
pub use error::{Result, StoreError};
pub use models::{AttachmentMeta, Chat, Message, Reaction, ReactionType};
pub use store::{MessageStore, SchemaCapabilities};
pub use typedstream::decode_attributed_body;
