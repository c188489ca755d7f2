use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, backup::Backup, params, params_from_iter, types::Value};
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

use crate::attachments::{HomeDirResolver, PathResolver, expand_tilde};
use crate::error::{Result, StoreError};
use crate::mapper;
use crate::models::{AttachmentMeta, Chat, Message, Reaction, ReactionType};
use crate::serial::SerialConnection;
use crate::typedstream::decode_attributed_body;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Optional parts of the `message` schema, probed once when the store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaCapabilities {
    /// `message.attributedBody` exists.
    pub attributed_body: bool,
    /// `message.guid`, `associated_message_guid` and `associated_message_type` exist.
    pub reactions: bool,
}

impl SchemaCapabilities {
    pub fn detect(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare("PRAGMA table_info(message)")?;
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<_>>()?;
        let has = |name: &str| columns.iter().any(|c| c.eq_ignore_ascii_case(name));
        Ok(Self {
            attributed_body: has("attributedBody"),
            reactions: has("guid")
                && has("associated_message_guid")
                && has("associated_message_type"),
        })
    }
}

/// Read-only access to a Messages `chat.db`.
pub struct MessageStore {
    path: PathBuf,
    conn: SerialConnection,
    capabilities: SchemaCapabilities,
    resolver: Box<dyn PathResolver>,
    // Keeps the snapshot copy alive for as long as the store reads from it.
    _snapshot: Option<NamedTempFile>,
}

impl MessageStore {
    /// `~/Library/Messages/chat.db`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join("Library/Messages/chat.db"))
    }

    pub fn open_default() -> Result<Self> {
        let path = Self::default_path().unwrap_or_else(|| PathBuf::from("chat.db"));
        Self::open(path)
    }

    /// Open the database read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = expand_tilde(path.as_ref(), dirs::home_dir().as_deref());
        let conn = open_read_only(&path).map_err(|e| StoreError::classify_open(e, &path))?;
        Self::with_connection(conn, path, None, None)
    }

    /// Copy the live database into a temporary file with SQLite's backup API and
    /// read from the copy.
    pub fn open_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let path = expand_tilde(path.as_ref(), dirs::home_dir().as_deref());
        let src = open_read_only(&path).map_err(|e| StoreError::classify_open(e, &path))?;

        let tmp = NamedTempFile::new().map_err(StoreError::Snapshot)?;
        {
            let mut dst = Connection::open(tmp.path())?;
            let backup = Backup::new(&src, &mut dst)?;
            backup.run_to_completion(1000, Duration::from_millis(5), None)?;
        }
        drop(src);
        debug!(source = %path.display(), copy = %tmp.path().display(), "snapshot taken");

        let conn = open_read_only(tmp.path())?;
        Self::with_connection(conn, path, None, Some(tmp))
    }

    /// Wrap an already open connection. `attributed_body` overrides detection of the
    /// `attributedBody` column when set.
    pub fn from_connection(
        conn: Connection,
        path: impl Into<PathBuf>,
        attributed_body: Option<bool>,
    ) -> Result<Self> {
        Self::with_connection(conn, path.into(), attributed_body, None)
    }

    fn with_connection(
        conn: Connection,
        path: PathBuf,
        attributed_body: Option<bool>,
        snapshot: Option<NamedTempFile>,
    ) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| StoreError::classify_open(e, &path))?;
        let mut capabilities =
            SchemaCapabilities::detect(&conn).map_err(|e| match e {
                StoreError::Sqlite(e) => StoreError::classify_open(e, &path),
                other => other,
            })?;
        if let Some(flag) = attributed_body {
            capabilities.attributed_body = flag;
        }
        if !capabilities.attributed_body {
            warn!("message.attributedBody not present, falling back to plain text only");
        }
        if !capabilities.reactions {
            warn!("message reaction columns not present, reactions will be empty");
        }
        debug!(path = %path.display(), ?capabilities, "message store opened");

        Ok(Self {
            path,
            conn: SerialConnection::new(conn),
            capabilities,
            resolver: Box::new(HomeDirResolver::new()),
            _snapshot: snapshot,
        })
    }

    /// Replace the attachment path resolver.
    pub fn with_resolver(mut self, resolver: impl PathResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capabilities(&self) -> SchemaCapabilities {
        self.capabilities
    }

    fn body_column(&self) -> &'static str {
        if self.capabilities.attributed_body {
            "m.attributedBody"
        } else {
            "NULL"
        }
    }

    /// Chats ordered by their most recent message, newest first. Chats sharing the
    /// same last timestamp come back in whatever order SQLite produces.
    pub fn list_chats(&self, limit: usize) -> Result<Vec<Chat>> {
        let sql = "SELECT c.ROWID, IFNULL(c.display_name, c.chat_identifier) AS name, \
                          c.chat_identifier, c.service_name, MAX(m.date) AS last_date \
                   FROM chat c \
                   JOIN chat_message_join cmj ON c.ROWID = cmj.chat_id \
                   JOIN message m ON m.ROWID = cmj.message_id \
                   GROUP BY c.ROWID \
                   ORDER BY last_date DESC \
                   LIMIT ?1";
        let chats = self.conn.with_connection(|conn| -> Result<Vec<Chat>> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params![sql_limit(limit)], |row| {
                let identifier = mapper::text(row, 2)?;
                let mut name = mapper::text(row, 1)?;
                if name.is_empty() {
                    name = identifier.clone();
                }
                Ok(Chat {
                    id: mapper::i64_or_zero(row, 0)?,
                    identifier,
                    name,
                    service: mapper::text(row, 3)?,
                    last_message_at: mapper::date(row, 4)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })?;
        trace!(count = chats.len(), "list_chats");
        Ok(chats)
    }

    /// Messages in one chat, newest first.
    pub fn messages(&self, chat_id: i64, limit: usize) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT m.ROWID, m.handle_id, h.id, IFNULL(m.text, '') AS text, m.date, \
                    m.is_from_me, m.service, \
                    (SELECT COUNT(*) FROM message_attachment_join maj \
                     WHERE maj.message_id = m.ROWID) AS attachments, \
                    {} AS body \
             FROM message m \
             JOIN chat_message_join cmj ON m.ROWID = cmj.message_id \
             LEFT JOIN handle h ON m.handle_id = h.ROWID \
             WHERE cmj.chat_id = ?1 \
             ORDER BY m.date DESC \
             LIMIT ?2",
            self.body_column()
        );
        let messages = self.conn.with_connection(|conn| -> Result<Vec<Message>> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![chat_id, sql_limit(limit)], |row| {
                Ok(Message {
                    row_id: mapper::i64_or_zero(row, 0)?,
                    chat_id,
                    handle_id: mapper::opt_i64(row, 1)?,
                    sender: mapper::text(row, 2)?,
                    text: resolve_text(mapper::text(row, 3)?, &mapper::blob(row, 8)?),
                    date: mapper::date(row, 4)?,
                    is_from_me: mapper::flag(row, 5)?,
                    service: mapper::text(row, 6)?,
                    attachments_count: mapper::i64_or_zero(row, 7)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })?;
        trace!(chat_id, count = messages.len(), "messages");
        Ok(messages)
    }

    /// Messages with a row id strictly greater than `after_row_id`, oldest first.
    ///
    /// This is the tailing cursor: feed the last returned `row_id` back in to
    /// continue. When a row has no chat association the requested `chat_id` (or 0)
    /// is reported instead of dropping the row.
    pub fn messages_after(
        &self,
        after_row_id: i64,
        chat_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let mut sql = format!(
            "SELECT m.ROWID, cmj.chat_id, m.handle_id, h.id, IFNULL(m.text, '') AS text, \
                    m.date, m.is_from_me, m.service, \
                    (SELECT COUNT(*) FROM message_attachment_join maj \
                     WHERE maj.message_id = m.ROWID) AS attachments, \
                    {} AS body \
             FROM message m \
             LEFT JOIN chat_message_join cmj ON m.ROWID = cmj.message_id \
             LEFT JOIN handle h ON m.handle_id = h.ROWID \
             WHERE m.ROWID > ?",
            self.body_column()
        );
        let mut bindings: Vec<Value> = vec![after_row_id.into()];
        if let Some(chat_id) = chat_id {
            sql.push_str(" AND cmj.chat_id = ?");
            bindings.push(chat_id.into());
        }
        sql.push_str(" ORDER BY m.ROWID ASC LIMIT ?");
        bindings.push(sql_limit(limit).into());

        let messages = self.conn.with_connection(|conn| -> Result<Vec<Message>> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(bindings), |row| {
                Ok(Message {
                    row_id: mapper::i64_or_zero(row, 0)?,
                    chat_id: mapper::opt_i64(row, 1)?.or(chat_id).unwrap_or(0),
                    handle_id: mapper::opt_i64(row, 2)?,
                    sender: mapper::text(row, 3)?,
                    text: resolve_text(mapper::text(row, 4)?, &mapper::blob(row, 9)?),
                    date: mapper::date(row, 5)?,
                    is_from_me: mapper::flag(row, 6)?,
                    service: mapper::text(row, 7)?,
                    attachments_count: mapper::i64_or_zero(row, 8)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })?;
        trace!(after_row_id, ?chat_id, count = messages.len(), "messages_after");
        Ok(messages)
    }

    /// Tapbacks added to `message_id`, oldest first. Removal rows and unknown codes
    /// are not returned.
    ///
    /// A reaction points at its target either by bare guid or by a part-qualified
    /// `p:N/<guid>`. Matching strips everything up to the first `/`, so the lookup
    /// scans the reaction columns rather than using an index on them.
    pub fn reactions(&self, message_id: i64) -> Result<Vec<Reaction>> {
        if !self.capabilities.reactions {
            return Ok(Vec::new());
        }
        let sql = "SELECT r.ROWID, r.associated_message_type, h.id, r.is_from_me, r.date \
                   FROM message m \
                   JOIN message r ON substr(r.associated_message_guid, \
                                            instr(r.associated_message_guid, '/') + 1) = m.guid \
                   LEFT JOIN handle h ON r.handle_id = h.ROWID \
                   WHERE m.ROWID = ?1 \
                     AND r.associated_message_type >= ?2 \
                     AND r.associated_message_type <= ?3 \
                   ORDER BY r.date ASC";
        let reactions = self.conn.with_connection(|conn| -> Result<Vec<Reaction>> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(
                params![
                    message_id,
                    ReactionType::ADD_BASE,
                    ReactionType::ADD_BASE + 5
                ],
                |row| {
                    let code = mapper::opt_i64(row, 1)?.unwrap_or(0);
                    let Some(reaction_type) = ReactionType::classify(code) else {
                        return Ok(None);
                    };
                    Ok(Some(Reaction {
                        row_id: mapper::i64_or_zero(row, 0)?,
                        reaction_type,
                        sender: mapper::text(row, 2)?,
                        is_from_me: mapper::flag(row, 3)?,
                        date: mapper::date(row, 4)?,
                        associated_message_id: message_id,
                    }))
                },
            )?;
            let mut reactions = Vec::new();
            for row in rows {
                if let Some(reaction) = row? {
                    reactions.push(reaction);
                }
            }
            Ok(reactions)
        })?;
        trace!(message_id, count = reactions.len(), "reactions");
        Ok(reactions)
    }

    /// Attachment metadata for one message. Paths are resolved through the
    /// configured [`PathResolver`].
    pub fn attachments(&self, message_id: i64) -> Result<Vec<AttachmentMeta>> {
        let sql = "SELECT a.filename, a.transfer_name, a.uti, a.mime_type, a.total_bytes, \
                          a.is_sticker \
                   FROM message_attachment_join maj \
                   JOIN attachment a ON a.ROWID = maj.attachment_id \
                   WHERE maj.message_id = ?1";
        let resolver = self.resolver.as_ref();
        let metas = self.conn.with_connection(|conn| -> Result<Vec<AttachmentMeta>> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params![message_id], |row| {
                let filename = mapper::text(row, 0)?;
                let resolved = resolver.resolve(&filename);
                Ok(AttachmentMeta {
                    filename,
                    transfer_name: mapper::text(row, 1)?,
                    uti: mapper::text(row, 2)?,
                    mime_type: mapper::text(row, 3)?,
                    total_bytes: mapper::i64_or_zero(row, 4)?,
                    is_sticker: mapper::flag(row, 5)?,
                    original_path: resolved.path,
                    missing: resolved.missing,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })?;
        trace!(message_id, count = metas.len(), "attachments");
        Ok(metas)
    }

    /// Highest message row id, or 0 for an empty store. Seeds a tailing cursor.
    pub fn max_row_id(&self) -> Result<i64> {
        self.conn.with_connection(|conn| -> Result<i64> {
            let value = conn.query_row("SELECT MAX(ROWID) FROM message", [], |row| {
                mapper::opt_i64(row, 0)
            })?;
            Ok(value.unwrap_or(0))
        })
    }
}

fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

/// The `text` column wins whenever it is non-empty; otherwise decode the body.
pub fn resolve_text(text: String, body: &[u8]) -> String {
    if text.is_empty() {
        decode_attributed_body(body)
    } else {
        text
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
