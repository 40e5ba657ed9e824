//! tandem-store: SQLite persistence for the tandem engine.
//!
//! Holds the scheduled actions driving the dispatch loop, plus the user,
//! conversation and translation tables the engine reads and writes around
//! them. A single connection behind a mutex serializes all access, so the
//! chat-turn path and the dispatch loop can both mutate actions without a
//! fire racing a cancel into an inconsistent state.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tokio::sync::Mutex;

use tandem_types::{Conversation, ScheduledAction, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        chat_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        summary TEXT,
        language TEXT
    );

    CREATE TABLE IF NOT EXISTS conversations (
        id INTEGER PRIMARY KEY,
        owner_id INTEGER NOT NULL REFERENCES users(id),
        message TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_conversations_owner
        ON conversations(owner_id, timestamp);

    CREATE TABLE IF NOT EXISTS scheduled_actions (
        id INTEGER PRIMARY KEY,
        owner_id INTEGER NOT NULL REFERENCES users(id),
        description TEXT NOT NULL,
        trigger_time TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1
    );
    CREATE INDEX IF NOT EXISTS idx_scheduled_actions_due
        ON scheduled_actions(is_active, trigger_time);

    CREATE TABLE IF NOT EXISTS translations (
        id INTEGER PRIMARY KEY,
        original_text TEXT NOT NULL,
        target_language TEXT NOT NULL,
        translated_text TEXT NOT NULL,
        UNIQUE(original_text, target_language)
    );
";

/// SQLite-backed storage. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        // The bundled SQLite is compiled with SQLITE_DEFAULT_FOREIGN_KEYS=1,
        // flipping the stock default. The schema's REFERENCES clauses are
        // declarative only: orphaned actions are a documented, handled state
        // (owner removed -> force-deactivate), so keep enforcement off.
        conn.execute_batch("PRAGMA foreign_keys = OFF; PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!("Store opened: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        // See `open`: the bundled SQLite enables foreign keys by default;
        // the crate is designed against stock (unenforced) REFERENCES.
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ─── Scheduled actions ───────────────────────────────────

    /// Insert an active action and return its id.
    ///
    /// `trigger_time` may lie in the past; such an action fires on the next
    /// poll. Duplicate `(owner, description)` pairs are allowed — avoiding
    /// redundant reminders is the caller's concern.
    pub async fn create_action(
        &self,
        owner_id: i64,
        description: &str,
        trigger_time: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.clone();
        let description = description.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO scheduled_actions (owner_id, description, trigger_time, is_active)
                 VALUES (?1, ?2, ?3, 1)",
                params![owner_id, description, trigger_time.to_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await?
    }

    /// Get an action by id.
    pub async fn get_action(&self, id: i64) -> Result<Option<ScheduledAction>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let result = conn
                .query_row(
                    "SELECT id, owner_id, description, trigger_time, is_active
                     FROM scheduled_actions WHERE id = ?1",
                    params![id],
                    action_from_row,
                )
                .optional()?;
            Ok(result)
        })
        .await?
    }

    /// Hard-delete an action. Returns false (not an error) when absent,
    /// so cancellation is idempotent.
    pub async fn delete_action(&self, id: i64) -> Result<bool> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.execute("DELETE FROM scheduled_actions WHERE id = ?1", params![id])?;
            Ok(count > 0)
        })
        .await?
    }

    /// All active actions with `trigger_time <= now`. The sole read path
    /// driving dispatch; no ordering is promised.
    pub async fn due_actions(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledAction>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, description, trigger_time, is_active
                 FROM scheduled_actions WHERE is_active = 1 AND trigger_time <= ?1",
            )?;
            let rows = stmt
                .query_map(params![now.to_rfc3339()], action_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?
    }

    /// Mark an action consumed. Returns whether a row actually flipped:
    /// false means the action was already retired or deleted (a lost race
    /// with a concurrent cancel), which callers treat as a benign no-op.
    pub async fn deactivate_action(&self, id: i64) -> Result<bool> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.execute(
                "UPDATE scheduled_actions SET is_active = 0 WHERE id = ?1 AND is_active = 1",
                params![id],
            )?;
            Ok(count > 0)
        })
        .await?
    }

    /// Active actions for one user, soonest first. Drives the listing shown
    /// to the model on live chat turns.
    pub async fn active_actions_for(&self, owner_id: i64) -> Result<Vec<ScheduledAction>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, description, trigger_time, is_active
                 FROM scheduled_actions
                 WHERE owner_id = ?1 AND is_active = 1
                 ORDER BY trigger_time",
            )?;
            let rows = stmt
                .query_map(params![owner_id], action_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?
    }

    // ─── Users ───────────────────────────────────────────────

    /// Register a user and return their id.
    pub async fn create_user(&self, chat_id: &str, name: &str) -> Result<i64> {
        let conn = self.conn.clone();
        let chat_id = chat_id.to_string();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO users (chat_id, name) VALUES (?1, ?2)",
                params![chat_id, name],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await?
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let result = conn
                .query_row(
                    "SELECT id, chat_id, name, summary, language FROM users WHERE id = ?1",
                    params![id],
                    user_from_row,
                )
                .optional()?;
            Ok(result)
        })
        .await?
    }

    pub async fn get_user_by_chat_id(&self, chat_id: &str) -> Result<Option<User>> {
        let conn = self.conn.clone();
        let chat_id = chat_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let result = conn
                .query_row(
                    "SELECT id, chat_id, name, summary, language FROM users WHERE chat_id = ?1",
                    params![chat_id],
                    user_from_row,
                )
                .optional()?;
            Ok(result)
        })
        .await?
    }

    /// Replace a user's summary wholesale. Returns false when the user does
    /// not exist.
    pub async fn overwrite_summary(&self, user_id: i64, summary: &str) -> Result<bool> {
        let conn = self.conn.clone();
        let summary = summary.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.execute(
                "UPDATE users SET summary = ?1 WHERE id = ?2",
                params![summary, user_id],
            )?;
            Ok(count > 0)
        })
        .await?
    }

    /// Set a user's preferred reply language.
    pub async fn set_language(&self, user_id: i64, language: &str) -> Result<bool> {
        let conn = self.conn.clone();
        let language = language.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.execute(
                "UPDATE users SET language = ?1 WHERE id = ?2",
                params![language, user_id],
            )?;
            Ok(count > 0)
        })
        .await?
    }

    // ─── Conversations ───────────────────────────────────────

    /// Append a message to a user's conversation log.
    pub async fn append_conversation(
        &self,
        owner_id: i64,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.clone();
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO conversations (owner_id, message, timestamp) VALUES (?1, ?2, ?3)",
                params![owner_id, message, timestamp.to_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await?
    }

    /// The most recent `limit` log entries for a user, newest first.
    pub async fn recent_conversations(
        &self,
        owner_id: i64,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, message, timestamp FROM conversations
                 WHERE owner_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![owner_id, limit as i64], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?
    }

    /// Number of log entries for a user. Zero (with no summary) marks a
    /// first contact.
    pub async fn conversation_count(&self, owner_id: i64) -> Result<i64> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.query_row(
                "SELECT COUNT(*) FROM conversations WHERE owner_id = ?1",
                params![owner_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await?
    }

    // ─── Translations ────────────────────────────────────────

    pub async fn get_translation(&self, text: &str, language: &str) -> Result<Option<String>> {
        let conn = self.conn.clone();
        let text = text.to_string();
        let language = language.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let result = conn
                .query_row(
                    "SELECT translated_text FROM translations
                     WHERE original_text = ?1 AND target_language = ?2",
                    params![text, language],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(result)
        })
        .await?
    }

    pub async fn put_translation(
        &self,
        text: &str,
        language: &str,
        translated: &str,
    ) -> Result<()> {
        let conn = self.conn.clone();
        let text = text.to_string();
        let language = language.to_string();
        let translated = translated.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT OR REPLACE INTO translations (original_text, target_language, translated_text)
                 VALUES (?1, ?2, ?3)",
                params![text, language, translated],
            )?;
            Ok(())
        })
        .await?
    }
}

// ─── Row mapping ─────────────────────────────────────────────

fn parse_timestamp(idx: usize, raw: String) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    raw.parse::<DateTime<Utc>>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn action_from_row(row: &Row<'_>) -> std::result::Result<ScheduledAction, rusqlite::Error> {
    Ok(ScheduledAction {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        description: row.get(2)?,
        trigger_time: parse_timestamp(3, row.get::<_, String>(3)?)?,
        is_active: row.get::<_, i64>(4)? != 0,
    })
}

fn user_from_row(row: &Row<'_>) -> std::result::Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        name: row.get(2)?,
        summary: row.get(3)?,
        language: row.get(4)?,
    })
}

fn conversation_from_row(row: &Row<'_>) -> std::result::Result<Conversation, rusqlite::Error> {
    Ok(Conversation {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        message: row.get(2)?,
        timestamp: parse_timestamp(3, row.get::<_, String>(3)?)?,
    })
}
