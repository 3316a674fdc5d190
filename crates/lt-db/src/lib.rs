//! Storage layer for the loot tracker.
//!
//! Provides persistence for finished sessions, the per-character active
//! session, and tracker metadata using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but
//! not `Sync`. Wrap it in a `Mutex` or use one instance per thread for
//! multi-threaded access.
//!
//! # Schema
//!
//! Timestamps are stored as TEXT in ISO 8601 format (e.g.,
//! `2024-01-15T10:30:00Z`), so lexicographic ordering matches chronological
//! ordering. The `data` column carries the full session as JSON; the other
//! columns are denormalized copies used for filtering and sorting without
//! parsing every payload. Unparseable payloads are skipped (and counted)
//! rather than failing whole listings.

pub mod history;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rayon::prelude::*;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use lt_core::policy::AutoSessionSettings;
use lt_core::session::{CharacterKey, Session};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to encode or parse a session payload.
    #[error("invalid session data for {session_id}: {message}")]
    InvalidSessionData { session_id: u64, message: String },
    /// Failed to parse a persisted settings payload.
    #[error("invalid settings data: {0}")]
    InvalidSettings(String),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A cheap listing row derived from a stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: u64,
    pub character: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: i64,
    pub cash: i64,
    pub inventory_value: i64,
    pub xp: i64,
    pub rep: i64,
    pub honor: i64,
    pub archived: bool,
    pub archived_reason: Option<String>,
}

impl SessionSummary {
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        let cash = session.ledger.subtree_total("Income:Cash")
            - session.ledger.subtree_total("Expense");
        Self {
            id: session.id,
            character: session.character.to_string(),
            started_at: session.started_at,
            ended_at: session.ended_at,
            duration_secs: session.accumulated_secs,
            cash,
            inventory_value: session.ledger.subtree_total("Income:ItemsLooted"),
            xp: session.gains.xp,
            rep: session.gains.rep,
            honor: session.gains.honor,
            archived: session.archived,
            archived_reason: session.archived_reason.clone(),
        }
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Finished sessions. data: full session JSON payload.
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY,
                character TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                archived INTEGER NOT NULL DEFAULT 0,
                archived_at TEXT,
                archived_reason TEXT,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_character ON sessions(character);
            CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);

            -- At most one live session per character, carried across restarts.
            CREATE TABLE IF NOT EXISTS active_sessions (
                character TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Inserts or replaces a finished session.
    pub fn save_session(&mut self, session: &Session) -> Result<(), DbError> {
        save_session_conn(&self.conn, session)
    }

    /// Loads one session by ID.
    pub fn get_session(&self, id: u64) -> Result<Option<Session>, DbError> {
        get_session_conn(&self.conn, id)
    }

    /// Deletes one session by ID, returning whether a row existed.
    pub fn delete_session(&mut self, id: u64) -> Result<bool, DbError> {
        delete_session_conn(&self.conn, id)
    }

    /// Lists session summaries newest-first, plus the count of rows whose
    /// payloads failed to parse and were skipped.
    pub fn list_summaries(
        &self,
        include_archived: bool,
    ) -> Result<(Vec<SessionSummary>, usize), DbError> {
        let filter = if include_archived {
            ""
        } else {
            "WHERE archived = 0"
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, data FROM sessions {filter} ORDER BY started_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut raw = Vec::new();
        for row in rows {
            raw.push(row?);
        }

        let parsed: Vec<Option<SessionSummary>> = raw
            .par_iter()
            .map(|(id, data)| match serde_json::from_str::<Session>(data) {
                Ok(session) => Some(SessionSummary::from_session(&session)),
                Err(err) => {
                    tracing::warn!(id, error = %err, "skipping unparseable session row");
                    None
                }
            })
            .collect();
        let skipped = parsed.iter().filter(|entry| entry.is_none()).count();
        Ok((parsed.into_iter().flatten().collect(), skipped))
    }

    /// Allocates and returns the next session ID.
    pub fn allocate_session_id(&mut self) -> Result<u64, DbError> {
        let next = self.peek_next_session_id()?;
        self.set_meta("last_session_id", &next.to_string())?;
        Ok(next)
    }

    /// The ID the next allocation will return, without consuming it.
    pub fn peek_next_session_id(&self) -> Result<u64, DbError> {
        let last = self
            .get_meta("last_session_id")?
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0);
        Ok(last + 1)
    }

    /// Raises the allocation floor so future IDs never collide with `id`.
    pub fn raise_last_session_id(&mut self, id: u64) -> Result<(), DbError> {
        let last = self
            .get_meta("last_session_id")?
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0);
        if id > last {
            self.set_meta("last_session_id", &id.to_string())?;
        }
        Ok(())
    }

    /// Loads the persisted active session for a character, if any.
    pub fn get_active(&self, character: &CharacterKey) -> Result<Option<Session>, DbError> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM active_sessions WHERE character = ?",
                [character.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            None => Ok(None),
            Some(data) => serde_json::from_str(&data)
                .map(Some)
                .map_err(|err| DbError::InvalidSessionData {
                    session_id: 0,
                    message: err.to_string(),
                }),
        }
    }

    /// Persists the active session for its character.
    pub fn set_active(&mut self, session: &Session) -> Result<(), DbError> {
        let data = encode_session(session)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO active_sessions (character, data) VALUES (?, ?)",
            params![session.character.to_string(), data],
        )?;
        Ok(())
    }

    /// Removes the persisted active session for a character.
    pub fn clear_active(&mut self, character: &CharacterKey) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM active_sessions WHERE character = ?",
            [character.to_string()],
        )?;
        Ok(())
    }

    /// Loads the persisted auto-session settings, or defaults if unset.
    pub fn get_settings(&self) -> Result<AutoSessionSettings, DbError> {
        match self.get_meta("auto_session")? {
            None => Ok(AutoSessionSettings::default()),
            Some(data) => serde_json::from_str(&data)
                .map_err(|err| DbError::InvalidSettings(err.to_string())),
        }
    }

    pub fn set_settings(&mut self, settings: &AutoSessionSettings) -> Result<(), DbError> {
        let data = serde_json::to_string(settings)
            .map_err(|err| DbError::InvalidSettings(err.to_string()))?;
        self.set_meta("auto_session", &data)
    }

    pub(crate) fn get_meta(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    pub(crate) fn set_meta(&mut self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }
}

fn encode_session(session: &Session) -> Result<String, DbError> {
    serde_json::to_string(session).map_err(|err| DbError::InvalidSessionData {
        session_id: session.id,
        message: err.to_string(),
    })
}

/// Insert-or-replace on a borrowed connection, reusable inside transactions.
pub(crate) fn save_session_conn(conn: &Connection, session: &Session) -> Result<(), DbError> {
    let data = encode_session(session)?;
    conn.execute(
        "
        INSERT OR REPLACE INTO sessions
        (id, character, started_at, ended_at, archived, archived_at, archived_reason, data)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            to_db_id(session.id),
            session.character.to_string(),
            format_timestamp(session.started_at),
            session.ended_at.map(format_timestamp),
            session.archived,
            session.archived_at.map(format_timestamp),
            session.archived_reason,
            data,
        ],
    )?;
    Ok(())
}

pub(crate) fn get_session_conn(conn: &Connection, id: u64) -> Result<Option<Session>, DbError> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM sessions WHERE id = ?",
            [to_db_id(id)],
            |row| row.get(0),
        )
        .optional()?;
    match data {
        None => Ok(None),
        Some(data) => serde_json::from_str(&data)
            .map(Some)
            .map_err(|err| DbError::InvalidSessionData {
                session_id: id,
                message: err.to_string(),
            }),
    }
}

pub(crate) fn delete_session_conn(conn: &Connection, id: u64) -> Result<bool, DbError> {
    let deleted = conn.execute("DELETE FROM sessions WHERE id = ?", [to_db_id(id)])?;
    Ok(deleted > 0)
}

#[expect(
    clippy::cast_possible_wrap,
    reason = "session IDs are small sequential counters"
)]
pub(crate) const fn to_db_id(id: u64) -> i64 {
    id as i64
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
