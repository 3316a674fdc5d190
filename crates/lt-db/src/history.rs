//! History mutations with a short-lived undo log.
//!
//! Every mutation pushes an inverse operation onto an undo stack. Entries
//! expire after thirty seconds and the stack holds at most twenty. The
//! stack is persisted in the `meta` table so an undo works from a separate
//! invocation; the expiry keeps stale inverses from replaying against rows
//! that have since moved on. Multi-row inverses (merge, bulk archive)
//! replay inside a single transaction.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lt_core::metrics::TurnInRules;
use lt_core::session::Session;

use crate::{Database, DbError, delete_session_conn, get_session_conn, save_session_conn};

/// Undo entries older than this are discarded.
pub const UNDO_EXPIRY_SECS: i64 = 30;
/// Oldest entries are dropped beyond this depth.
pub const UNDO_MAX: usize = 20;

/// Errors from history mutations.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("session not found")]
    NotFound,
    #[error("Cannot archive active session")]
    ArchiveActive,
    #[error("Cannot delete the active session")]
    DeleteActive,
    #[error("Cannot merge the active session")]
    MergeActive,
    #[error("Need at least two unique sessions to merge")]
    MergeTooFew,
    #[error("Cannot merge archived sessions")]
    MergeArchived,
    #[error("Merge blocked: sessions must belong to the same character")]
    MergeCharacterMismatch,
    #[error("Nothing to undo")]
    NothingToUndo,
    #[error(transparent)]
    Db(#[from] DbError),
}

/// The inverse of one history mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum UndoOp {
    /// Inverse of an archive: clear the flags.
    Archive { id: u64 },
    /// Inverse of an unarchive: restore the previous flags.
    Unarchive {
        id: u64,
        archived_at: Option<DateTime<Utc>>,
        archived_reason: Option<String>,
    },
    /// Inverse of a bulk archive: clear flags on every affected row.
    ArchiveBulk { ids: Vec<u64> },
    /// Inverse of a delete: reinsert the full session.
    Delete { session: Box<Session> },
    /// Inverse of a merge: drop the merged row and reinsert the originals.
    Merge {
        merged_id: u64,
        originals: Vec<Session>,
    },
}

impl UndoOp {
    fn describe(&self) -> String {
        match self {
            Self::Archive { id } => format!("Unarchived session {id}"),
            Self::Unarchive { id, .. } => format!("Re-archived session {id}"),
            Self::ArchiveBulk { ids } => format!("Unarchived {} sessions", ids.len()),
            Self::Delete { session } => format!("Restored session {}", session.id),
            Self::Merge { originals, .. } => {
                format!("Split merge back into {} sessions", originals.len())
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UndoEntry {
    pushed_at: DateTime<Utc>,
    op: UndoOp,
}

/// History mutation front-end over a [`Database`].
pub struct History {
    db: Database,
    undo: Vec<UndoEntry>,
}

impl History {
    /// Wraps a database, loading any persisted undo log.
    ///
    /// An unparseable log is dropped rather than blocking history access.
    #[must_use]
    pub fn new(db: Database) -> Self {
        let undo = match db.get_meta("undo_log") {
            Ok(Some(data)) => serde_json::from_str(&data).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "discarding unparseable undo log");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to load undo log");
                Vec::new()
            }
        };
        Self { db, undo }
    }

    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    pub const fn database_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    #[must_use]
    pub fn into_database(self) -> Database {
        self.db
    }

    /// Archives a session. `active_id` is the live session, which cannot be
    /// archived.
    pub fn archive(
        &mut self,
        id: u64,
        reason: Option<&str>,
        active_id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<(), HistoryError> {
        if active_id == Some(id) {
            return Err(HistoryError::ArchiveActive);
        }
        let mut session = self.load(id)?;
        session.archived = true;
        session.archived_at = Some(now);
        session.archived_reason = reason.map(str::to_string);
        self.db.save_session(&session)?;
        self.push_undo(UndoOp::Archive { id }, now)?;
        Ok(())
    }

    pub fn unarchive(&mut self, id: u64, now: DateTime<Utc>) -> Result<(), HistoryError> {
        let mut session = self.load(id)?;
        let previous_at = session.archived_at;
        let previous_reason = session.archived_reason.clone();
        session.archived = false;
        session.archived_at = None;
        session.archived_reason = None;
        self.db.save_session(&session)?;
        self.push_undo(
            UndoOp::Unarchive {
                id,
                archived_at: previous_at,
                archived_reason: previous_reason,
            },
            now,
        )?;
        Ok(())
    }

    /// Archives every unarchived session shorter than `max_secs`.
    ///
    /// Returns how many sessions were archived; a single undo entry reverts
    /// the whole sweep.
    pub fn archive_short(
        &mut self,
        max_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<usize, HistoryError> {
        let (summaries, _) = self.db.list_summaries(false)?;
        let short: Vec<u64> = summaries
            .iter()
            .filter(|summary| summary.duration_secs < max_secs)
            .map(|summary| summary.id)
            .collect();
        if short.is_empty() {
            return Ok(0);
        }
        let tx = self.db.conn.transaction().map_err(DbError::from)?;
        for &id in &short {
            if let Some(mut session) = get_session_conn(&tx, id)? {
                session.archived = true;
                session.archived_at = Some(now);
                session.archived_reason = Some("short session".to_string());
                save_session_conn(&tx, &session)?;
            }
        }
        tx.commit().map_err(DbError::from)?;
        let count = short.len();
        self.push_undo(UndoOp::ArchiveBulk { ids: short }, now)?;
        tracing::info!(count, "archived short sessions");
        Ok(count)
    }

    pub fn delete(
        &mut self,
        id: u64,
        active_id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<(), HistoryError> {
        if active_id == Some(id) {
            return Err(HistoryError::DeleteActive);
        }
        let session = self.load(id)?;
        self.db.delete_session(id)?;
        self.push_undo(
            UndoOp::Delete {
                session: Box::new(session),
            },
            now,
        )?;
        Ok(())
    }

    /// Merges two or more sessions of the same character into a new one.
    ///
    /// The originals are deleted and a combined session is inserted under a
    /// freshly allocated ID, which is returned.
    pub fn merge(
        &mut self,
        ids: &[u64],
        active_id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<u64, HistoryError> {
        let mut unique: Vec<u64> = Vec::new();
        for &id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        if unique.len() < 2 {
            return Err(HistoryError::MergeTooFew);
        }
        if unique.iter().any(|&id| active_id == Some(id)) {
            return Err(HistoryError::MergeActive);
        }

        let mut originals = Vec::with_capacity(unique.len());
        for &id in &unique {
            originals.push(self.load(id)?);
        }
        if originals.iter().any(|session| session.archived) {
            return Err(HistoryError::MergeArchived);
        }
        let character = originals[0].character.clone();
        if originals
            .iter()
            .any(|session| session.character != character)
        {
            return Err(HistoryError::MergeCharacterMismatch);
        }

        let merged_id = self.db.allocate_session_id()?;
        let merged = combine_sessions(merged_id, &originals);

        let tx = self.db.conn.transaction().map_err(DbError::from)?;
        for session in &originals {
            delete_session_conn(&tx, session.id)?;
        }
        save_session_conn(&tx, &merged)?;
        tx.commit().map_err(DbError::from)?;

        tracing::info!(merged_id, count = originals.len(), "merged sessions");
        self.push_undo(UndoOp::Merge { merged_id, originals }, now)?;
        Ok(merged_id)
    }

    /// Reverts the most recent unexpired mutation and returns a short
    /// description of what was undone.
    pub fn undo(&mut self, now: DateTime<Utc>) -> Result<String, HistoryError> {
        let entry = loop {
            let Some(entry) = self.undo.pop() else {
                self.save_undo()?;
                return Err(HistoryError::NothingToUndo);
            };
            if now - entry.pushed_at <= Duration::seconds(UNDO_EXPIRY_SECS) {
                break entry;
            }
            // Expired entries are silently discarded.
        };
        self.save_undo()?;
        let description = entry.op.describe();
        self.apply_undo(entry.op)?;
        Ok(description)
    }

    fn apply_undo(&mut self, op: UndoOp) -> Result<(), HistoryError> {
        match op {
            UndoOp::Archive { id } => {
                if let Some(mut session) = self.db.get_session(id)? {
                    session.archived = false;
                    session.archived_at = None;
                    session.archived_reason = None;
                    self.db.save_session(&session)?;
                }
            }
            UndoOp::Unarchive {
                id,
                archived_at,
                archived_reason,
            } => {
                if let Some(mut session) = self.db.get_session(id)? {
                    session.archived = true;
                    session.archived_at = archived_at;
                    session.archived_reason = archived_reason;
                    self.db.save_session(&session)?;
                }
            }
            UndoOp::ArchiveBulk { ids } => {
                let tx = self.db.conn.transaction().map_err(DbError::from)?;
                for id in ids {
                    if let Some(mut session) = get_session_conn(&tx, id)? {
                        session.archived = false;
                        session.archived_at = None;
                        session.archived_reason = None;
                        save_session_conn(&tx, &session)?;
                    }
                }
                tx.commit().map_err(DbError::from)?;
            }
            UndoOp::Delete { session } => {
                let mut session = *session;
                // The old ID may have been reused since the delete.
                if self.db.get_session(session.id)?.is_some() {
                    session.id = self.db.allocate_session_id()?;
                }
                self.db.save_session(&session)?;
            }
            UndoOp::Merge {
                merged_id,
                originals,
            } => {
                let tx = self.db.conn.transaction().map_err(DbError::from)?;
                delete_session_conn(&tx, merged_id)?;
                for session in &originals {
                    save_session_conn(&tx, session)?;
                }
                tx.commit().map_err(DbError::from)?;
            }
        }
        Ok(())
    }

    fn load(&self, id: u64) -> Result<Session, HistoryError> {
        self.db.get_session(id)?.ok_or(HistoryError::NotFound)
    }

    fn push_undo(&mut self, op: UndoOp, now: DateTime<Utc>) -> Result<(), HistoryError> {
        self.undo.push(UndoEntry {
            pushed_at: now,
            op,
        });
        if self.undo.len() > UNDO_MAX {
            self.undo.remove(0);
        }
        self.save_undo()
    }

    fn save_undo(&mut self) -> Result<(), HistoryError> {
        let data = serde_json::to_string(&self.undo)
            .map_err(|err| DbError::InvalidSettings(err.to_string()))?;
        self.db.set_meta("undo_log", &data)?;
        Ok(())
    }
}

/// Builds the combined session for a merge.
///
/// Totals, counters, and item holdings sum; the duration is the sum of
/// folded play time, not the wall-clock span; rate state starts empty since
/// rate buckets from disjoint intervals are meaningless together. Turn-in
/// potential is recomputed from the combined holdings under current rules.
fn combine_sessions(merged_id: u64, originals: &[Session]) -> Session {
    let started_at = originals
        .iter()
        .map(|session| session.started_at)
        .min()
        .unwrap_or_default();
    let ended_at = originals.iter().filter_map(|session| session.ended_at).max();

    let mut merged = Session::new(merged_id, originals[0].character.clone(), started_at);
    merged.current_login_at = None;
    merged.ended_at = ended_at;
    for session in originals {
        merged.accumulated_secs += session.accumulated_secs;
        merged.ledger.merge(&session.ledger);
        merged.gathering_nodes += session.gathering_nodes;
        merged.pickpockets += session.pickpockets;
        merged.gains.xp += session.gains.xp;
        merged.gains.rep += session.gains.rep;
        merged.gains.honor += session.gains.honor;
        for (&faction_id, &delta) in &session.gains.rep_by_faction {
            *merged.gains.rep_by_faction.entry(faction_id).or_insert(0) += delta;
        }
        for (&item_id, holding) in &session.items {
            let entry = merged.items.entry(item_id).or_default();
            entry.count += holding.count;
            entry.unit_value = holding.unit_value;
        }
    }
    merged.gains.turn_in_potential = TurnInRules::default().potential(&merged.items);
    merged
}
