//! Session history commands.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};

use lt_core::session::{CharacterKey, format_duration, format_money};
use lt_db::history::History;
use lt_db::{Database, SessionSummary};

pub fn list<W: Write>(writer: &mut W, db: &Database, all: bool) -> Result<()> {
    let (summaries, skipped) = db.list_summaries(all)?;
    if summaries.is_empty() {
        writeln!(writer, "No sessions recorded.")?;
    }
    for summary in &summaries {
        writeln!(writer, "{}", render_summary(summary))?;
    }
    if skipped > 0 {
        writeln!(writer, "Skipped {skipped} unreadable sessions.")?;
    }
    Ok(())
}

fn render_summary(summary: &SessionSummary) -> String {
    let suffix = if summary.archived {
        summary.archived_reason.as_ref().map_or_else(
            || "  (archived)".to_string(),
            |reason| format!("  (archived: {reason})"),
        )
    } else {
        String::new()
    };
    format!(
        "#{}  {}  {}  cash {}  loot {}  xp {}  rep {}  honor {}{}",
        summary.id,
        summary.started_at.format("%Y-%m-%d %H:%M"),
        format_duration(summary.duration_secs),
        format_money(summary.cash),
        format_money(summary.inventory_value),
        summary.xp,
        summary.rep,
        summary.honor,
        suffix,
    )
}

pub fn archive<W: Write>(
    writer: &mut W,
    db: Database,
    character: &CharacterKey,
    id: u64,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let active_id = active_session_id(&db, character)?;
    let mut history = History::new(db);
    history.archive(id, reason, active_id, now)?;
    writeln!(writer, "Archived session {id}.")?;
    Ok(())
}

pub fn unarchive<W: Write>(
    writer: &mut W,
    db: Database,
    id: u64,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut history = History::new(db);
    history.unarchive(id, now)?;
    writeln!(writer, "Unarchived session {id}.")?;
    Ok(())
}

pub fn delete<W: Write>(
    writer: &mut W,
    db: Database,
    character: &CharacterKey,
    id: u64,
    now: DateTime<Utc>,
) -> Result<()> {
    let active_id = active_session_id(&db, character)?;
    let mut history = History::new(db);
    history.delete(id, active_id, now)?;
    writeln!(writer, "Deleted session {id}.")?;
    Ok(())
}

pub fn merge<W: Write>(
    writer: &mut W,
    db: Database,
    character: &CharacterKey,
    ids: &[u64],
    now: DateTime<Utc>,
) -> Result<()> {
    let active_id = active_session_id(&db, character)?;
    let mut history = History::new(db);
    let merged_id = history.merge(ids, active_id, now)?;
    writeln!(writer, "Merged {} sessions into #{merged_id}.", ids.len())?;
    Ok(())
}

pub fn undo<W: Write>(writer: &mut W, db: Database, now: DateTime<Utc>) -> Result<()> {
    let mut history = History::new(db);
    let description = history.undo(now)?;
    writeln!(writer, "{description}.")?;
    Ok(())
}

pub fn archive_short<W: Write>(
    writer: &mut W,
    db: Database,
    max_minutes: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut history = History::new(db);
    let count = history.archive_short(max_minutes * 60, now)?;
    writeln!(writer, "Archived {count} short sessions.")?;
    Ok(())
}

fn active_session_id(db: &Database, character: &CharacterKey) -> Result<Option<u64>> {
    Ok(db.get_active(character)?.map(|session| session.id))
}
