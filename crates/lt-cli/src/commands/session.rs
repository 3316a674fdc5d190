//! Session lifecycle commands: status, start, stop, pause, resume.

use std::io::Write;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};

use lt_core::session::{CharacterKey, PauseReason, format_duration, format_money};
use lt_db::Database;

use super::util::{load_runtime, persist_active};

pub fn status<W: Write>(
    writer: &mut W,
    db: &Database,
    character: CharacterKey,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut runtime = load_runtime(db, character)?;
    writeln!(writer, "Character: {}", runtime.tracker().character())?;

    let Some(metrics) = runtime.metrics(now) else {
        writeln!(writer, "No active session.")?;
        return Ok(());
    };
    let session = runtime
        .tracker()
        .active()
        .ok_or_else(|| anyhow!("metrics without a session"))?;
    let state = match session.pause_reason {
        Some(reason) => format!("paused ({reason})"),
        None => "running".to_string(),
    };
    writeln!(writer, "Session {} ({state})", session.id)?;
    writeln!(writer, "Duration: {}", format_duration(metrics.duration_secs))?;
    writeln!(
        writer,
        "Cash: {} ({}/hr)",
        format_money(metrics.cash),
        format_money(metrics.cash_per_hour)
    )?;
    writeln!(
        writer,
        "Inventory: {} ({}/hr)",
        format_money(metrics.inventory_value),
        format_money(metrics.inventory_per_hour)
    )?;
    writeln!(
        writer,
        "Total: {} ({}/hr, recent {}/hr)",
        format_money(metrics.total_value),
        format_money(metrics.total_per_hour),
        format_money(metrics.recent_gold_rate)
    )?;
    writeln!(
        writer,
        "XP: {} ({}/hr, recent {}/hr)",
        metrics.xp, metrics.xp_per_hour, metrics.recent_xp_rate
    )?;
    writeln!(
        writer,
        "Rep: {} ({}/hr, recent {}/hr)",
        metrics.rep, metrics.rep_per_hour, metrics.recent_rep_rate
    )?;
    writeln!(
        writer,
        "Honor: {} ({}/hr, recent {}/hr)",
        metrics.honor, metrics.honor_per_hour, metrics.recent_honor_rate
    )?;
    if metrics.turn_in_potential > 0 {
        writeln!(writer, "Turn-in potential: {} rep", metrics.turn_in_potential)?;
    }
    Ok(())
}

pub fn start<W: Write>(
    writer: &mut W,
    db: &mut Database,
    character: CharacterKey,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut runtime = load_runtime(db, character)?;
    let id = runtime.start_session(now)?;
    persist_active(db, &runtime)?;
    writeln!(writer, "Started session {id}.")?;
    Ok(())
}

pub fn stop<W: Write>(
    writer: &mut W,
    db: &mut Database,
    character: CharacterKey,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut runtime = load_runtime(db, character)?;
    let session = runtime.stop_session(now)?;
    db.save_session(&session)?;
    db.raise_last_session_id(session.id)?;
    persist_active(db, &runtime)?;

    let cash = session.ledger.subtree_total("Income:Cash")
        - session.ledger.subtree_total("Expense");
    writeln!(
        writer,
        "Stopped session {}: {} played, {} cash.",
        session.id,
        format_duration(session.accumulated_secs),
        format_money(cash)
    )?;
    Ok(())
}

pub fn pause<W: Write>(
    writer: &mut W,
    db: &mut Database,
    character: CharacterKey,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let reason: PauseReason = reason.parse().map_err(|err: String| anyhow!(err))?;
    let mut runtime = load_runtime(db, character)?;
    runtime.pause(reason, now)?;
    persist_active(db, &runtime)?;
    writeln!(writer, "Paused ({reason}).")?;
    Ok(())
}

pub fn resume<W: Write>(
    writer: &mut W,
    db: &mut Database,
    character: CharacterKey,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut runtime = load_runtime(db, character)?;
    runtime.resume(now)?;
    persist_active(db, &runtime)?;
    writeln!(writer, "Resumed.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use insta::assert_snapshot;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid test timestamp")
            + chrono::Duration::seconds(secs)
    }

    fn character() -> CharacterKey {
        CharacterKey::new("Vex", "Ravencrest", "Horde")
    }

    #[test]
    fn start_then_status_then_stop() {
        let mut db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        start(&mut output, &mut db, character(), ts(0)).unwrap();

        status(&mut output, &db, character(), ts(309)).unwrap();
        stop(&mut output, &mut db, character(), ts(400)).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Started session 1.
        Character: Vex-Ravencrest-Horde
        Session 1 (running)
        Duration: 5m 09s
        Cash: 0c (0c/hr)
        Inventory: 0c (0c/hr)
        Total: 0c (0c/hr, recent 0c/hr)
        XP: 0 (0/hr, recent 0/hr)
        Rep: 0 (0/hr, recent 0/hr)
        Honor: 0 (0/hr, recent 0/hr)
        Stopped session 1: 6m 40s played, 0c cash.
        ");

        // The stopped session landed in history and the active slot cleared.
        assert!(db.get_active(&character()).unwrap().is_none());
        assert!(db.get_session(1).unwrap().is_some());
    }

    #[test]
    fn double_start_is_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        start(&mut output, &mut db, character(), ts(0)).unwrap();
        let err = start(&mut output, &mut db, character(), ts(1)).unwrap_err();
        assert_eq!(err.to_string(), "A session is already active");
    }

    #[test]
    fn pause_freezes_status_duration() {
        let mut db = Database::open_in_memory().unwrap();
        let mut sink = Vec::new();
        start(&mut sink, &mut db, character(), ts(0)).unwrap();
        pause(&mut sink, &mut db, character(), "afk", ts(60)).unwrap();

        let mut output = Vec::new();
        status(&mut output, &db, character(), ts(500)).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("Session 1 (paused (afk))"), "{output}");
        assert!(output.contains("Duration: 1m 00s"), "{output}");

        resume(&mut sink, &mut db, character(), ts(500)).unwrap();
        let resumed = db.get_active(&character()).unwrap().unwrap();
        assert!(!resumed.is_paused());
    }

    #[test]
    fn invalid_pause_reason_errors() {
        let mut db = Database::open_in_memory().unwrap();
        let mut sink = Vec::new();
        start(&mut sink, &mut db, character(), ts(0)).unwrap();
        let err = pause(&mut sink, &mut db, character(), "coffee", ts(1)).unwrap_err();
        assert_eq!(err.to_string(), "invalid pause reason: coffee");
    }

    #[test]
    fn session_ids_continue_across_invocations() {
        let mut db = Database::open_in_memory().unwrap();
        let mut sink = Vec::new();
        start(&mut sink, &mut db, character(), ts(0)).unwrap();
        stop(&mut sink, &mut db, character(), ts(10)).unwrap();
        start(&mut sink, &mut db, character(), ts(20)).unwrap();
        let active = db.get_active(&character()).unwrap().unwrap();
        assert_eq!(active.id, 2);
    }
}
