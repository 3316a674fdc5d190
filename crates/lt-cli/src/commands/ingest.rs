//! Replays a JSONL event log through the tracker runtime.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use lt_core::event::GameEvent;
use lt_core::runtime::Outcome;
use lt_core::session::CharacterKey;
use lt_db::Database;

use super::util::{load_runtime, persist_active};

/// One line of the event log: a timestamp plus the event payload.
#[derive(Debug, Deserialize)]
struct IngestRecord {
    ts: DateTime<Utc>,
    #[serde(flatten)]
    event: GameEvent,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    character: CharacterKey,
    path: &Path,
) -> Result<()> {
    let reader = open_log(path)?;
    let mut runtime = load_runtime(db, character)?;

    let mut processed = 0_usize;
    let mut skipped = 0_usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: IngestRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(line = line_no + 1, error = %err, "skipping unparseable event");
                skipped += 1;
                continue;
            }
        };
        if let Some(outcome) = runtime.tick(record.ts)? {
            report(writer, outcome)?;
        }
        if let Some(outcome) = runtime.handle_event(&record.event, record.ts)? {
            report(writer, outcome)?;
        }
        processed += 1;
    }
    persist_active(db, &runtime)?;

    writeln!(writer, "Processed {processed} events ({skipped} skipped).")?;
    Ok(())
}

/// Lines from the log file, or stdin when the path is `-`.
fn open_log(path: &Path) -> Result<Box<dyn BufRead>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(std::io::stdin())));
    }
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn report<W: Write>(writer: &mut W, outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::SessionStarted(id) => writeln!(writer, "Auto-started session {id}.")?,
        Outcome::SessionResumed => writeln!(writer, "Session resumed.")?,
        Outcome::SessionPaused(reason) => writeln!(writer, "Session paused ({reason}).")?,
        Outcome::PromptStart(source) => {
            writeln!(writer, "Start prompt raised ({source}).")?;
        }
        Outcome::PromptPause => writeln!(writer, "Pause offer raised (inactivity).")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lt_core::policy::{AutoSessionSettings, Profile};
    use std::io::Write as _;

    fn character() -> CharacterKey {
        CharacterKey::new("Vex", "Ravencrest", "Horde")
    }

    fn write_log(lines: &[&str]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        (dir, path)
    }

    #[test]
    fn handsfree_log_replay_starts_and_fills_a_session() {
        let mut db = Database::open_in_memory().unwrap();
        db.set_settings(&AutoSessionSettings::for_profile(Profile::Handsfree))
            .unwrap();
        let (_dir, path) = write_log(&[
            r#"{"ts":"2026-03-01T12:00:00Z","type":"money_gained","copper":120,"message":"You loot 1 Silver, 20 Copper"}"#,
            r#"{"ts":"2026-03-01T12:00:30Z","type":"honor_gained","amount":98}"#,
            "not json",
            r#"{"ts":"2026-03-01T12:01:00Z","type":"xp_update","current_xp":1000,"level":60,"max_level":70}"#,
            r#"{"ts":"2026-03-01T12:01:30Z","type":"xp_update","current_xp":1150,"level":60,"max_level":70}"#,
        ]);

        let mut output = Vec::new();
        run(&mut output, &mut db, character(), &path).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("Auto-started session 1."), "{output}");
        assert!(output.contains("Processed 4 events (1 skipped)."), "{output}");

        let active = db.get_active(&character()).unwrap().unwrap();
        assert_eq!(active.ledger.balance("Income:Cash:Loot"), 120);
        assert_eq!(active.gains.honor, 98);
        assert_eq!(active.gains.xp, 150);
    }

    #[test]
    fn manual_profile_replay_records_nothing() {
        let mut db = Database::open_in_memory().unwrap();
        db.set_settings(&AutoSessionSettings::for_profile(Profile::Manual))
            .unwrap();
        let (_dir, path) = write_log(&[
            r#"{"ts":"2026-03-01T12:00:00Z","type":"money_gained","copper":120,"message":"You loot 1 Silver, 20 Copper"}"#,
        ]);

        let mut output = Vec::new();
        run(&mut output, &mut db, character(), &path).unwrap();
        assert!(db.get_active(&character()).unwrap().is_none());
    }

    #[test]
    fn missing_file_is_a_clean_error() {
        let mut db = Database::open_in_memory().unwrap();
        let err = run(
            &mut Vec::new(),
            &mut db,
            character(),
            Path::new("/nonexistent/events.jsonl"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("failed to open"));
    }
}
