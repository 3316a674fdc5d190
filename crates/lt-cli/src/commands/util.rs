//! Shared helpers for command implementations.

use anyhow::Result;

use lt_core::event::StaticItemTable;
use lt_core::runtime::Runtime;
use lt_core::session::CharacterKey;
use lt_core::tracker::Tracker;
use lt_db::Database;

/// Builds a runtime for the configured character, adopting any persisted
/// active session.
pub(crate) fn load_runtime(db: &Database, character: CharacterKey) -> Result<Runtime> {
    let settings = db.get_settings()?;
    let next_id = db.peek_next_session_id()?;
    let mut tracker = Tracker::new(character.clone(), next_id);
    if let Some(active) = db.get_active(&character)? {
        tracker.adopt(active);
    }
    Ok(Runtime::new(
        tracker,
        settings,
        Box::new(StaticItemTable::with_defaults()),
    ))
}

/// Writes the runtime's active-session state back, keeping the ID allocator
/// ahead of anything the tracker handed out.
pub(crate) fn persist_active(db: &mut Database, runtime: &Runtime) -> Result<()> {
    match runtime.tracker().active() {
        Some(session) => {
            db.set_active(session)?;
            db.raise_last_session_id(session.id)?;
        }
        None => db.clear_active(runtime.tracker().character())?,
    }
    Ok(())
}
