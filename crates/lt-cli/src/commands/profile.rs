//! Auto-session profile command.

use std::io::Write;

use anyhow::{Result, anyhow};

use lt_core::policy::{AutoSessionSettings, Profile};
use lt_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &mut Database, name: Option<&str>) -> Result<()> {
    match name {
        None => show(writer, &db.get_settings()?),
        Some(name) => {
            let profile: Profile = name.parse().map_err(|err: String| anyhow!(err))?;
            let settings = AutoSessionSettings::for_profile(profile);
            db.set_settings(&settings)?;
            writeln!(writer, "Profile set to {profile}.")?;
            Ok(())
        }
    }
}

fn show<W: Write>(writer: &mut W, settings: &AutoSessionSettings) -> Result<()> {
    writeln!(writer, "Profile: {}", settings.profile)?;
    writeln!(
        writer,
        "Auto-session: {}",
        if settings.enabled { "enabled" } else { "disabled" }
    )?;
    writeln!(
        writer,
        "AFK pause: {}",
        if settings.pause.afk_enabled {
            "enabled"
        } else {
            "disabled"
        }
    )?;
    writeln!(
        writer,
        "Inactivity: prompt after {}m, pause after {}m",
        settings.pause.prompt_minutes, settings.pause.pause_minutes
    )?;
    Ok(())
}
