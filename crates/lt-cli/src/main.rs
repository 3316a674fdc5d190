use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lt_cli::commands::{history, ingest, profile, session};
use lt_cli::{Cli, Commands, Config, HistoryAction};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(lt_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = lt_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let mut stdout = std::io::stdout().lock();
    let now = Utc::now();
    match &cli.command {
        Some(Commands::Status) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            session::status(&mut stdout, &db, config.character.key(), now)?;
        }
        Some(Commands::Start) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            session::start(&mut stdout, &mut db, config.character.key(), now)?;
        }
        Some(Commands::Stop) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            session::stop(&mut stdout, &mut db, config.character.key(), now)?;
        }
        Some(Commands::Pause { reason }) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            session::pause(&mut stdout, &mut db, config.character.key(), reason, now)?;
        }
        Some(Commands::Resume) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            session::resume(&mut stdout, &mut db, config.character.key(), now)?;
        }
        Some(Commands::Profile { name }) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            profile::run(&mut stdout, &mut db, name.as_deref())?;
        }
        Some(Commands::Ingest { file }) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            ingest::run(&mut stdout, &mut db, config.character.key(), file)?;
        }
        Some(Commands::History { action }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let character = config.character.key();
            match action {
                HistoryAction::List { all } => history::list(&mut stdout, &db, *all)?,
                HistoryAction::Archive { id, reason } => {
                    history::archive(&mut stdout, db, &character, *id, reason.as_deref(), now)?;
                }
                HistoryAction::Unarchive { id } => {
                    history::unarchive(&mut stdout, db, *id, now)?;
                }
                HistoryAction::Delete { id } => {
                    history::delete(&mut stdout, db, &character, *id, now)?;
                }
                HistoryAction::Merge { ids } => {
                    history::merge(&mut stdout, db, &character, ids, now)?;
                }
                HistoryAction::Undo => history::undo(&mut stdout, db, now)?,
                HistoryAction::ArchiveShort { max_minutes } => {
                    history::archive_short(&mut stdout, db, *max_minutes, now)?;
                }
            }
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            writeln!(stdout)?;
        }
    }

    Ok(())
}
