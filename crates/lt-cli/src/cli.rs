//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Per-session loot and progression tracker.
///
/// Tracks coin, item value, XP, reputation, and honor per play session,
/// with attributed income sources and windowed rate estimates.
#[derive(Debug, Parser)]
#[command(name = "lt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the active session and its current metrics.
    Status,

    /// Start a new session.
    Start,

    /// Stop the active session and store it in history.
    Stop,

    /// Pause the active session's clock.
    Pause {
        /// Pause reason: manual, afk, inactivity, or instance.
        #[arg(long, default_value = "manual")]
        reason: String,
    },

    /// Resume a paused session.
    Resume,

    /// Show or switch the auto-session profile.
    Profile {
        /// Profile to activate: manual, balanced, or handsfree.
        name: Option<String>,
    },

    /// Replay a JSONL event log through the tracker.
    Ingest {
        /// Path to the event log, one JSON event per line, or `-` for stdin.
        file: PathBuf,
    },

    /// Inspect and mutate session history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

/// Session history operations.
#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    /// List stored sessions, newest first.
    List {
        /// Include archived sessions.
        #[arg(long)]
        all: bool,
    },

    /// Archive a session, hiding it from default listings.
    Archive {
        id: u64,

        /// Optional reason recorded with the archive.
        #[arg(long)]
        reason: Option<String>,
    },

    /// Restore an archived session.
    Unarchive { id: u64 },

    /// Permanently delete a session.
    Delete { id: u64 },

    /// Merge two or more sessions into one.
    Merge {
        /// Session IDs to merge.
        #[arg(required = true, num_args = 2..)]
        ids: Vec<u64>,
    },

    /// Revert the most recent history mutation (within 30 seconds).
    Undo,

    /// Archive every session shorter than the given duration.
    ArchiveShort {
        /// Maximum duration in minutes for a session to count as short.
        #[arg(long, default_value_t = 5)]
        max_minutes: i64,
    },
}
