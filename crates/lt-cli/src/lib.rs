//! Loot tracker CLI library.
//!
//! This crate provides the CLI interface for the loot tracker.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, HistoryAction};
pub use config::{CharacterConfig, Config};
