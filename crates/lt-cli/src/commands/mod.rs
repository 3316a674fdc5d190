//! CLI subcommand implementations.

pub mod history;
pub mod ingest;
pub mod profile;
pub mod session;
mod util;
