//! Core domain logic for the loot tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Accounting: the hierarchical session ledger and gain totals
//! - Classification: attributing raw telemetry events to sources
//! - Policy: auto-session start/resume/pause decisions
//! - Metrics: duration, totals, and windowed rate estimation

pub mod activity;
pub mod classify;
pub mod event;
pub mod ledger;
pub mod metrics;
pub mod policy;
pub mod runtime;
pub mod session;
pub mod tracker;
pub mod watchdog;

pub use activity::{Activity, Confidence, Source};
pub use classify::Classifier;
pub use event::{FactionStanding, GameEvent, ItemClass, ItemInfo, StaticItemTable};
pub use ledger::Ledger;
pub use metrics::{MetricsSnapshot, TurnInRules, get_metrics};
pub use policy::{
    AutoSessionSettings, PolicyDecision, PolicyEngine, Profile, PromptResponse, RuleAction,
    RuleKind,
};
pub use runtime::{Outcome, Runtime};
pub use session::{
    CharacterKey, GainTotals, ItemHolding, PauseReason, Session, TrackerError, format_duration,
    format_money,
};
pub use tracker::{SessionState, Tracker};
pub use watchdog::{Watchdog, WatchdogAction};
