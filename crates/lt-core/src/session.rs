//! Session aggregate and the duration/pause state machine.
//!
//! A session is one tracked play interval with its own ledger, duration
//! clock, and gain totals. Duration is a fold-on-pause accumulator: while
//! running, live duration is `accumulated_secs + (now - current_login_at)`;
//! pausing (or logging out) folds the elapsed segment into the accumulator
//! and clears the login timestamp, so offline time is never counted.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::Ledger;
use crate::metrics::RateState;

/// Errors from session lifecycle operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("A session is already active")]
    AlreadyActive,
    #[error("No active session")]
    NoActiveSession,
    #[error("Session is already paused")]
    AlreadyPaused,
    #[error("Session is not paused")]
    NotPaused,
}

/// Why a session was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    Manual,
    Afk,
    Inactivity,
    Instance,
}

impl PauseReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Afk => "afk",
            Self::Inactivity => "inactivity",
            Self::Instance => "instance",
        }
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PauseReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "afk" => Ok(Self::Afk),
            "inactivity" => Ok(Self::Inactivity),
            "instance" => Ok(Self::Instance),
            _ => Err(format!("invalid pause reason: {s}")),
        }
    }
}

/// The composite identity that scopes active sessions and history filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterKey {
    pub name: String,
    pub realm: String,
    pub faction: String,
}

impl CharacterKey {
    #[must_use]
    pub fn new(name: impl Into<String>, realm: impl Into<String>, faction: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            realm: realm.into(),
            faction: faction.into(),
        }
    }
}

impl fmt::Display for CharacterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.name, self.realm, self.faction)
    }
}

/// Count and appraised unit value of one looted item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemHolding {
    pub count: u32,
    /// Appraised copper value per item at loot time.
    pub unit_value: i64,
}

/// Per-category gained totals for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GainTotals {
    pub xp: i64,
    pub honor: i64,
    pub rep: i64,
    /// Reputation gained per faction, keyed by stable faction ID.
    #[serde(default)]
    pub rep_by_faction: BTreeMap<u32, i64>,
    /// Reputation still bankable by turning in held items, computed from
    /// current turn-in rules.
    #[serde(default)]
    pub turn_in_potential: i64,
}

/// One tracked play interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: u64,
    pub character: CharacterKey,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Folded active play time in seconds.
    pub accumulated_secs: i64,
    /// Set while the clock is running; `None` while paused or logged out.
    pub current_login_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<PauseReason>,

    pub ledger: Ledger,
    /// Looted item holdings keyed by item ID.
    #[serde(default)]
    pub items: BTreeMap<u32, ItemHolding>,
    #[serde(default)]
    pub gathering_nodes: u32,
    #[serde(default)]
    pub pickpockets: u32,
    #[serde(default)]
    pub gains: GainTotals,
    #[serde(default)]
    pub rates: RateState,

    // Archival flags are independent of lifecycle state.
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived_reason: Option<String>,
}

impl Session {
    /// Creates a running session starting at `now`.
    #[must_use]
    pub fn new(id: u64, character: CharacterKey, now: DateTime<Utc>) -> Self {
        Self {
            id,
            character,
            started_at: now,
            ended_at: None,
            accumulated_secs: 0,
            current_login_at: Some(now),
            paused_at: None,
            pause_reason: None,
            ledger: Ledger::new(),
            items: BTreeMap::new(),
            gathering_nodes: 0,
            pickpockets: 0,
            gains: GainTotals::default(),
            rates: RateState::default(),
            archived: false,
            archived_at: None,
            archived_reason: None,
        }
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Elapsed active play time in seconds as of `now`.
    ///
    /// Stable while paused or logged out, since the running segment has
    /// already been folded into the accumulator.
    #[must_use]
    pub fn duration_secs(&self, now: DateTime<Utc>) -> i64 {
        let live = self
            .current_login_at
            .map_or(0, |login| (now - login).num_seconds().max(0));
        self.accumulated_secs + live
    }

    /// The time reference for metrics: `paused_at` while paused, so derived
    /// rates freeze instead of decaying toward zero.
    #[must_use]
    pub fn metrics_instant(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.paused_at.unwrap_or(now)
    }

    /// Folds the running segment into the accumulator, if any.
    fn fold(&mut self, now: DateTime<Utc>) {
        if let Some(login) = self.current_login_at.take() {
            self.accumulated_secs += (now - login).num_seconds().max(0);
        }
    }

    /// Pauses the clock, recording the reason.
    pub fn pause(&mut self, reason: PauseReason, now: DateTime<Utc>) -> Result<(), TrackerError> {
        if self.is_paused() {
            return Err(TrackerError::AlreadyPaused);
        }
        self.fold(now);
        self.paused_at = Some(now);
        self.pause_reason = Some(reason);
        tracing::debug!(session = self.id, reason = %reason, "session paused");
        Ok(())
    }

    /// Resumes a paused clock.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), TrackerError> {
        if !self.is_paused() {
            return Err(TrackerError::NotPaused);
        }
        self.paused_at = None;
        self.pause_reason = None;
        self.current_login_at = Some(now);
        tracing::debug!(session = self.id, "session resumed");
        Ok(())
    }

    /// Host logout boundary: folds the running segment so offline time is
    /// never counted. Pause state survives the logout.
    pub fn fold_logout(&mut self, now: DateTime<Utc>) {
        self.fold(now);
    }

    /// Host login boundary: re-arms the clock unless the session is paused.
    pub fn login(&mut self, now: DateTime<Utc>) {
        if !self.is_paused() {
            self.current_login_at = Some(now);
        }
    }

    /// Stops the clock for good, folding any running segment.
    pub fn stop(&mut self, now: DateTime<Utc>) {
        let at = self.metrics_instant(now);
        self.fold(at);
        self.ended_at = Some(now);
    }
}

/// Formats a duration in seconds as `"2h 05m 09s"`, `"5m 09s"`, or `"42s"`.
#[must_use]
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// Formats a copper amount as `"12g 34s 56c"`, omitting leading zero units.
#[must_use]
pub fn format_money(copper: i64) -> String {
    let sign = if copper < 0 { "-" } else { "" };
    let copper = copper.abs();
    let gold = copper / 10_000;
    let silver = (copper % 10_000) / 100;
    let copper = copper % 100;
    if gold > 0 {
        format!("{sign}{gold}g {silver:02}s {copper:02}c")
    } else if silver > 0 {
        format!("{sign}{silver}s {copper:02}c")
    } else {
        format!("{sign}{copper}c")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn key() -> CharacterKey {
        CharacterKey::new("Arenvald", "Silvermoon", "Horde")
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid test timestamp")
            + Duration::seconds(secs)
    }

    #[test]
    fn running_duration_is_accumulated_plus_live() {
        let mut session = Session::new(1, key(), ts(0));
        session.accumulated_secs = 100;
        session.current_login_at = Some(ts(0));
        assert_eq!(session.duration_secs(ts(50)), 150);
    }

    #[test]
    fn pause_freezes_duration_until_resume() {
        let mut session = Session::new(1, key(), ts(0));
        session.pause(PauseReason::Manual, ts(40)).unwrap();

        assert_eq!(session.duration_secs(ts(40)), 40);
        assert_eq!(session.duration_secs(ts(500)), 40);
        assert_eq!(session.pause_reason, Some(PauseReason::Manual));

        session.resume(ts(100)).unwrap();
        assert!(session.pause_reason.is_none());
        assert_eq!(session.duration_secs(ts(130)), 70);
    }

    #[test]
    fn double_pause_and_stray_resume_fail() {
        let mut session = Session::new(1, key(), ts(0));
        assert_eq!(session.resume(ts(1)), Err(TrackerError::NotPaused));
        session.pause(PauseReason::Afk, ts(10)).unwrap();
        assert_eq!(
            session.pause(PauseReason::Manual, ts(20)),
            Err(TrackerError::AlreadyPaused)
        );
    }

    #[test]
    fn logout_folds_and_login_rearms() {
        let mut session = Session::new(1, key(), ts(0));
        session.fold_logout(ts(30));
        assert_eq!(session.accumulated_secs, 30);
        // Offline gap does not count.
        assert_eq!(session.duration_secs(ts(1000)), 30);
        session.login(ts(1000));
        assert_eq!(session.duration_secs(ts(1010)), 40);
    }

    #[test]
    fn pause_state_survives_logout() {
        let mut session = Session::new(1, key(), ts(0));
        session.pause(PauseReason::Inactivity, ts(20)).unwrap();
        session.fold_logout(ts(25));
        session.login(ts(900));
        // Still paused: login must not re-arm the clock.
        assert!(session.is_paused());
        assert_eq!(session.duration_secs(ts(950)), 20);
    }

    #[test]
    fn metrics_instant_uses_paused_at_while_paused() {
        let mut session = Session::new(1, key(), ts(0));
        assert_eq!(session.metrics_instant(ts(5)), ts(5));
        session.pause(PauseReason::Manual, ts(30)).unwrap();
        assert_eq!(session.metrics_instant(ts(500)), ts(30));
    }

    #[test]
    fn stop_while_paused_keeps_folded_duration() {
        let mut session = Session::new(1, key(), ts(0));
        session.pause(PauseReason::Manual, ts(60)).unwrap();
        session.stop(ts(600));
        assert_eq!(session.accumulated_secs, 60);
        assert_eq!(session.ended_at, Some(ts(600)));
    }

    #[test]
    fn session_serde_roundtrip() {
        let mut session = Session::new(7, key(), ts(0));
        session.ledger.post("Income:Cash:Loot", 1234);
        session.items.insert(
            30809,
            ItemHolding {
                count: 12,
                unit_value: 50,
            },
        );
        session.gains.rep_by_faction.insert(932, 250);

        let json = serde_json::to_string(&session).unwrap();
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(309), "5m 09s");
        assert_eq!(format_duration(7509), "2h 05m 09s");
        assert_eq!(format_duration(-5), "0s");
    }

    #[test]
    fn money_formatting() {
        assert_eq!(format_money(56), "56c");
        assert_eq!(format_money(3456), "34s 56c");
        assert_eq!(format_money(123_456), "12g 34s 56c");
        assert_eq!(format_money(-250), "-2s 50c");
    }
}
