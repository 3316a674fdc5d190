//! Session lifecycle owner for one character.

use chrono::{DateTime, Utc};

use crate::activity::{Activity, Source};
use crate::session::{CharacterKey, ItemHolding, PauseReason, Session, TrackerError};

/// Coarse lifecycle state, for dispatching policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    None,
    Active,
    Paused(PauseReason),
}

/// Owns the at-most-one active session for a character and applies
/// classified activities to it.
#[derive(Debug)]
pub struct Tracker {
    character: CharacterKey,
    active: Option<Session>,
    next_session_id: u64,
}

impl Tracker {
    #[must_use]
    pub const fn new(character: CharacterKey, next_session_id: u64) -> Self {
        Self {
            character,
            active: None,
            next_session_id,
        }
    }

    #[must_use]
    pub const fn character(&self) -> &CharacterKey {
        &self.character
    }

    #[must_use]
    pub const fn active(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    pub const fn active_mut(&mut self) -> Option<&mut Session> {
        self.active.as_mut()
    }

    /// The next session ID this tracker will assign.
    #[must_use]
    pub const fn next_session_id(&self) -> u64 {
        self.next_session_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        match &self.active {
            None => SessionState::None,
            Some(session) => match session.pause_reason {
                Some(reason) => SessionState::Paused(reason),
                None => SessionState::Active,
            },
        }
    }

    /// Adopts a previously persisted active session, e.g. across a restart.
    ///
    /// A session recorded for a different character is ignored: the restored
    /// state must not leak across characters.
    pub fn adopt(&mut self, session: Session) {
        if session.character != self.character {
            tracing::warn!(
                session_character = %session.character,
                tracker_character = %self.character,
                "ignoring persisted session for another character"
            );
            return;
        }
        self.next_session_id = self.next_session_id.max(session.id + 1);
        self.active = Some(session);
    }

    /// Starts a fresh session, assigning the next ID.
    pub fn start_session(&mut self, now: DateTime<Utc>) -> Result<u64, TrackerError> {
        if self.active.is_some() {
            return Err(TrackerError::AlreadyActive);
        }
        let id = self.next_session_id;
        self.next_session_id += 1;
        self.active = Some(Session::new(id, self.character.clone(), now));
        tracing::info!(id, character = %self.character, "session started");
        Ok(id)
    }

    /// Stops the active session and returns it, folded and stamped, for
    /// persistence.
    pub fn stop_session(&mut self, now: DateTime<Utc>) -> Result<Session, TrackerError> {
        let mut session = self.active.take().ok_or(TrackerError::NoActiveSession)?;
        session.stop(now);
        tracing::info!(id = session.id, "session stopped");
        Ok(session)
    }

    pub fn pause(&mut self, reason: PauseReason, now: DateTime<Utc>) -> Result<(), TrackerError> {
        self.active
            .as_mut()
            .ok_or(TrackerError::NoActiveSession)?
            .pause(reason, now)
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), TrackerError> {
        self.active
            .as_mut()
            .ok_or(TrackerError::NoActiveSession)?
            .resume(now)
    }

    /// Applies one classified activity's gain to the active session.
    ///
    /// No-op without an active, unpaused session: gains while paused are
    /// deliberately not recorded.
    pub fn apply_activity(&mut self, activity: &Activity) {
        let Some(session) = self.active.as_mut().filter(|s| !s.is_paused()) else {
            return;
        };
        match activity.source {
            Source::GatheringNode => {
                if activity.amount > 0 {
                    session
                        .ledger
                        .post("Income:ItemsLooted:Gathering", activity.amount);
                } else {
                    session.gathering_nodes += 1;
                }
            }
            Source::XpQuestTurnin | Source::XpZoneDiscovery | Source::XpMobKill => {
                session.gains.xp += activity.amount;
            }
            Source::RepQuestTurnin | Source::RepItemTurnin | Source::RepMobKill
            | Source::RepOther => {
                session.gains.rep += activity.amount;
            }
            Source::HonorKill => {
                session.gains.honor += activity.amount;
            }
            source => {
                if let Some(account) = source.cash_account() {
                    session.ledger.post(account, activity.amount);
                }
                if source == Source::GoldPickpocketCoin {
                    session.pickpockets += 1;
                }
            }
        }
    }

    /// Records the per-faction breakdown behind a reputation activity.
    pub fn apply_rep_breakdown(&mut self, deltas: &[(u32, i64)]) {
        let Some(session) = self.active.as_mut().filter(|s| !s.is_paused()) else {
            return;
        };
        for &(faction_id, delta) in deltas {
            *session.gains.rep_by_faction.entry(faction_id).or_insert(0) += delta;
        }
    }

    /// Records a looted item holding on the active session.
    pub fn record_item(&mut self, item_id: u32, unit_value: i64) {
        let Some(session) = self.active.as_mut().filter(|s| !s.is_paused()) else {
            return;
        };
        let holding = session.items.entry(item_id).or_insert(ItemHolding {
            count: 0,
            unit_value,
        });
        holding.count += 1;
        holding.unit_value = unit_value;
    }
}
