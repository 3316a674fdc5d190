//! Inactivity watchdog.
//!
//! Tracks the time since the last attributed gain and escalates through a
//! pause offer to a forced pause. AFK handling lives in the runtime and is
//! independent of this timer.

use chrono::{DateTime, Duration, Utc};

use crate::policy::PauseSettings;

/// What the watchdog wants done after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    None,
    /// Offer to pause; raised once per idle episode.
    PromptPause,
    /// Pause unconditionally.
    ForcePause,
}

#[derive(Debug, Default)]
pub struct Watchdog {
    last_activity: Option<DateTime<Utc>>,
    prompted_this_episode: bool,
}

impl Watchdog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Any attributed gain resets the idle clock and re-arms the prompt.
    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        self.last_activity = Some(now);
        self.prompted_this_episode = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Evaluates idle thresholds. The caller polls this on its own cadence
    /// and only while a session is active and unpaused.
    pub fn tick(&mut self, settings: &PauseSettings, now: DateTime<Utc>) -> WatchdogAction {
        let Some(last) = self.last_activity else {
            // Arm on the first tick so a session with no gains still idles out.
            self.last_activity = Some(now);
            return WatchdogAction::None;
        };
        let idle = now - last;
        if idle >= Duration::minutes(settings.pause_minutes) {
            return WatchdogAction::ForcePause;
        }
        if idle >= Duration::minutes(settings.prompt_minutes) && !self.prompted_this_episode {
            self.prompted_this_episode = true;
            return WatchdogAction::PromptPause;
        }
        WatchdogAction::None
    }
}
