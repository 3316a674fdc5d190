//! Auto-session policy engine.
//!
//! Decides, per classified activity, whether to start a session, resume a
//! paused one, raise a prompt, or do nothing. All decisions are driven by a
//! persisted rule table; profiles are just rule-table generators.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::{Activity, Confidence, Source};
use crate::session::{PauseReason, TrackerError};
use crate::tracker::{SessionState, Tracker};

/// Prompts dismiss themselves after this long without a response.
pub const PROMPT_TIMEOUT_SECS: i64 = 30;
/// Minimum spacing between prompts for the same source.
const PROMPT_COOLDOWN_SECS: i64 = 20;

/// Sources that must never auto-start a session: they fire on deferred
/// payouts (mail, auction, trade, vendor) that say nothing about the player
/// farming right now. Profiles pin these to `Off` for start rules.
pub const PINNED_START_OFF: [Source; 4] = [
    Source::GoldMail,
    Source::GoldAuctionPayout,
    Source::GoldTradeOrCod,
    Source::GoldVendorSale,
];

/// Sources that indicate active play; profiles build their rules from these.
const CORE_SOURCES: [Source; 9] = [
    Source::GoldMobLootCoin,
    Source::GoldQuestReward,
    Source::GoldPickpocketCoin,
    Source::GoldLockboxCoin,
    Source::GoldTreasureOrContainerCoin,
    Source::GatheringNode,
    Source::XpMobKill,
    Source::XpQuestTurnin,
    Source::HonorKill,
];

/// What a rule can do when its source fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Off,
    Prompt,
    Auto,
}

/// Which transition a rule governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Start,
    Resume,
}

/// Overall prompting posture, on top of per-source rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Prompt for any non-`Off` source.
    Always,
    /// Prompt only on `Prompt` rules or low-confidence attributions.
    Smart,
}

/// Named rule-table generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Manual,
    Balanced,
    Handsfree,
}

impl Profile {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Balanced => "balanced",
            Self::Handsfree => "handsfree",
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "balanced" => Ok(Self::Balanced),
            "handsfree" => Ok(Self::Handsfree),
            other => Err(format!("invalid profile: {other}")),
        }
    }
}

/// Per-source rules for starting and resuming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTable {
    #[serde(default)]
    pub start: BTreeMap<Source, RuleAction>,
    #[serde(default)]
    pub resume: BTreeMap<Source, RuleAction>,
}

/// Inactivity thresholds for the pause watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseSettings {
    /// Pause automatically when the player flags AFK.
    pub afk_enabled: bool,
    /// Minutes of silence before offering to pause.
    pub prompt_minutes: i64,
    /// Minutes of silence before pausing unconditionally.
    pub pause_minutes: i64,
}

impl Default for PauseSettings {
    fn default() -> Self {
        Self {
            afk_enabled: true,
            prompt_minutes: 5,
            pause_minutes: 10,
        }
    }
}

/// The full persisted auto-session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSessionSettings {
    pub enabled: bool,
    pub profile: Profile,
    pub prompt_mode: PromptMode,
    pub rules: RuleTable,
    pub pause: PauseSettings,
    /// Only auto-resume sessions the system itself paused; a manual pause
    /// stays paused until the player says otherwise.
    pub only_if_auto_paused: bool,
}

impl Default for AutoSessionSettings {
    fn default() -> Self {
        Self::for_profile(Profile::Balanced)
    }
}

impl AutoSessionSettings {
    /// Generates the rule table for a named profile.
    ///
    /// The pin on [`PINNED_START_OFF`] is enforced here, at generation time.
    /// An explicit later `set_rule` (a player answering "Always" on a prompt)
    /// may still override it.
    #[must_use]
    pub fn for_profile(profile: Profile) -> Self {
        let mut rules = RuleTable::default();
        let (start_action, resume_action) = match profile {
            Profile::Manual => (RuleAction::Off, RuleAction::Off),
            Profile::Balanced => (RuleAction::Prompt, RuleAction::Auto),
            Profile::Handsfree => (RuleAction::Auto, RuleAction::Auto),
        };
        for source in CORE_SOURCES {
            rules.start.insert(source, start_action);
            rules.resume.insert(source, resume_action);
        }
        for source in PINNED_START_OFF {
            rules.start.insert(source, RuleAction::Off);
        }
        Self {
            enabled: profile != Profile::Manual,
            profile,
            prompt_mode: PromptMode::Smart,
            rules,
            pause: PauseSettings::default(),
            only_if_auto_paused: true,
        }
    }

    /// Looks up the configured action; unlisted sources are `Off`.
    ///
    /// Resume rules never prompt: a `Prompt` resume rule acts as `Off`.
    #[must_use]
    pub fn source_action(&self, kind: RuleKind, source: Source) -> RuleAction {
        let table = match kind {
            RuleKind::Start => &self.rules.start,
            RuleKind::Resume => &self.rules.resume,
        };
        let action = table.get(&source).copied().unwrap_or(RuleAction::Off);
        if kind == RuleKind::Resume && action == RuleAction::Prompt {
            RuleAction::Off
        } else {
            action
        }
    }

    pub fn set_rule(&mut self, kind: RuleKind, source: Source, action: RuleAction) {
        let table = match kind {
            RuleKind::Start => &mut self.rules.start,
            RuleKind::Resume => &mut self.rules.resume,
        };
        table.insert(source, action);
    }

    /// Whether this activity should raise a start prompt.
    #[must_use]
    pub fn should_prompt(&self, source: Source, action: RuleAction, confidence: Confidence) -> bool {
        if PINNED_START_OFF.contains(&source) {
            // Pinned sources prompt only when explicitly configured to.
            return action == RuleAction::Prompt;
        }
        match self.prompt_mode {
            PromptMode::Always => action != RuleAction::Off,
            PromptMode::Smart => action == RuleAction::Prompt || confidence == Confidence::Low,
        }
    }
}

/// A start prompt awaiting the player's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPrompt {
    pub source: Source,
    pub shown_at: DateTime<Utc>,
}

/// The player's answer to a start prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResponse {
    /// Start this once.
    Start,
    /// Dismiss this once.
    NotNow,
    /// Start, and auto-start this source from now on.
    Always,
    /// Dismiss, and never ask about this source again.
    Never,
}

/// What the policy engine did with an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    None,
    Started(u64),
    Resumed,
    Prompted(Source),
}

/// The policy engine: settings plus prompt bookkeeping.
#[derive(Debug, Default)]
pub struct PolicyEngine {
    settings: AutoSessionSettings,
    pending_prompt: Option<PendingPrompt>,
    last_prompt_at: BTreeMap<Source, DateTime<Utc>>,
}

impl PolicyEngine {
    #[must_use]
    pub fn new(settings: AutoSessionSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &AutoSessionSettings {
        &self.settings
    }

    pub const fn settings_mut(&mut self) -> &mut AutoSessionSettings {
        &mut self.settings
    }

    /// Whether resumes happen without being asked, judged by the resume rule
    /// of a representative core source. Gates AFK auto-resume.
    #[must_use]
    pub fn auto_resume_enabled(&self) -> bool {
        self.settings.enabled
            && self
                .settings
                .source_action(RuleKind::Resume, Source::GoldMobLootCoin)
                == RuleAction::Auto
    }

    /// The live prompt, if it has not yet timed out.
    #[must_use]
    pub fn pending_prompt(&self, now: DateTime<Utc>) -> Option<PendingPrompt> {
        self.pending_prompt.filter(|prompt| {
            now - prompt.shown_at <= Duration::seconds(PROMPT_TIMEOUT_SECS)
        })
    }

    /// Drops prompt state; called at session boundaries.
    pub fn reset_prompts(&mut self) {
        self.pending_prompt = None;
        self.last_prompt_at.clear();
    }

    /// Routes one classified activity through the rule table.
    pub fn process_activity(
        &mut self,
        tracker: &mut Tracker,
        activity: &Activity,
        now: DateTime<Utc>,
    ) -> Result<PolicyDecision, TrackerError> {
        if !self.settings.enabled {
            return Ok(PolicyDecision::None);
        }
        match tracker.state() {
            SessionState::None => self.consider_start(tracker, activity, now),
            SessionState::Paused(reason) => self.consider_resume(tracker, activity, reason, now),
            SessionState::Active => Ok(PolicyDecision::None),
        }
    }

    fn consider_start(
        &mut self,
        tracker: &mut Tracker,
        activity: &Activity,
        now: DateTime<Utc>,
    ) -> Result<PolicyDecision, TrackerError> {
        if activity.should_suppress {
            return Ok(PolicyDecision::None);
        }
        let action = self.settings.source_action(RuleKind::Start, activity.source);
        if action == RuleAction::Auto && activity.confidence > Confidence::Low {
            let id = tracker.start_session(now)?;
            tracing::info!(source = %activity.source, id, "auto-started session");
            return Ok(PolicyDecision::Started(id));
        }
        if self
            .settings
            .should_prompt(activity.source, action, activity.confidence)
            && action != RuleAction::Off
            && self.pending_prompt(now).is_none()
            && !self.in_cooldown(activity.source, now)
        {
            self.pending_prompt = Some(PendingPrompt {
                source: activity.source,
                shown_at: now,
            });
            self.last_prompt_at.insert(activity.source, now);
            return Ok(PolicyDecision::Prompted(activity.source));
        }
        Ok(PolicyDecision::None)
    }

    fn consider_resume(
        &mut self,
        tracker: &mut Tracker,
        activity: &Activity,
        reason: PauseReason,
        now: DateTime<Utc>,
    ) -> Result<PolicyDecision, TrackerError> {
        if self.settings.only_if_auto_paused && reason == PauseReason::Manual {
            return Ok(PolicyDecision::None);
        }
        let action = self
            .settings
            .source_action(RuleKind::Resume, activity.source);
        if action == RuleAction::Auto {
            tracker.resume(now)?;
            tracing::info!(source = %activity.source, "auto-resumed session");
            return Ok(PolicyDecision::Resumed);
        }
        Ok(PolicyDecision::None)
    }

    /// Applies the player's answer to the live prompt. Returns the started
    /// session ID if one was started. Answers to an already-dismissed prompt
    /// are no-ops.
    pub fn respond_prompt(
        &mut self,
        tracker: &mut Tracker,
        response: PromptResponse,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, TrackerError> {
        let Some(prompt) = self.pending_prompt(now) else {
            self.pending_prompt = None;
            return Ok(None);
        };
        self.pending_prompt = None;
        match response {
            PromptResponse::Start => Ok(Some(tracker.start_session(now)?)),
            PromptResponse::NotNow => Ok(None),
            PromptResponse::Always => {
                self.settings
                    .set_rule(RuleKind::Start, prompt.source, RuleAction::Auto);
                Ok(Some(tracker.start_session(now)?))
            }
            PromptResponse::Never => {
                self.settings
                    .set_rule(RuleKind::Start, prompt.source, RuleAction::Off);
                Ok(None)
            }
        }
    }

    fn in_cooldown(&self, source: Source, now: DateTime<Utc>) -> bool {
        self.last_prompt_at.get(&source).is_some_and(|&last| {
            now - last < Duration::seconds(PROMPT_COOLDOWN_SECS)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CharacterKey;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid test timestamp")
            + Duration::seconds(secs)
    }

    fn tracker() -> Tracker {
        Tracker::new(
            CharacterKey {
                name: "Vex".into(),
                realm: "Ravencrest".into(),
                faction: "Horde".into(),
            },
            1,
        )
    }

    fn activity(source: Source, confidence: Confidence) -> Activity {
        Activity {
            source,
            confidence,
            amount: 100,
            should_suppress: false,
        }
    }

    #[test]
    fn handsfree_pins_deferred_payout_sources_off() {
        let settings = AutoSessionSettings::for_profile(Profile::Handsfree);
        for source in PINNED_START_OFF {
            assert_eq!(
                settings.source_action(RuleKind::Start, source),
                RuleAction::Off,
                "{source} must not auto-start"
            );
        }
        assert_eq!(
            settings.source_action(RuleKind::Start, Source::GoldMobLootCoin),
            RuleAction::Auto
        );
    }

    #[test]
    fn resume_rules_never_prompt() {
        let mut settings = AutoSessionSettings::for_profile(Profile::Balanced);
        settings.set_rule(RuleKind::Resume, Source::XpMobKill, RuleAction::Prompt);
        assert_eq!(
            settings.source_action(RuleKind::Resume, Source::XpMobKill),
            RuleAction::Off
        );
    }

    #[test]
    fn auto_rule_starts_a_session() {
        let mut engine = PolicyEngine::new(AutoSessionSettings::for_profile(Profile::Handsfree));
        let mut tracker = tracker();
        let decision = engine
            .process_activity(
                &mut tracker,
                &activity(Source::GoldMobLootCoin, Confidence::Medium),
                ts(0),
            )
            .unwrap();
        assert_eq!(decision, PolicyDecision::Started(1));
        assert_eq!(tracker.state(), SessionState::Active);
    }

    #[test]
    fn low_confidence_never_auto_starts() {
        let mut engine = PolicyEngine::new(AutoSessionSettings::for_profile(Profile::Handsfree));
        engine
            .settings_mut()
            .set_rule(RuleKind::Start, Source::GoldOther, RuleAction::Auto);
        let mut tracker = tracker();
        let decision = engine
            .process_activity(
                &mut tracker,
                &activity(Source::GoldOther, Confidence::Low),
                ts(0),
            )
            .unwrap();
        assert_ne!(decision, PolicyDecision::Started(1));
        assert_eq!(tracker.state(), SessionState::None);
    }

    #[test]
    fn suppressed_activity_is_ignored_for_start() {
        let mut engine = PolicyEngine::new(AutoSessionSettings::for_profile(Profile::Handsfree));
        let mut tracker = tracker();
        let mut suppressed = activity(Source::GoldMobLootCoin, Confidence::High);
        suppressed.should_suppress = true;
        let decision = engine
            .process_activity(&mut tracker, &suppressed, ts(0))
            .unwrap();
        assert_eq!(decision, PolicyDecision::None);
        assert_eq!(tracker.state(), SessionState::None);
    }

    #[test]
    fn prompt_cooldown_spaces_repeat_prompts() {
        let mut engine = PolicyEngine::new(AutoSessionSettings::for_profile(Profile::Balanced));
        let mut tracker = tracker();
        let gather = activity(Source::GatheringNode, Confidence::High);

        let first = engine
            .process_activity(&mut tracker, &gather, ts(0))
            .unwrap();
        assert_eq!(first, PolicyDecision::Prompted(Source::GatheringNode));

        // Prompt expires after 30s; within the 20s cooldown nothing fires.
        let repeat = engine
            .process_activity(&mut tracker, &gather, ts(35))
            .unwrap();
        assert_eq!(repeat, PolicyDecision::Prompted(Source::GatheringNode));
    }

    #[test]
    fn prompt_always_answer_flips_rule_to_auto() {
        let mut engine = PolicyEngine::new(AutoSessionSettings::for_profile(Profile::Balanced));
        let mut tracker = tracker();
        engine
            .process_activity(
                &mut tracker,
                &activity(Source::XpMobKill, Confidence::Medium),
                ts(0),
            )
            .unwrap();
        let started = engine
            .respond_prompt(&mut tracker, PromptResponse::Always, ts(5))
            .unwrap();
        assert_eq!(started, Some(1));
        assert_eq!(
            engine.settings().source_action(RuleKind::Start, Source::XpMobKill),
            RuleAction::Auto
        );
    }

    #[test]
    fn prompt_times_out_after_thirty_seconds() {
        let mut engine = PolicyEngine::new(AutoSessionSettings::for_profile(Profile::Balanced));
        let mut tracker = tracker();
        engine
            .process_activity(
                &mut tracker,
                &activity(Source::XpMobKill, Confidence::Medium),
                ts(0),
            )
            .unwrap();
        assert!(engine.pending_prompt(ts(29)).is_some());
        assert!(engine.pending_prompt(ts(31)).is_none());
        let started = engine
            .respond_prompt(&mut tracker, PromptResponse::Start, ts(31))
            .unwrap();
        assert_eq!(started, None);
        assert_eq!(tracker.state(), SessionState::None);
    }

    #[test]
    fn manual_pause_blocks_auto_resume_by_default() {
        let mut engine = PolicyEngine::new(AutoSessionSettings::for_profile(Profile::Balanced));
        let mut tracker = tracker();
        tracker.start_session(ts(0)).unwrap();
        tracker.pause(PauseReason::Manual, ts(10)).unwrap();

        let decision = engine
            .process_activity(
                &mut tracker,
                &activity(Source::GoldMobLootCoin, Confidence::High),
                ts(20),
            )
            .unwrap();
        assert_eq!(decision, PolicyDecision::None);

        tracker.resume(ts(30)).unwrap();
        tracker.pause(PauseReason::Inactivity, ts(40)).unwrap();
        let decision = engine
            .process_activity(
                &mut tracker,
                &activity(Source::GoldMobLootCoin, Confidence::High),
                ts(50),
            )
            .unwrap();
        assert_eq!(decision, PolicyDecision::Resumed);
        assert_eq!(tracker.state(), SessionState::Active);
    }

    #[test]
    fn disabled_engine_does_nothing() {
        let mut engine = PolicyEngine::new(AutoSessionSettings::for_profile(Profile::Manual));
        let mut tracker = tracker();
        let decision = engine
            .process_activity(
                &mut tracker,
                &activity(Source::GoldMobLootCoin, Confidence::High),
                ts(0),
            )
            .unwrap();
        assert_eq!(decision, PolicyDecision::None);
    }

    #[test]
    fn settings_serde_roundtrip() {
        let settings = AutoSessionSettings::for_profile(Profile::Handsfree);
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: AutoSessionSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, settings);
    }
}
