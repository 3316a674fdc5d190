//! Event-loop context: one tracker, classifier, policy engine, and watchdog
//! wired together behind a single `handle_event` entry point.

use chrono::{DateTime, Utc};

use crate::activity::{Activity, Source};
use crate::classify::{Classifier, parse_item_id};
use crate::event::{GameEvent, ItemClass, ItemInfo};
use crate::metrics::{MetricsSnapshot, TurnInRules, get_metrics};
use crate::policy::{AutoSessionSettings, PolicyDecision, PolicyEngine, PromptResponse};
use crate::session::{PauseReason, Session, TrackerError};
use crate::tracker::{SessionState, Tracker};
use crate::watchdog::{Watchdog, WatchdogAction};

/// A state change worth surfacing to the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    SessionStarted(u64),
    SessionResumed,
    SessionPaused(PauseReason),
    /// Ask the player whether to start tracking this source.
    PromptStart(Source),
    /// Ask the player whether to pause after sustained inactivity.
    PromptPause,
}

/// The per-character runtime context.
pub struct Runtime {
    tracker: Tracker,
    classifier: Classifier,
    policy: PolicyEngine,
    watchdog: Watchdog,
    items: Box<dyn ItemInfo + Send>,
    turn_in_rules: TurnInRules,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("tracker", &self.tracker)
            .field("state", &self.tracker.state())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    #[must_use]
    pub fn new(
        tracker: Tracker,
        settings: AutoSessionSettings,
        items: Box<dyn ItemInfo + Send>,
    ) -> Self {
        Self {
            tracker,
            classifier: Classifier::new(),
            policy: PolicyEngine::new(settings),
            watchdog: Watchdog::new(),
            items,
            turn_in_rules: TurnInRules::default(),
        }
    }

    #[must_use]
    pub const fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub const fn tracker_mut(&mut self) -> &mut Tracker {
        &mut self.tracker
    }

    #[must_use]
    pub const fn settings(&self) -> &AutoSessionSettings {
        self.policy.settings()
    }

    pub const fn settings_mut(&mut self) -> &mut AutoSessionSettings {
        self.policy.settings_mut()
    }

    /// Routes one raw event through classification, policy, and accounting.
    pub fn handle_event(
        &mut self,
        event: &GameEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<Outcome>, TrackerError> {
        if let GameEvent::AfkChanged { afk } = event {
            return self.handle_afk(*afk, now);
        }

        let Some(activity) = self.classifier.classify(event, self.items.as_ref(), now) else {
            return Ok(None);
        };

        let decision = self
            .policy
            .process_activity(&mut self.tracker, &activity, now)?;
        let outcome = match decision {
            PolicyDecision::Started(id) => {
                self.on_session_started(now);
                Some(Outcome::SessionStarted(id))
            }
            PolicyDecision::Resumed => Some(Outcome::SessionResumed),
            PolicyDecision::Prompted(source) => Some(Outcome::PromptStart(source)),
            PolicyDecision::None => None,
        };

        if self.tracker.state() == SessionState::Active {
            self.apply(event, &activity);
            self.watchdog.record_activity(now);
        }
        Ok(outcome)
    }

    /// Pause-offer and forced-pause escalation; poll on a ~10s cadence.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Option<Outcome>, TrackerError> {
        if self.tracker.state() != SessionState::Active {
            return Ok(None);
        }
        match self.watchdog.tick(&self.policy.settings().pause, now) {
            WatchdogAction::None => Ok(None),
            WatchdogAction::PromptPause => Ok(Some(Outcome::PromptPause)),
            WatchdogAction::ForcePause => {
                self.tracker.pause(PauseReason::Inactivity, now)?;
                Ok(Some(Outcome::SessionPaused(PauseReason::Inactivity)))
            }
        }
    }

    /// Answers a live start prompt.
    pub fn respond_prompt(
        &mut self,
        response: PromptResponse,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, TrackerError> {
        let started = self
            .policy
            .respond_prompt(&mut self.tracker, response, now)?;
        if started.is_some() {
            self.on_session_started(now);
        }
        Ok(started)
    }

    pub fn start_session(&mut self, now: DateTime<Utc>) -> Result<u64, TrackerError> {
        let id = self.tracker.start_session(now)?;
        self.on_session_started(now);
        Ok(id)
    }

    pub fn stop_session(&mut self, now: DateTime<Utc>) -> Result<Session, TrackerError> {
        let session = self.tracker.stop_session(now)?;
        self.classifier.reset();
        self.watchdog.reset();
        self.policy.reset_prompts();
        Ok(session)
    }

    pub fn pause(&mut self, reason: PauseReason, now: DateTime<Utc>) -> Result<(), TrackerError> {
        self.tracker.pause(reason, now)
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), TrackerError> {
        self.tracker.resume(now)?;
        self.watchdog.record_activity(now);
        Ok(())
    }

    pub fn adopt(&mut self, session: Session) {
        self.tracker.adopt(session);
    }

    /// Metrics for the active session, if any.
    pub fn metrics(&mut self, now: DateTime<Utc>) -> Option<MetricsSnapshot> {
        let session = self.tracker.active_mut()?;
        Some(get_metrics(session, &self.turn_in_rules, now))
    }

    fn on_session_started(&mut self, now: DateTime<Utc>) {
        self.watchdog.reset();
        self.watchdog.record_activity(now);
        self.policy.reset_prompts();
    }

    /// AFK pause/resume, independent of the inactivity timer.
    fn handle_afk(
        &mut self,
        afk: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Outcome>, TrackerError> {
        if afk {
            if self.policy.settings().pause.afk_enabled
                && self.tracker.state() == SessionState::Active
            {
                self.tracker.pause(PauseReason::Afk, now)?;
                return Ok(Some(Outcome::SessionPaused(PauseReason::Afk)));
            }
        } else if self.tracker.state() == SessionState::Paused(PauseReason::Afk)
            && self.policy.auto_resume_enabled()
        {
            self.tracker.resume(now)?;
            self.watchdog.record_activity(now);
            return Ok(Some(Outcome::SessionResumed));
        }
        Ok(None)
    }

    /// Applies a classified gain to the active session.
    ///
    /// Loot notices are routed by item class here rather than through the
    /// tracker's cash accounts: item value is inventory, not coin.
    fn apply(&mut self, event: &GameEvent, activity: &Activity) {
        if let GameEvent::LootMessage { message } = event {
            self.apply_loot(message);
            return;
        }
        self.tracker.apply_activity(activity);
        if matches!(
            activity.source,
            Source::RepQuestTurnin | Source::RepItemTurnin | Source::RepMobKill | Source::RepOther
        ) {
            let breakdown = self.classifier.take_rep_breakdown();
            self.tracker.apply_rep_breakdown(&breakdown);
        }
    }

    fn apply_loot(&mut self, message: &str) {
        let Some(item_id) = parse_item_id(message) else {
            return;
        };
        let value = self.items.unit_value(item_id);
        self.tracker.record_item(item_id, value);
        let account = match self.items.classify(item_id) {
            ItemClass::Gathering => "Income:ItemsLooted:Gathering",
            ItemClass::Lockbox => return,
            ItemClass::Other => "Income:ItemsLooted:Other",
        };
        if value > 0 {
            if let Some(session) = self.tracker.active_mut() {
                session.ledger.post(account, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::StaticItemTable;
    use crate::policy::Profile;
    use crate::session::CharacterKey;
    use chrono::{Duration, TimeZone};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid test timestamp")
            + Duration::seconds(secs)
    }

    fn runtime(profile: Profile) -> Runtime {
        let tracker = Tracker::new(
            CharacterKey {
                name: "Vex".into(),
                realm: "Ravencrest".into(),
                faction: "Horde".into(),
            },
            1,
        );
        Runtime::new(
            tracker,
            AutoSessionSettings::for_profile(profile),
            Box::new(StaticItemTable::with_defaults()),
        )
    }

    fn loot_coin(copper: i64) -> GameEvent {
        GameEvent::MoneyGained {
            copper,
            message: "You loot 1 Silver, 20 Copper".to_string(),
        }
    }

    #[test]
    fn handsfree_auto_starts_and_counts_the_triggering_gain() {
        let mut rt = runtime(Profile::Handsfree);
        let outcome = rt.handle_event(&loot_coin(120), ts(0)).unwrap();
        assert_eq!(outcome, Some(Outcome::SessionStarted(1)));
        let session = rt.tracker().active().unwrap();
        assert_eq!(session.ledger.balance("Income:Cash:Loot"), 120);
    }

    #[test]
    fn mailbox_money_never_starts_a_session() {
        let mut rt = runtime(Profile::Handsfree);
        rt.handle_event(&GameEvent::MailboxOpened, ts(0)).unwrap();
        let outcome = rt
            .handle_event(
                &GameEvent::MoneyGained {
                    copper: 50_000,
                    message: String::new(),
                },
                ts(1),
            )
            .unwrap();
        assert_eq!(outcome, None);
        assert_eq!(rt.tracker().state(), SessionState::None);
    }

    #[test]
    fn afk_pauses_and_resumes_around_the_flag() {
        let mut rt = runtime(Profile::Handsfree);
        rt.start_session(ts(0)).unwrap();
        let paused = rt
            .handle_event(&GameEvent::AfkChanged { afk: true }, ts(60))
            .unwrap();
        assert_eq!(paused, Some(Outcome::SessionPaused(PauseReason::Afk)));

        let resumed = rt
            .handle_event(&GameEvent::AfkChanged { afk: false }, ts(120))
            .unwrap();
        assert_eq!(resumed, Some(Outcome::SessionResumed));
        assert_eq!(rt.tracker().state(), SessionState::Active);
    }

    #[test]
    fn afk_resume_requires_an_auto_resume_rule() {
        let mut rt = runtime(Profile::Manual);
        rt.start_session(ts(0)).unwrap();
        rt.handle_event(&GameEvent::AfkChanged { afk: true }, ts(60))
            .unwrap();
        assert_eq!(rt.tracker().state(), SessionState::Paused(PauseReason::Afk));

        let outcome = rt
            .handle_event(&GameEvent::AfkChanged { afk: false }, ts(120))
            .unwrap();
        assert_eq!(outcome, None);
        assert_eq!(rt.tracker().state(), SessionState::Paused(PauseReason::Afk));
    }

    #[test]
    fn afk_does_not_override_a_manual_pause() {
        let mut rt = runtime(Profile::Handsfree);
        rt.start_session(ts(0)).unwrap();
        rt.pause(PauseReason::Manual, ts(10)).unwrap();
        rt.handle_event(&GameEvent::AfkChanged { afk: true }, ts(20))
            .unwrap();
        rt.handle_event(&GameEvent::AfkChanged { afk: false }, ts(30))
            .unwrap();
        assert_eq!(rt.tracker().state(), SessionState::Paused(PauseReason::Manual));
    }

    #[test]
    fn watchdog_tick_escalates_to_inactivity_pause() {
        let mut rt = runtime(Profile::Handsfree);
        rt.start_session(ts(0)).unwrap();
        assert_eq!(rt.tick(ts(300)).unwrap(), Some(Outcome::PromptPause));
        assert_eq!(
            rt.tick(ts(600)).unwrap(),
            Some(Outcome::SessionPaused(PauseReason::Inactivity))
        );
        // Paused sessions are not re-escalated.
        assert_eq!(rt.tick(ts(900)).unwrap(), None);
    }

    #[test]
    fn inactivity_pause_auto_resumes_on_next_gain() {
        let mut rt = runtime(Profile::Handsfree);
        rt.start_session(ts(0)).unwrap();
        rt.tick(ts(600)).unwrap();
        assert_eq!(
            rt.tracker().state(),
            SessionState::Paused(PauseReason::Inactivity)
        );
        let outcome = rt.handle_event(&loot_coin(120), ts(700)).unwrap();
        assert_eq!(outcome, Some(Outcome::SessionResumed));
        // The resuming gain itself is recorded.
        assert_eq!(
            rt.tracker().active().unwrap().ledger.balance("Income:Cash:Loot"),
            120
        );
    }

    #[test]
    fn loot_value_posts_to_inventory_not_cash() {
        let mut rt = runtime(Profile::Handsfree);
        rt.start_session(ts(0)).unwrap();
        rt.handle_event(
            &GameEvent::LootMessage {
                message: "You receive loot: |Hitem:2770:0:0:0|h[Copper Ore]|h".into(),
            },
            ts(5),
        )
        .unwrap();
        let session = rt.tracker().active().unwrap();
        assert_eq!(session.ledger.balance("Income:ItemsLooted:Gathering"), 50);
        assert_eq!(session.ledger.subtree_total("Income:Cash"), 0);
        assert_eq!(session.items.get(&2770).unwrap().count, 1);
    }

    #[test]
    fn balanced_profile_prompts_then_starts_on_answer() {
        let mut rt = runtime(Profile::Balanced);
        let outcome = rt.handle_event(&loot_coin(120), ts(0)).unwrap();
        assert_eq!(outcome, Some(Outcome::PromptStart(Source::GoldMobLootCoin)));
        assert_eq!(rt.tracker().state(), SessionState::None);

        let started = rt.respond_prompt(PromptResponse::Start, ts(5)).unwrap();
        assert_eq!(started, Some(1));
        assert_eq!(rt.tracker().state(), SessionState::Active);
    }

    #[test]
    fn turn_in_potential_flows_into_metrics() {
        let mut rt = runtime(Profile::Manual);
        rt.start_session(ts(0)).unwrap();
        for _ in 0..25 {
            rt.handle_event(
                &GameEvent::LootMessage {
                    message: "You receive loot: |Hitem:29425:0:0:0|h[Mark of Kil'jaeden]|h".into(),
                },
                ts(10),
            )
            .unwrap();
        }
        let snapshot = rt.metrics(ts(3600)).unwrap();
        // 25 marks at 10 per hand-in of 250 rep: two full stacks.
        assert_eq!(snapshot.turn_in_potential, 500);
        assert_eq!(snapshot.duration_secs, 3600);
    }
}
