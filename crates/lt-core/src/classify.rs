//! Stateful activity classifier.
//!
//! Maps raw telemetry events to attributed activities using short-lived
//! context windows. Windows expire on wall-clock timestamps, not event
//! counts: a quest hand-in notification arms its window before the XP and
//! money events it contextualizes arrive, and real delivery latency varies.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::activity::{Activity, Confidence, Source};
use crate::event::{FactionStanding, GameEvent, ItemClass, ItemInfo};

/// Quest hand-in context: money/XP/rep shortly after a hand-in belong to it.
const QUEST_TURNIN_WINDOW_MS: i64 = 8000;
/// Zone discovery XP lands almost immediately.
const ZONE_DISCOVERY_WINDOW_MS: i64 = 2000;
/// Coin looted right after a Pick Pocket cast.
const PICKPOCKET_WINDOW_MS: i64 = 2000;
/// Coin looted right after a lockbox is opened.
const LOCKBOX_WINDOW_MS: i64 = 3000;
/// Reputation granted right after a turn-in item is consumed.
const ITEM_TURNIN_WINDOW_MS: i64 = 2000;
/// Bias faction gains toward "mob kill" shortly after combat XP.
const REP_KILL_SIGNAL_WINDOW_MS: i64 = 2500;
/// Grace period after the merchant frame closes.
const VENDOR_SALE_WINDOW_MS: i64 = 2000;

/// Gathering profession casts that always mean a node was harvested.
const GATHERING_SPELLS: &[u32] = &[
    2575, 2576, 3564, 10_248, 29_354, // Mining ranks
    2366, 2368, 3570, 11_993, 28_695, // Herb Gathering ranks
    8613, 8617, 8618, 10_768, 32_678, // Skinning ranks
];

/// System-message substrings that hint at an upcoming item turn-in rep gain.
const REP_HINT_ITEMS: &[&str] = &[
    "mark of sargeras",
    "mark of kil'jaeden",
    "firewing signet",
    "sunfury signet",
    "arcane tome",
    "fel armament",
];

static ITEM_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\|Hitem:(\d+)").expect("valid item link pattern"));

/// Parses the item ID out of an item link, e.g. `|Hitem:2770:0:...|h[Copper Ore]|h`.
#[must_use]
pub fn parse_item_id(message: &str) -> Option<u32> {
    ITEM_LINK
        .captures(message)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// A deadline after which a context window is inactive.
#[derive(Debug, Clone, Copy, Default)]
struct Window(Option<DateTime<Utc>>);

impl Window {
    fn arm(&mut self, now: DateTime<Utc>, duration_ms: i64) {
        self.0 = Some(now + Duration::milliseconds(duration_ms));
    }

    fn is_open(self, now: DateTime<Utc>) -> bool {
        self.0.is_some_and(|until| now <= until)
    }

    fn clear(&mut self) {
        self.0 = None;
    }
}

/// A pending source attribution with its own expiry.
#[derive(Debug, Clone, Copy)]
struct Pending {
    source: Source,
    until: DateTime<Utc>,
}

/// Stateful classifier over short-lived context windows.
///
/// Constructed once per runtime context and `reset` at session boundaries;
/// no ambient module state carries across sessions.
#[derive(Debug, Default)]
pub struct Classifier {
    quest_turnin: Window,
    zone_discovery: Window,
    pickpocket: Window,
    lockbox: Window,
    item_turnin: Window,
    rep_kill_signal: Window,
    vendor_sale: Window,

    mailbox_open: bool,
    merchant_open: bool,

    pending_xp: Option<Pending>,
    pending_rep_hint: Option<Source>,

    last_seen_xp: Option<i64>,
    faction_snapshot: HashMap<u32, i64>,
    /// Per-faction positive deltas from the most recent reputation scan.
    rep_breakdown: Vec<(u32, i64)>,
}

impl Classifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every window, flag, hint, and cached snapshot.
    pub fn reset(&mut self) {
        *self = Self {
            mailbox_open: self.mailbox_open,
            merchant_open: self.merchant_open,
            ..Self::default()
        };
    }

    /// Drains the per-faction deltas behind the most recent reputation
    /// activity.
    pub fn take_rep_breakdown(&mut self) -> Vec<(u32, i64)> {
        std::mem::take(&mut self.rep_breakdown)
    }

    /// Classifies one raw event, mutating window state as a side effect.
    ///
    /// Returns `None` for events that only arm context (UI notifications,
    /// quest hand-ins, Pick Pocket casts) or carry no gain.
    pub fn classify(
        &mut self,
        event: &GameEvent,
        items: &dyn ItemInfo,
        now: DateTime<Utc>,
    ) -> Option<Activity> {
        match event {
            GameEvent::MoneyGained { copper, message } => {
                Some(self.classify_money(*copper, message, now))
            }
            GameEvent::XpUpdate {
                current_xp,
                level,
                max_level,
            } => self.classify_xp(*current_xp, *level, *max_level, now),
            GameEvent::FactionStandings { standings } => self.classify_rep(standings, now),
            GameEvent::SpellCastSucceeded {
                spell_id,
                spell_name,
                ..
            } => self.classify_spell(*spell_id, spell_name, now),
            GameEvent::LootMessage { message } => self.classify_loot(message, items),
            GameEvent::HonorGained { amount } => Some(self.emit(
                Source::HonorKill,
                Confidence::High,
                *amount,
            )),
            GameEvent::QuestTurnedIn {
                quest_id,
                xp_reward,
                money_reward,
            } => {
                self.mark_quest_turn_in(*xp_reward, *money_reward, now);
                tracing::debug!(quest_id, "quest turn-in window armed");
                None
            }
            GameEvent::SystemMessage { text } => {
                self.scan_system_message(text, now);
                None
            }
            GameEvent::MailboxOpened => {
                self.mailbox_open = true;
                None
            }
            GameEvent::MailboxClosed => {
                self.mailbox_open = false;
                None
            }
            GameEvent::MerchantOpened => {
                self.merchant_open = true;
                None
            }
            GameEvent::MerchantClosed => {
                self.merchant_open = false;
                self.vendor_sale.arm(now, VENDOR_SALE_WINDOW_MS);
                None
            }
            GameEvent::AfkChanged { .. } => None,
        }
    }

    /// Arms the quest hand-in context window and the pending XP source.
    pub fn mark_quest_turn_in(&mut self, has_xp: bool, _has_money: bool, now: DateTime<Utc>) {
        self.quest_turnin.arm(now, QUEST_TURNIN_WINDOW_MS);
        if has_xp {
            self.pending_xp = Some(Pending {
                source: Source::XpQuestTurnin,
                until: now + Duration::milliseconds(QUEST_TURNIN_WINDOW_MS),
            });
        }
    }

    fn emit(&self, source: Source, confidence: Confidence, amount: i64) -> Activity {
        Activity {
            source,
            confidence,
            amount,
            should_suppress: self.mailbox_open || self.merchant_open,
        }
    }

    fn classify_money(&mut self, copper: i64, message: &str, now: DateTime<Utc>) -> Activity {
        // Precedence: open UI beats every timed window, windows beat keyword
        // scans, keyword scans beat the low-confidence fallback.
        if self.mailbox_open {
            return self.emit(Source::GoldMail, Confidence::High, copper);
        }
        if self.merchant_open || self.vendor_sale.is_open(now) {
            return self.emit(Source::GoldVendorSale, Confidence::High, copper);
        }
        if self.lockbox.is_open(now) {
            return self.emit(Source::GoldLockboxCoin, Confidence::High, copper);
        }
        if self.pickpocket.is_open(now) {
            return self.emit(Source::GoldPickpocketCoin, Confidence::High, copper);
        }
        if self.quest_turnin.is_open(now) {
            return self.emit(Source::GoldQuestReward, Confidence::High, copper);
        }

        let text = message.to_lowercase();
        if text.contains("auction") {
            return self.emit(Source::GoldAuctionPayout, Confidence::Medium, copper);
        }
        if text.contains("mail") {
            return self.emit(Source::GoldMail, Confidence::Medium, copper);
        }
        if text.contains("cod") || text.contains("trade") {
            return self.emit(Source::GoldTradeOrCod, Confidence::Medium, copper);
        }
        if text.contains("you loot") {
            return self.emit(Source::GoldMobLootCoin, Confidence::Medium, copper);
        }

        self.emit(Source::GoldOther, Confidence::Low, copper)
    }

    fn classify_xp(
        &mut self,
        current_xp: i64,
        level: u32,
        max_level: u32,
        now: DateTime<Utc>,
    ) -> Option<Activity> {
        if level >= max_level {
            return None;
        }
        let Some(last) = self.last_seen_xp.replace(current_xp) else {
            // First poll establishes the baseline.
            return None;
        };
        let delta = current_xp - last;
        if delta <= 0 {
            // Level-up rollover shows as a negative raw delta and is simply
            // discarded; that update's true gain is undercounted.
            return None;
        }

        let pending = self
            .pending_xp
            .take()
            .filter(|p| now <= p.until)
            .map(|p| p.source);

        let (source, confidence) = if let Some(source) = pending {
            (source, Confidence::High)
        } else if self.zone_discovery.is_open(now) {
            (Source::XpZoneDiscovery, Confidence::High)
        } else if self.quest_turnin.is_open(now) {
            (Source::XpQuestTurnin, Confidence::High)
        } else {
            // Combat XP: bias faction gains toward "mob kill" for a moment.
            self.rep_kill_signal.arm(now, REP_KILL_SIGNAL_WINDOW_MS);
            (Source::XpMobKill, Confidence::Medium)
        };
        Some(self.emit(source, confidence, delta))
    }

    fn classify_rep(
        &mut self,
        standings: &[FactionStanding],
        now: DateTime<Utc>,
    ) -> Option<Activity> {
        // Diff the whole table against the cached snapshot by faction ID,
        // summing only positive deltas. New factions establish a baseline.
        let mut gained = 0;
        let mut breakdown = Vec::new();
        for standing in standings {
            match self.faction_snapshot.get(&standing.faction_id) {
                Some(&previous) if standing.value > previous => {
                    gained += standing.value - previous;
                    breakdown.push((standing.faction_id, standing.value - previous));
                }
                _ => {}
            }
            self.faction_snapshot
                .insert(standing.faction_id, standing.value);
        }
        if gained <= 0 {
            return None;
        }
        self.rep_breakdown = breakdown;

        let (source, confidence) = if self.quest_turnin.is_open(now) {
            (Source::RepQuestTurnin, Confidence::High)
        } else if self.item_turnin.is_open(now) {
            (Source::RepItemTurnin, Confidence::High)
        } else if self.rep_kill_signal.is_open(now) {
            (Source::RepMobKill, Confidence::Medium)
        } else if let Some(hinted) = self.pending_rep_hint.take() {
            // Hint consumed once used.
            (hinted, Confidence::Medium)
        } else {
            (Source::RepOther, Confidence::Low)
        };
        Some(self.emit(source, confidence, gained))
    }

    fn classify_spell(
        &mut self,
        spell_id: u32,
        spell_name: &str,
        now: DateTime<Utc>,
    ) -> Option<Activity> {
        if GATHERING_SPELLS.contains(&spell_id) {
            return Some(self.emit(Source::GatheringNode, Confidence::High, 0));
        }
        if spell_name.eq_ignore_ascii_case("pick pocket") {
            self.pickpocket.arm(now, PICKPOCKET_WINDOW_MS);
            return None;
        }
        if spell_name.eq_ignore_ascii_case("pick lock") {
            self.lockbox.arm(now, LOCKBOX_WINDOW_MS);
            return None;
        }
        None
    }

    fn classify_loot(&mut self, message: &str, items: &dyn ItemInfo) -> Option<Activity> {
        let item_id = parse_item_id(message)?;
        let value = items.unit_value(item_id);
        match items.classify(item_id) {
            ItemClass::Gathering => Some(self.emit(Source::GatheringNode, Confidence::High, value)),
            ItemClass::Lockbox => Some(self.emit(
                Source::GoldTreasureOrContainerCoin,
                Confidence::High,
                value,
            )),
            ItemClass::Other => Some(self.emit(Source::GoldOther, Confidence::Low, value)),
        }
    }

    fn scan_system_message(&mut self, text: &str, now: DateTime<Utc>) {
        let lowered = text.to_lowercase();
        if lowered.contains("discovered") {
            self.zone_discovery.arm(now, ZONE_DISCOVERY_WINDOW_MS);
            return;
        }
        if REP_HINT_ITEMS.iter().any(|hint| lowered.contains(hint)) {
            self.pending_rep_hint = Some(Source::RepItemTurnin);
            self.item_turnin.arm(now, ITEM_TURNIN_WINDOW_MS);
        }
    }
}
