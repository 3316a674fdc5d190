//! Metrics engine: lifetime per-hour rates and bucketed recent rates.
//!
//! Lifetime rates are a straight `total / hours` with a floor. Recent rates
//! come from a small ring of fixed-width time buckets of positive deltas,
//! combined with fixed weights so the reported rate reacts within one to
//! three bucket widths of a burst without the jitter of a raw diff.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::session::Session;

/// Width of one rate bucket.
pub const BUCKET_SECS: i64 = 30;

/// Ring capacity per tracked metric.
pub const MAX_BUCKETS: usize = 6;

/// Most-recent-first weights for the recent-rate average.
const RECENT_WEIGHTS: [f64; 3] = [0.6, 0.3, 0.1];

/// One fixed-width window of accumulated positive delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBucket {
    pub start: DateTime<Utc>,
    pub delta: i64,
}

/// A ring of at most [`MAX_BUCKETS`] buckets plus the last-seen cumulative
/// total used for diffing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateBuckets {
    last_total: i64,
    buckets: VecDeque<RateBucket>,
}

impl RateBuckets {
    /// Observes a new cumulative total, appending the positive diff into the
    /// bucket whose window contains `now`.
    ///
    /// A new window always starts a new bucket; negative or zero diffs are
    /// discarded but still advance the last-seen total.
    pub fn observe(&mut self, total: i64, now: DateTime<Utc>) {
        let diff = total - self.last_total;
        self.last_total = total;
        if diff <= 0 {
            return;
        }
        match self.buckets.back_mut() {
            Some(bucket) if now < bucket.start + Duration::seconds(BUCKET_SECS) => {
                bucket.delta += diff;
            }
            _ => {
                self.buckets.push_back(RateBucket {
                    start: now,
                    delta: diff,
                });
                if self.buckets.len() > MAX_BUCKETS {
                    self.buckets.pop_front();
                }
            }
        }
    }

    /// Weighted hourly rate over the most recent three non-stale buckets.
    ///
    /// Buckets whose window end is older than `MAX_BUCKETS * BUCKET_SECS`
    /// seconds are excluded even if still physically present in the ring.
    /// Weights are renormalized by the sum of weights actually used, so one
    /// or two available buckets still produce a sane average.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        reason = "copper rates fit comfortably in f64 and i64"
    )]
    pub fn recent_rate(&self, now: DateTime<Utc>) -> i64 {
        let horizon = now - Duration::seconds(MAX_BUCKETS as i64 * BUCKET_SECS);
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;
        let fresh = self
            .buckets
            .iter()
            .rev()
            .filter(|bucket| bucket.start + Duration::seconds(BUCKET_SECS) >= horizon);
        for (weight, bucket) in RECENT_WEIGHTS.iter().zip(fresh) {
            let hourly = (bucket.delta as f64 / BUCKET_SECS as f64) * 3600.0;
            weighted += weight * hourly;
            weight_sum += weight;
        }
        if weight_sum <= 0.0 {
            0
        } else {
            (weighted / weight_sum).floor() as i64
        }
    }
}

/// One bucket ring per tracked rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateState {
    pub gold: RateBuckets,
    pub xp: RateBuckets,
    pub rep: RateBuckets,
    pub honor: RateBuckets,
}

/// One reputation turn-in rule: `items_per_turn_in` of `item_id` grant
/// `rep_per_turn_in` reputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnInRule {
    pub item_id: u32,
    pub items_per_turn_in: u32,
    pub rep_per_turn_in: i64,
}

/// The current reputation turn-in rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnInRules {
    pub rules: Vec<TurnInRule>,
}

impl Default for TurnInRules {
    fn default() -> Self {
        Self {
            rules: vec![
                // Aldor: Marks of Kil'jaeden / Sargeras, Fel Armaments.
                TurnInRule { item_id: 29_425, items_per_turn_in: 10, rep_per_turn_in: 250 },
                TurnInRule { item_id: 30_809, items_per_turn_in: 10, rep_per_turn_in: 250 },
                TurnInRule { item_id: 29_740, items_per_turn_in: 1, rep_per_turn_in: 350 },
                // Scryers: Firewing / Sunfury Signets, Arcane Tomes.
                TurnInRule { item_id: 29_426, items_per_turn_in: 10, rep_per_turn_in: 250 },
                TurnInRule { item_id: 30_810, items_per_turn_in: 10, rep_per_turn_in: 250 },
                TurnInRule { item_id: 29_736, items_per_turn_in: 1, rep_per_turn_in: 350 },
            ],
        }
    }
}

impl TurnInRules {
    /// Reputation still bankable from `items` under these rules.
    ///
    /// Partial stacks below a rule's turn-in quantity contribute nothing.
    #[must_use]
    pub fn potential(
        &self,
        items: &std::collections::BTreeMap<u32, crate::session::ItemHolding>,
    ) -> i64 {
        self.rules
            .iter()
            .filter_map(|rule| {
                let holding = items.get(&rule.item_id)?;
                let turn_ins = i64::from(holding.count / rule.items_per_turn_in);
                Some(turn_ins * rule.rep_per_turn_in)
            })
            .sum()
    }
}

/// A point-in-time read of every derived metric for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub duration_secs: i64,

    pub cash: i64,
    pub inventory_value: i64,
    pub total_value: i64,
    pub xp: i64,
    pub rep: i64,
    pub honor: i64,
    pub turn_in_potential: i64,

    pub cash_per_hour: i64,
    pub inventory_per_hour: i64,
    pub total_per_hour: i64,
    pub xp_per_hour: i64,
    pub rep_per_hour: i64,
    pub honor_per_hour: i64,

    pub recent_gold_rate: i64,
    pub recent_xp_rate: i64,
    pub recent_rep_rate: i64,
    pub recent_honor_rate: i64,
}

/// `floor(total / (duration/3600))` when `duration_secs > 0`, else 0.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "copper totals fit comfortably in f64 and i64"
)]
pub fn per_hour(total: i64, duration_secs: i64) -> i64 {
    if duration_secs <= 0 {
        0
    } else {
        (total as f64 * 3600.0 / duration_secs as f64).floor() as i64
    }
}

/// Derives the full metrics snapshot for a session.
///
/// Pure except for appending to the session's rate buckets as a side effect
/// of observing new cumulative totals. While the session is paused, all
/// computation uses `paused_at` as its time reference so every derived rate
/// stays perfectly stable.
pub fn get_metrics(session: &mut Session, rules: &TurnInRules, now: DateTime<Utc>) -> MetricsSnapshot {
    let at = session.metrics_instant(now);
    let duration_secs = session.duration_secs(at);

    let cash = session.ledger.subtree_total("Income:Cash")
        - session.ledger.subtree_total("Expense");
    let inventory_value = session.ledger.subtree_total("Income:ItemsLooted");
    let total_value = cash + inventory_value;
    let xp = session.gains.xp;
    let rep = session.gains.rep;
    let honor = session.gains.honor;

    let turn_in_potential = rules.potential(&session.items);
    session.gains.turn_in_potential = turn_in_potential;

    session.rates.gold.observe(cash, at);
    session.rates.xp.observe(xp, at);
    session.rates.rep.observe(rep, at);
    session.rates.honor.observe(honor, at);

    MetricsSnapshot {
        duration_secs,
        cash,
        inventory_value,
        total_value,
        xp,
        rep,
        honor,
        turn_in_potential,
        cash_per_hour: per_hour(cash, duration_secs),
        inventory_per_hour: per_hour(inventory_value, duration_secs),
        total_per_hour: per_hour(total_value, duration_secs),
        xp_per_hour: per_hour(xp, duration_secs),
        rep_per_hour: per_hour(rep, duration_secs),
        honor_per_hour: per_hour(honor, duration_secs),
        recent_gold_rate: session.rates.gold.recent_rate(at),
        recent_xp_rate: session.rates.xp.recent_rate(at),
        recent_rep_rate: session.rates.rep.recent_rate(at),
        recent_honor_rate: session.rates.honor.recent_rate(at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{CharacterKey, ItemHolding, PauseReason};
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid test timestamp")
            + Duration::seconds(secs)
    }

    fn session_at(start: DateTime<Utc>) -> Session {
        Session::new(1, CharacterKey::new("Ara", "Whisperwind", "Alliance"), start)
    }

    #[test]
    fn per_hour_floors_and_handles_zero_duration() {
        assert_eq!(per_hour(100, 0), 0);
        assert_eq!(per_hour(100, -5), 0);
        // 100 copper over 30 min = 200/hour.
        assert_eq!(per_hour(100, 1800), 200);
        // 100 copper over 7 min = 857.14... -> 857.
        assert_eq!(per_hour(100, 420), 857);
    }

    #[test]
    fn single_bucket_recent_rate_identity() {
        let mut rates = RateBuckets::default();
        rates.observe(500, ts(0));
        // One bucket with delta 500: floor((500/30)*3600) = 60000.
        assert_eq!(rates.recent_rate(ts(10)), 60_000);
    }

    #[test]
    fn same_window_accumulates_new_window_starts_bucket() {
        let mut rates = RateBuckets::default();
        rates.observe(100, ts(0));
        rates.observe(250, ts(10)); // same window, +150
        rates.observe(400, ts(35)); // new window, +150
        assert_eq!(rates.buckets.len(), 2);
        assert_eq!(rates.buckets[0].delta, 250);
        assert_eq!(rates.buckets[1].delta, 150);
    }

    #[test]
    fn negative_diff_discarded_but_total_advances() {
        let mut rates = RateBuckets::default();
        rates.observe(100, ts(0));
        rates.observe(40, ts(5)); // repair bill: no bucket
        assert_eq!(rates.buckets.len(), 1);
        assert_eq!(rates.buckets[0].delta, 100);
        // Diff is now taken against 40, not 100.
        rates.observe(60, ts(8));
        assert_eq!(rates.buckets[0].delta, 120);
    }

    #[test]
    fn three_bucket_weighted_average() {
        let mut rates = RateBuckets::default();
        // Oldest to newest: deltas 10, 20, 30 in windows starting 0, 30, 60.
        rates.observe(10, ts(0));
        rates.observe(30, ts(30));
        rates.observe(60, ts(60));
        // Hourly rates newest-first: 3600, 2400, 1200.
        // 0.6*3600 + 0.3*2400 + 0.1*1200 = 3000.
        assert_eq!(rates.recent_rate(ts(70)), 3000);
    }

    #[test]
    fn two_buckets_renormalize_by_point_nine() {
        let mut rates = RateBuckets::default();
        rates.observe(10, ts(0));
        rates.observe(30, ts(30));
        // Hourly newest-first: 2400, 1200.
        // (0.6*2400 + 0.3*1200) / 0.9 = 1800/0.9 = 2000.
        assert_eq!(rates.recent_rate(ts(40)), 2000);
    }

    #[test]
    fn stale_buckets_excluded_from_recent_rate() {
        let mut rates = RateBuckets::default();
        rates.observe(100, ts(0));
        // Window [0,30) ended 30; at now=211 the horizon is 211-180=31.
        assert_eq!(rates.recent_rate(ts(211)), 0);
        // Just inside the horizon at now=209.
        assert!(rates.recent_rate(ts(209)) > 0);
    }

    #[test]
    fn ring_caps_at_max_buckets() {
        let mut rates = RateBuckets::default();
        for i in 0..10 {
            rates.observe((i + 1) * 10, ts(i * 30));
        }
        assert_eq!(rates.buckets.len(), MAX_BUCKETS);
    }

    #[test]
    fn snapshot_per_hour_matches_ledger_cash() {
        let mut session = session_at(ts(0));
        session.ledger.post("Income:Cash:Loot", 900);
        session.ledger.post("Expense:Repairs", 300);
        let snapshot = get_metrics(&mut session, &TurnInRules::default(), ts(1800));
        assert_eq!(snapshot.cash, 600);
        assert_eq!(snapshot.duration_secs, 1800);
        assert_eq!(snapshot.cash_per_hour, 1200);
    }

    #[test]
    fn rates_freeze_while_paused() {
        let mut session = session_at(ts(0));
        session.ledger.post("Income:Cash:Loot", 500);
        let rules = TurnInRules::default();
        let live = get_metrics(&mut session, &rules, ts(10));
        assert!(live.recent_gold_rate > 0);

        session.pause(PauseReason::Manual, ts(20)).unwrap();
        let frozen_early = get_metrics(&mut session, &rules, ts(25));
        // Minutes later the recent rate has not decayed: the paused
        // timestamp, not wall clock, is the reference.
        let frozen_late = get_metrics(&mut session, &rules, ts(600));
        assert_eq!(frozen_early.recent_gold_rate, frozen_late.recent_gold_rate);
        assert_eq!(frozen_early.duration_secs, frozen_late.duration_secs);
    }

    #[test]
    fn turn_in_potential_floors_partial_stacks() {
        let rules = TurnInRules::default();
        let mut items = std::collections::BTreeMap::new();
        items.insert(30_809, ItemHolding { count: 27, unit_value: 0 });
        // 27 Marks of Sargeras = 2 full turn-ins of 10 -> 500 rep.
        assert_eq!(rules.potential(&items), 500);
    }

    #[test]
    fn snapshot_inventory_and_total_value() {
        let mut session = session_at(ts(0));
        session.ledger.post("Income:Cash:Loot", 100);
        session.ledger.post("Income:ItemsLooted:Gathering", 250);
        session.ledger.post("Income:ItemsLooted:Other", 50);
        let snapshot = get_metrics(&mut session, &TurnInRules::default(), ts(60));
        assert_eq!(snapshot.inventory_value, 300);
        assert_eq!(snapshot.total_value, 400);
    }
}
