//! Classified activity: the attributed interpretation of one raw event.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The enumerated origin tag assigned to an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Source {
    GoldMail,
    GoldVendorSale,
    GoldLockboxCoin,
    GoldPickpocketCoin,
    GoldQuestReward,
    GoldAuctionPayout,
    GoldTradeOrCod,
    GoldMobLootCoin,
    GoldTreasureOrContainerCoin,
    GoldOther,
    XpQuestTurnin,
    XpZoneDiscovery,
    XpMobKill,
    RepQuestTurnin,
    RepItemTurnin,
    RepMobKill,
    RepOther,
    GatheringNode,
    HonorKill,
}

impl Source {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GoldMail => "gold.mail",
            Self::GoldVendorSale => "gold.vendor_sale",
            Self::GoldLockboxCoin => "gold.lockbox_coin",
            Self::GoldPickpocketCoin => "gold.pickpocket_coin",
            Self::GoldQuestReward => "gold.quest_reward",
            Self::GoldAuctionPayout => "gold.auction_payout",
            Self::GoldTradeOrCod => "gold.trade_or_cod",
            Self::GoldMobLootCoin => "gold.mob_loot_coin",
            Self::GoldTreasureOrContainerCoin => "gold.treasure_or_container_coin",
            Self::GoldOther => "gold.other",
            Self::XpQuestTurnin => "xp.quest_turnin",
            Self::XpZoneDiscovery => "xp.zone_discovery",
            Self::XpMobKill => "xp.mob_kill",
            Self::RepQuestTurnin => "rep.quest_turnin",
            Self::RepItemTurnin => "rep.item_turnin",
            Self::RepMobKill => "rep.mob_kill",
            Self::RepOther => "rep.other",
            Self::GatheringNode => "gathering.node",
            Self::HonorKill => "honor.kill",
        }
    }

    /// All sources, in declaration order.
    pub const ALL: [Self; 19] = [
        Self::GoldMail,
        Self::GoldVendorSale,
        Self::GoldLockboxCoin,
        Self::GoldPickpocketCoin,
        Self::GoldQuestReward,
        Self::GoldAuctionPayout,
        Self::GoldTradeOrCod,
        Self::GoldMobLootCoin,
        Self::GoldTreasureOrContainerCoin,
        Self::GoldOther,
        Self::XpQuestTurnin,
        Self::XpZoneDiscovery,
        Self::XpMobKill,
        Self::RepQuestTurnin,
        Self::RepItemTurnin,
        Self::RepMobKill,
        Self::RepOther,
        Self::GatheringNode,
        Self::HonorKill,
    ];

    /// The ledger account coin from this source posts into, if any.
    #[must_use]
    pub const fn cash_account(self) -> Option<&'static str> {
        match self {
            Self::GoldMail => Some("Income:Cash:Mail"),
            Self::GoldVendorSale => Some("Income:Cash:Vendor"),
            Self::GoldLockboxCoin => Some("Income:Cash:Lockbox"),
            Self::GoldPickpocketCoin => Some("Income:Cash:Pickpocket"),
            Self::GoldQuestReward => Some("Income:Cash:Quests"),
            Self::GoldAuctionPayout => Some("Income:Cash:Auction"),
            Self::GoldTradeOrCod => Some("Income:Cash:Trade"),
            Self::GoldMobLootCoin => Some("Income:Cash:Loot"),
            Self::GoldTreasureOrContainerCoin => Some("Income:Cash:Containers"),
            Self::GoldOther => Some("Income:Cash:Other"),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| format!("invalid source: {s}"))
    }
}

impl TryFrom<String> for Source {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Source> for String {
    fn from(source: Source) -> Self {
        source.as_str().to_string()
    }
}

/// How certain the classifier is about a source assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// A classified, attributed interpretation of one raw telemetry event.
///
/// Ephemeral: produced by the classifier, consumed once by the policy
/// engine, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activity {
    pub source: Source,
    pub confidence: Confidence,
    pub amount: i64,
    /// Set while a mailbox or merchant UI is open; suppresses auto-session
    /// start evaluation.
    pub should_suppress: bool,
}
