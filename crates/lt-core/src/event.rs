//! Inbound telemetry events as a closed sum type.
//!
//! The host delivers one discriminated payload per event kind; the classifier
//! dispatches over these exhaustively. UI open/close notifications only arm
//! or disarm classifier context, they are never classified themselves.

use serde::{Deserialize, Serialize};

/// One faction row from a standing snapshot poll.
///
/// Keyed by stable faction ID, never by list position: collapsed headers
/// shift positions between polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionStanding {
    pub faction_id: u32,
    pub name: String,
    /// Cumulative reputation value within the current standing.
    pub value: i64,
}

/// A raw telemetry event from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    /// Money entered the player's bags; `message` is the host's free-text
    /// description (e.g. `"You loot 1 Silver, 20 Copper"`).
    MoneyGained { copper: i64, message: String },
    /// A loot notice containing an item link (`|Hitem:ID|...`).
    LootMessage { message: String },
    /// Cumulative XP poll for the player.
    XpUpdate {
        current_xp: i64,
        level: u32,
        max_level: u32,
    },
    /// Honor awarded from the combat log.
    HonorGained { amount: i64 },
    /// Full faction standing table poll.
    FactionStandings { standings: Vec<FactionStanding> },
    /// A spell cast completed.
    SpellCastSucceeded {
        unit: String,
        spell_id: u32,
        spell_name: String,
    },
    /// A quest was handed in.
    QuestTurnedIn {
        quest_id: u32,
        xp_reward: bool,
        money_reward: bool,
    },
    /// Free-text system message, scanned for keywords.
    SystemMessage { text: String },
    MailboxOpened,
    MailboxClosed,
    MerchantOpened,
    MerchantClosed,
    /// AFK flag changed; routed to the watchdog, not the classifier.
    AfkChanged { afk: bool },
}

/// Coarse item classification used to route loot notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemClass {
    /// Ore, herbs, skins: produced by a gathering profession.
    Gathering,
    /// A lockbox or other coin container.
    Lockbox,
    Other,
}

/// Price/classification lookup for items, supplied by the host.
pub trait ItemInfo {
    /// Classifies an item for loot routing.
    fn classify(&self, item_id: u32) -> ItemClass;

    /// Appraised copper value per item, 0 when unknown.
    fn unit_value(&self, item_id: u32) -> i64;
}

/// A fixed in-memory item table; the default provider for the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticItemTable {
    entries: std::collections::HashMap<u32, (ItemClass, i64)>,
}

impl StaticItemTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A small table of well-known gathering mats and lockboxes.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        // Ores and herbs.
        for (id, value) in [
            (2770, 50),   // Copper Ore
            (2771, 150),  // Tin Ore
            (2772, 400),  // Iron Ore
            (10_620, 900), // Thorium Ore
            (2447, 20),   // Peacebloom
            (765, 15),    // Silverleaf
            (8836, 600),  // Arthas' Tears
            (13_463, 800), // Dreamfoil
        ] {
            table.insert(id, ItemClass::Gathering, value);
        }
        // Lockboxes.
        for id in [4632, 4633, 4634, 5758, 5759, 5760, 16_882, 16_883] {
            table.insert(id, ItemClass::Lockbox, 0);
        }
        table
    }

    pub fn insert(&mut self, item_id: u32, class: ItemClass, unit_value: i64) {
        self.entries.insert(item_id, (class, unit_value));
    }
}

impl ItemInfo for StaticItemTable {
    fn classify(&self, item_id: u32) -> ItemClass {
        self.entries
            .get(&item_id)
            .map_or(ItemClass::Other, |(class, _)| *class)
    }

    fn unit_value(&self, item_id: u32) -> i64 {
        self.entries.get(&item_id).map_or(0, |(_, value)| *value)
    }
}
