//! Unit categories, their base stats, and the counter table
//!
//! Categories are the attack/defend classes used by the counter lookup.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::BattleError;

/// Soldier/squad category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitCategory {
    Infantry,
    Ranged,
    Cavalry,
    Wizard,
    Siege,
}

/// Base per-soldier stats for a category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub max_health: f32,
    pub power: f32,
    pub armor: f32,
    pub accuracy: f32,
    pub evasion: f32,
    pub crit_chance: f32,
    /// Metres per second at full freshness
    pub speed: f32,
    /// Weapon reach (melee) or maximum range (ranged), centre to centre
    pub weapon_range: f32,
    /// Seconds between attacks
    pub attack_interval: f32,
    pub ranged: bool,
    pub can_charge: bool,
}

impl UnitCategory {
    pub const ALL: [UnitCategory; 5] = [
        UnitCategory::Infantry,
        UnitCategory::Ranged,
        UnitCategory::Cavalry,
        UnitCategory::Wizard,
        UnitCategory::Siege,
    ];

    /// Get default stats for this category
    pub fn base_stats(&self) -> CategoryStats {
        match self {
            UnitCategory::Infantry => CategoryStats {
                max_health: 100.0,
                power: 10.0,
                armor: 3.0,
                accuracy: 0.75,
                evasion: 0.10,
                crit_chance: 0.05,
                speed: 3.0,
                weapon_range: 1.5,
                attack_interval: 1.0,
                ranged: false,
                can_charge: true,
            },
            UnitCategory::Ranged => CategoryStats {
                max_health: 80.0,
                power: 8.0,
                armor: 1.0,
                accuracy: 0.65,
                evasion: 0.10,
                crit_chance: 0.05,
                speed: 3.0,
                weapon_range: 30.0,
                attack_interval: 2.0,
                ranged: true,
                can_charge: false,
            },
            UnitCategory::Cavalry => CategoryStats {
                max_health: 150.0,
                power: 14.0,
                armor: 5.0,
                accuracy: 0.70,
                evasion: 0.15,
                crit_chance: 0.08,
                speed: 7.0,
                weapon_range: 1.8,
                attack_interval: 1.2,
                ranged: false,
                can_charge: true,
            },
            UnitCategory::Wizard => CategoryStats {
                max_health: 60.0,
                power: 18.0,
                armor: 0.5,
                accuracy: 0.70,
                evasion: 0.05,
                crit_chance: 0.10,
                speed: 2.5,
                weapon_range: 20.0,
                attack_interval: 3.0,
                ranged: true,
                can_charge: false,
            },
            UnitCategory::Siege => CategoryStats {
                max_health: 200.0,
                power: 40.0,
                armor: 6.0,
                accuracy: 0.40,
                evasion: 0.0,
                crit_chance: 0.02,
                speed: 1.0,
                weapon_range: 60.0,
                attack_interval: 6.0,
                ranged: true,
                can_charge: false,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UnitCategory::Infantry => "infantry",
            UnitCategory::Ranged => "ranged",
            UnitCategory::Cavalry => "cavalry",
            UnitCategory::Wizard => "wizard",
            UnitCategory::Siege => "siege",
        }
    }
}

impl fmt::Display for UnitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UnitCategory {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "infantry" | "spearmen" | "footmen" => Ok(UnitCategory::Infantry),
            "ranged" | "archer" | "archers" | "crossbowmen" => Ok(UnitCategory::Ranged),
            "cavalry" | "horse" | "horsemen" => Ok(UnitCategory::Cavalry),
            "wizard" | "mage" | "magic" => Ok(UnitCategory::Wizard),
            "siege" | "catapult" | "engine" => Ok(UnitCategory::Siege),
            _ => Err(BattleError::UnknownCategory(s.to_string())),
        }
    }
}

/// One row of the counter table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CounterEntry {
    pub attacker: UnitCategory,
    pub defender: UnitCategory,
    pub multiplier: f32,
}

/// Category-vs-category damage multipliers; unlisted pairs are 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterTable {
    pub entries: Vec<CounterEntry>,
}

impl Default for CounterTable {
    fn default() -> Self {
        use UnitCategory::*;
        let rows = [
            (Infantry, Cavalry, 1.25),
            (Cavalry, Infantry, 0.85),
            (Cavalry, Ranged, 1.5),
            (Ranged, Cavalry, 0.7),
            (Ranged, Infantry, 1.25),
            (Infantry, Ranged, 0.85),
            (Cavalry, Wizard, 1.5),
            (Wizard, Cavalry, 0.7),
            (Wizard, Infantry, 1.3),
            (Infantry, Wizard, 0.9),
            (Cavalry, Siege, 1.5),
            (Siege, Cavalry, 0.6),
            (Infantry, Siege, 1.3),
            (Siege, Infantry, 0.9),
        ];
        Self {
            entries: rows
                .into_iter()
                .map(|(attacker, defender, multiplier)| CounterEntry {
                    attacker,
                    defender,
                    multiplier,
                })
                .collect(),
        }
    }
}

impl CounterTable {
    /// Multiplier applied when `attacker` hits `defender`
    pub fn multiplier(&self, attacker: UnitCategory, defender: UnitCategory) -> f32 {
        self.entries
            .iter()
            .find(|e| e.attacker == attacker && e.defender == defender)
            .map(|e| e.multiplier)
            .unwrap_or(1.0)
    }

    /// Does `attacker` counter `defender`?
    pub fn counters(&self, attacker: UnitCategory, defender: UnitCategory) -> bool {
        self.multiplier(attacker, defender) > 1.0
    }
}
