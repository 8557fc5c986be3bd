//! AI behaviour profiles
//!
//! Profiles are named in `[ai.profiles.<name>]` tables of the battle config
//! and picked per squad by the init record.

use serde::{Deserialize, Serialize};

use crate::battle::targeting::TargetWeights;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiProfile {
    /// Tendency to commit (0.0 = passive, 1.0 = reckless)
    pub aggression: f32,
    /// Tendency to preserve the squad (0.0 = never withdraws)
    pub caution: f32,
    /// Ticks between behaviour tree evaluations
    pub evaluation_interval: u64,
    /// Average morale below which the squad withdraws
    pub retreat_morale: f32,
    /// Surviving fraction below which an engaged squad withdraws
    pub retreat_strength_ratio: f32,
    /// Own/target living ratio needed before flanking
    pub flank_strength_ratio: f32,
    /// Distance at which a charge is considered
    pub charge_range: f32,
    pub weights: TargetWeights,
}

impl Default for AiProfile {
    fn default() -> Self {
        Self {
            aggression: 0.5,
            caution: 0.5,
            evaluation_interval: 5,
            retreat_morale: 30.0,
            retreat_strength_ratio: 0.3,
            flank_strength_ratio: 1.2,
            charge_range: 40.0,
            weights: TargetWeights::default(),
        }
    }
}

impl AiProfile {
    pub fn aggressive() -> Self {
        Self {
            aggression: 0.85,
            caution: 0.2,
            evaluation_interval: 3,
            retreat_morale: 20.0,
            retreat_strength_ratio: 0.15,
            flank_strength_ratio: 0.9,
            charge_range: 55.0,
            weights: TargetWeights {
                distance: 0.8,
                counter: 0.8,
                health: 0.7,
                threat: 0.1,
                ..TargetWeights::default()
            },
        }
    }

    pub fn cautious() -> Self {
        Self {
            aggression: 0.25,
            caution: 0.85,
            evaluation_interval: 8,
            retreat_morale: 40.0,
            retreat_strength_ratio: 0.5,
            flank_strength_ratio: 1.6,
            charge_range: 25.0,
            weights: TargetWeights {
                distance: 1.2,
                counter: 0.9,
                health: 0.2,
                threat: 0.6,
                ..TargetWeights::default()
            },
        }
    }

    /// Morale line for withdrawal, nudged up by caution
    pub fn effective_retreat_morale(&self) -> f32 {
        self.retreat_morale + 10.0 * (self.caution - 0.5)
    }
}
