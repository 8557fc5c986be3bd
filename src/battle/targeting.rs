//! Enemy squad scoring
//!
//! Score = weighted sum of distance, counter advantage, remaining health and
//! threat. Highest score wins; ties go to the lowest squad id.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::battle::category::CounterTable;
use crate::battle::squad::SquadView;
use crate::core::types::SquadId;

/// Weights for the target score terms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetWeights {
    pub distance: f32,
    pub counter: f32,
    pub health: f32,
    pub threat: f32,
    /// Distance at which the distance score reaches zero
    pub max_distance: f32,
}

impl Default for TargetWeights {
    fn default() -> Self {
        Self {
            distance: 1.0,
            counter: 0.6,
            health: 0.4,
            threat: 0.3,
            max_distance: 150.0,
        }
    }
}

/// Chosen target with its score breakdown
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetInfo {
    pub squad: SquadId,
    pub distance: f32,
    pub score: f32,
    pub distance_score: f32,
    pub counter_score: f32,
    pub health_score: f32,
    pub threat_score: f32,
}

/// Pick the best enemy for `selector` among `candidates`. Friendly,
/// destroyed and empty squads are skipped.
pub fn select_target(
    selector: &SquadView,
    candidates: &[SquadView],
    weights: &TargetWeights,
    counters: &CounterTable,
) -> Option<TargetInfo> {
    let enemies: Vec<&SquadView> = candidates
        .iter()
        .filter(|c| c.team != selector.team && c.is_targetable())
        .collect();

    let max_threat = enemies.iter().map(|c| c.threat).fold(0.0f32, f32::max);

    enemies
        .into_iter()
        .map(|candidate| score(selector, candidate, weights, counters, max_threat))
        .max_by_key(|info| (OrderedFloat(info.score), Reverse(info.squad)))
}

fn score(
    selector: &SquadView,
    candidate: &SquadView,
    weights: &TargetWeights,
    counters: &CounterTable,
    max_threat: f32,
) -> TargetInfo {
    let distance = selector.centroid.distance(&candidate.centroid);
    let distance_score = if weights.max_distance > 0.0 {
        (1.0 - distance / weights.max_distance).max(0.0)
    } else {
        0.0
    };

    let advantage = counters.multiplier(selector.category, candidate.category)
        - counters.multiplier(candidate.category, selector.category);
    let counter_score = advantage.clamp(-1.0, 1.0);

    let health_score = 1.0 - candidate.health_fraction.clamp(0.0, 1.0);
    let threat_score = if max_threat > 0.0 {
        candidate.threat / max_threat
    } else {
        0.0
    };

    let score = weights.distance * distance_score
        + weights.counter * counter_score
        + weights.health * health_score
        + weights.threat * threat_score;

    TargetInfo {
        squad: candidate.id,
        distance,
        score,
        distance_score,
        counter_score,
        health_score,
        threat_score,
    }
}
