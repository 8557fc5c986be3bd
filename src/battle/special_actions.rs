//! Scripted multi-tick manoeuvres
//!
//! Each action is a small state machine: entry checks, one or two phases,
//! a duration, then a cooldown before the same action is eligible again.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::battle::formation::FormationType;
use crate::battle::squad::{SquadState, SquadView};
use crate::core::config::ActionConfig;
use crate::core::types::{SquadId, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialActionKind {
    Charge,
    Flank,
    Kite,
    Surround,
    DefensiveFormation,
}

impl SpecialActionKind {
    pub const ALL: [SpecialActionKind; 5] = [
        SpecialActionKind::Charge,
        SpecialActionKind::Flank,
        SpecialActionKind::Kite,
        SpecialActionKind::Surround,
        SpecialActionKind::DefensiveFormation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SpecialActionKind::Charge => "charge",
            SpecialActionKind::Flank => "flank",
            SpecialActionKind::Kite => "kite",
            SpecialActionKind::Surround => "surround",
            SpecialActionKind::DefensiveFormation => "defensive_formation",
        }
    }

    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            SpecialActionKind::Charge | SpecialActionKind::Flank | SpecialActionKind::Surround
        )
    }

    pub fn cooldown(&self, config: &ActionConfig) -> f32 {
        match self {
            SpecialActionKind::Charge => config.charge_cooldown,
            SpecialActionKind::Flank => config.flank_cooldown,
            SpecialActionKind::Kite => config.kite_cooldown,
            SpecialActionKind::Surround => config.surround_cooldown,
            SpecialActionKind::DefensiveFormation => config.defensive_cooldown,
        }
    }
}

impl fmt::Display for SpecialActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SpecialActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "defensive" | "brace" => Ok(SpecialActionKind::DefensiveFormation),
            other => SpecialActionKind::ALL
                .into_iter()
                .find(|k| k.name() == other)
                .ok_or_else(|| format!("unknown special action `{s}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPhase {
    Approach,
    Engage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAction {
    pub kind: SpecialActionKind,
    pub target: Option<SquadId>,
    pub phase: ActionPhase,
    /// Seconds spent in the current phase
    pub elapsed: f32,
    pub duration: f32,
    pub waypoint: Option<Vec2>,
    /// Charge shock already delivered
    pub impact_delivered: bool,
    /// Formation to restore when a defensive action ends
    pub previous_formation: Option<FormationType>,
}

/// A squad's action state: at most one active action, per-kind cooldowns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionSlot {
    pub active: Option<ActiveAction>,
    pub cooldowns: BTreeMap<SpecialActionKind, f32>,
}

impl ActionSlot {
    pub fn cooldown(&self, kind: SpecialActionKind) -> f32 {
        self.cooldowns.get(&kind).copied().unwrap_or(0.0)
    }

    pub fn is_ready(&self, kind: SpecialActionKind) -> bool {
        self.active.is_none() && self.cooldown(kind) <= 0.0
    }

    pub fn active_kind(&self) -> Option<SpecialActionKind> {
        self.active.as_ref().map(|a| a.kind)
    }

    pub fn tick_cooldowns(&mut self, dt: f32) {
        for remaining in self.cooldowns.values_mut() {
            *remaining = (*remaining - dt).max(0.0);
        }
        self.cooldowns.retain(|_, remaining| *remaining > 0.0);
    }

    /// End the active action and start its cooldown
    pub fn finish(&mut self, config: &ActionConfig) -> Option<ActiveAction> {
        let action = self.active.take()?;
        self.cooldowns.insert(action.kind, action.kind.cooldown(config));
        Some(action)
    }
}

/// Entry checks; `Err` carries the veto reason
pub fn check_eligibility(
    kind: SpecialActionKind,
    squad: &SquadView,
    target: Option<&SquadView>,
    config: &ActionConfig,
) -> Result<(), &'static str> {
    if matches!(squad.state, SquadState::Routing | SquadState::Destroyed) {
        return Err("squad is routing");
    }
    if squad.actions.active.is_some() {
        return Err("another action is in progress");
    }
    if squad.actions.cooldown(kind) > 0.0 {
        return Err("action is cooling down");
    }
    if kind.requires_target() && target.is_none() {
        return Err("a target squad is required");
    }
    if let Some(target) = target {
        if !target.is_targetable() {
            return Err("target is unavailable");
        }
    }

    match kind {
        SpecialActionKind::Charge => {
            if !squad.can_charge {
                return Err("category cannot charge");
            }
            let in_range = target.map_or(false, |t| {
                squad.centroid.distance(&t.centroid) <= config.charge_max_range
            });
            if !in_range {
                return Err("target out of charge range");
            }
        }
        SpecialActionKind::Flank => {
            if squad.ranged {
                return Err("ranged squads cannot flank");
            }
        }
        SpecialActionKind::Kite => {
            if !squad.ranged {
                return Err("only ranged squads can kite");
            }
        }
        SpecialActionKind::Surround => {
            if squad.ranged {
                return Err("ranged squads cannot surround");
            }
            let strong_enough = target.map_or(false, |t| {
                squad.living as f32 >= t.living as f32 * config.surround_strength_ratio
            });
            if !strong_enough {
                return Err("not enough strength to surround");
            }
        }
        SpecialActionKind::DefensiveFormation => {}
    }
    Ok(())
}

/// Build the running state for an accepted action
pub fn start(
    kind: SpecialActionKind,
    target: Option<SquadId>,
    current_formation: FormationType,
    config: &ActionConfig,
) -> ActiveAction {
    let (phase, duration) = match kind {
        SpecialActionKind::Charge => (ActionPhase::Engage, config.charge_duration),
        SpecialActionKind::Flank => (ActionPhase::Approach, config.flank_approach_timeout),
        SpecialActionKind::Kite => (ActionPhase::Engage, config.kite_duration),
        SpecialActionKind::Surround => (ActionPhase::Engage, config.surround_duration),
        SpecialActionKind::DefensiveFormation => (ActionPhase::Engage, config.defensive_duration),
    };
    ActiveAction {
        kind,
        target,
        phase,
        elapsed: 0.0,
        duration,
        waypoint: None,
        impact_delivered: false,
        previous_formation: (kind == SpecialActionKind::DefensiveFormation).then_some(current_formation),
    }
}

/// Where the target squad is this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetFix {
    pub centroid: Vec2,
    pub heading: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionContext {
    pub anchor: Vec2,
    /// `None` once the target is destroyed
    pub target: Option<TargetFix>,
    pub nearest_enemy: Option<Vec2>,
    pub weapon_range: f32,
}

/// Movement order an action hands to the squad this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Directive {
    Pursue { target: SquadId },
    Reposition { waypoint: Vec2 },
    Surround { target: SquadId },
    Kite { away_from: Option<Vec2> },
    Brace,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionStep {
    Continue(Directive),
    Finished,
}

const WAYPOINT_REACHED: f32 = 3.0;

fn flank_waypoint(anchor: Vec2, target: &TargetFix, offset: f32) -> Vec2 {
    let forward = Vec2::from_heading(target.heading);
    let right = Vec2::new(forward.z, -forward.x);
    let side = if (anchor - target.centroid).dot(&right) >= 0.0 {
        1.0
    } else {
        -1.0
    };
    let angle = target.heading + side * 3.0 * std::f32::consts::FRAC_PI_4;
    target.centroid + Vec2::from_heading(angle) * offset
}

/// Advance an action by `dt` and report what the squad should do
pub fn advance(action: &mut ActiveAction, ctx: &ActionContext, config: &ActionConfig, dt: f32) -> ActionStep {
    action.elapsed += dt;

    let target = match (action.kind.requires_target(), action.target, ctx.target) {
        (true, Some(id), Some(fix)) => Some((id, fix)),
        (true, _, _) => return ActionStep::Finished,
        (false, Some(id), Some(fix)) => Some((id, fix)),
        (false, _, _) => None,
    };

    match action.kind {
        SpecialActionKind::Charge => match target {
            Some((id, _)) if action.elapsed < action.duration => {
                ActionStep::Continue(Directive::Pursue { target: id })
            }
            _ => ActionStep::Finished,
        },
        SpecialActionKind::Flank => {
            let Some((id, fix)) = target else {
                return ActionStep::Finished;
            };
            match action.phase {
                ActionPhase::Approach => {
                    let waypoint = flank_waypoint(ctx.anchor, &fix, config.flank_offset);
                    action.waypoint = Some(waypoint);
                    if ctx.anchor.distance(&waypoint) <= WAYPOINT_REACHED || action.elapsed >= action.duration {
                        action.phase = ActionPhase::Engage;
                        action.elapsed = 0.0;
                        action.duration = config.flank_duration;
                        action.waypoint = None;
                        ActionStep::Continue(Directive::Pursue { target: id })
                    } else {
                        ActionStep::Continue(Directive::Reposition { waypoint })
                    }
                }
                ActionPhase::Engage if action.elapsed < action.duration => {
                    ActionStep::Continue(Directive::Pursue { target: id })
                }
                ActionPhase::Engage => ActionStep::Finished,
            }
        }
        SpecialActionKind::Kite => {
            if action.elapsed >= action.duration {
                return ActionStep::Finished;
            }
            let kite_distance = ctx.weapon_range * config.kite_distance_fraction;
            let away_from = ctx
                .nearest_enemy
                .filter(|enemy| enemy.distance(&ctx.anchor) < kite_distance);
            ActionStep::Continue(Directive::Kite { away_from })
        }
        SpecialActionKind::Surround => match target {
            Some((id, _)) if action.elapsed < action.duration => {
                ActionStep::Continue(Directive::Surround { target: id })
            }
            _ => ActionStep::Finished,
        },
        SpecialActionKind::DefensiveFormation => {
            if action.elapsed >= action.duration {
                ActionStep::Finished
            } else {
                ActionStep::Continue(Directive::Brace)
            }
        }
    }
}
