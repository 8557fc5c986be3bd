//! Squads: the command-addressable unit
//!
//! A squad owns an ordered roster fixed at spawn plus the subset still on the
//! field. Soldier `living[i]` occupies formation slot `i`.

use serde::{Deserialize, Serialize};

use crate::battle::category::UnitCategory;
use crate::battle::formation::FormationState;
use crate::battle::soldier::SoldierArena;
use crate::battle::special_actions::{ActionSlot, SpecialActionKind};
use crate::core::types::{SoldierId, SquadId, TeamId, Tick, Vec2};

/// Who decides this squad's tactic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Controller {
    Player,
    #[default]
    Autonomous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SquadState {
    #[default]
    Idle,
    Advancing,
    Engaging,
    Retreating,
    Routing,
    Destroyed,
}

/// Last order given by a command
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    #[default]
    None,
    MoveTo {
        destination: Vec2,
    },
    Attack {
        target: SquadId,
    },
    Hold,
    Retreat,
    Special {
        action: SpecialActionKind,
        target: Option<SquadId>,
    },
}

/// What the squad is doing this tick; written only by the AI controller
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Tactic {
    #[default]
    Idle,
    Hold,
    MoveTo {
        destination: Vec2,
    },
    Advance {
        target: SquadId,
    },
    Retreat,
    Special {
        action: SpecialActionKind,
        target: Option<SquadId>,
    },
}

impl Tactic {
    pub fn name(&self) -> &'static str {
        match self {
            Tactic::Idle => "idle",
            Tactic::Hold => "hold",
            Tactic::MoveTo { .. } => "move",
            Tactic::Advance { .. } => "advance",
            Tactic::Retreat => "retreat",
            Tactic::Special { action, .. } => action.name(),
        }
    }

    pub fn target(&self) -> Option<SquadId> {
        match self {
            Tactic::Advance { target } => Some(*target),
            Tactic::Special { target, .. } => *target,
            _ => None,
        }
    }
}

/// Aggregate modifiers from the commanding general and drill, all in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SquadStats {
    pub leadership: f32,
    pub strength: f32,
    pub intelligence: f32,
    pub training: f32,
}

impl Default for SquadStats {
    fn default() -> Self {
        Self {
            leadership: 0.0,
            strength: 0.0,
            intelligence: 0.0,
            training: 0.5,
        }
    }
}

impl SquadStats {
    /// Fraction of negative morale a soldier of this squad resists
    pub fn resolve(&self) -> f32 {
        (0.6 * self.leadership + 0.4 * self.training).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Squad {
    pub id: SquadId,
    pub team: TeamId,
    pub category: UnitCategory,
    pub controller: Controller,
    pub formation: FormationState,
    /// Every soldier spawned for this squad, in id order
    pub roster: Vec<SoldierId>,
    /// Soldiers alive and on the field, in id order
    pub living: Vec<SoldierId>,
    pub stats: SquadStats,
    pub has_general: bool,
    pub ai_profile: Option<String>,
    pub intent: Intent,
    pub tactic: Tactic,
    pub state: SquadState,
    pub anchor: Vec2,
    pub heading: f32,
    /// Heading at deployment; retreats go the opposite way
    pub deploy_heading: f32,
    pub actions: ActionSlot,
    /// Autonomous squads follow their intent until this tick
    pub manual_until: Option<Tick>,
    pub kills: u32,
    pub escaped: u32,
    pub starting_count: usize,
    /// Seconds of flank pressure left
    pub flanked_timer: f32,
    /// Any soldier fought during the last tick
    pub engaged: bool,
}

impl Squad {
    pub fn is_destroyed(&self) -> bool {
        self.state == SquadState::Destroyed
    }

    /// Still able to fight: neither destroyed nor routing
    pub fn is_active(&self) -> bool {
        !matches!(self.state, SquadState::Destroyed | SquadState::Routing)
    }

    pub fn living_count(&self) -> usize {
        self.living.len()
    }

    /// Direction of withdrawal: back the way the squad deployed
    pub fn retreat_direction(&self) -> Vec2 {
        -Vec2::from_heading(self.deploy_heading)
    }

    /// Follows intent rather than the behaviour tree at `tick`
    pub fn is_manually_controlled(&self, tick: Tick) -> bool {
        self.controller == Controller::Player || self.manual_until.map_or(false, |until| tick < until)
    }

    pub fn centroid(&self, soldiers: &SoldierArena) -> Vec2 {
        let mut sum = Vec2::ZERO;
        let mut n = 0usize;
        for soldier in self.living.iter().filter_map(|id| soldiers.get(*id)) {
            sum += soldier.position;
            n += 1;
        }
        if n == 0 {
            self.anchor
        } else {
            sum * (1.0 / n as f32)
        }
    }

    pub fn average_morale(&self, soldiers: &SoldierArena) -> f32 {
        let morale: Vec<f32> = self
            .living
            .iter()
            .filter_map(|id| soldiers.get(*id))
            .map(|s| s.morale)
            .collect();
        if morale.is_empty() {
            0.0
        } else {
            morale.iter().sum::<f32>() / morale.len() as f32
        }
    }

    pub fn routing_fraction(&self, soldiers: &SoldierArena) -> f32 {
        if self.living.is_empty() {
            return 0.0;
        }
        let routing = self
            .living
            .iter()
            .filter_map(|id| soldiers.get(*id))
            .filter(|s| s.is_routing())
            .count();
        routing as f32 / self.living.len() as f32
    }
}

/// Read-only per-tick summary used by targeting and the AI
#[derive(Debug, Clone, PartialEq)]
pub struct SquadView {
    pub id: SquadId,
    pub team: TeamId,
    pub category: UnitCategory,
    pub state: SquadState,
    pub tactic: Tactic,
    pub anchor: Vec2,
    pub heading: f32,
    pub centroid: Vec2,
    pub living: usize,
    pub starting: usize,
    /// Remaining health as a fraction of the squad's starting health
    pub health_fraction: f32,
    pub average_morale: f32,
    pub routing_fraction: f32,
    pub engaged: bool,
    pub flanked: bool,
    /// Damage per second the squad can still deal
    pub threat: f32,
    pub weapon_range: f32,
    pub ranged: bool,
    pub can_charge: bool,
    pub actions: ActionSlot,
}

impl SquadView {
    pub fn build(squad: &Squad, soldiers: &SoldierArena) -> Self {
        let stats = squad.category.base_stats();
        let mut health = 0.0;
        let mut max_health = 0.0;
        let mut power = 0.0;
        for soldier in squad.living.iter().filter_map(|id| soldiers.get(*id)) {
            health += soldier.health;
            max_health = soldier.max_health;
            power += soldier.stats.power / soldier.stats.attack_interval.max(0.1);
        }
        let starting_health = max_health * squad.starting_count as f32;

        Self {
            id: squad.id,
            team: squad.team,
            category: squad.category,
            state: squad.state,
            tactic: squad.tactic,
            anchor: squad.anchor,
            heading: squad.heading,
            centroid: squad.centroid(soldiers),
            living: squad.living.len(),
            starting: squad.starting_count,
            health_fraction: if starting_health > 0.0 {
                (health / starting_health).clamp(0.0, 1.0)
            } else {
                0.0
            },
            average_morale: squad.average_morale(soldiers),
            routing_fraction: squad.routing_fraction(soldiers),
            engaged: squad.engaged,
            flanked: squad.flanked_timer > 0.0,
            threat: power,
            weapon_range: stats.weapon_range,
            ranged: stats.ranged,
            can_charge: stats.can_charge,
            actions: squad.actions.clone(),
        }
    }

    /// Selectable as a target: on the field with soldiers left
    pub fn is_targetable(&self) -> bool {
        self.state != SquadState::Destroyed && self.living > 0
    }

    pub fn strength_ratio(&self) -> f32 {
        if self.starting == 0 {
            0.0
        } else {
            self.living as f32 / self.starting as f32
        }
    }
}
