//! Individual combatants and the arena that owns them
//!
//! Soldiers never move between squads; the arena index is the soldier id.

use serde::{Deserialize, Serialize};

use crate::battle::buffs::{BuffKind, BuffSet};
use crate::battle::category::{CategoryStats, UnitCategory};
use crate::battle::constants::{FATIGUE_MAX, FATIGUE_MIN, MORALE_MAX, MORALE_MIN};
use crate::core::types::{SoldierId, SquadId, TeamId, Vec2};

/// Per-soldier behaviour state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoldierState {
    #[default]
    Idle,
    Advancing,
    Engaging,
    Charging,
    Retreating,
    Routing,
    Dead,
}

impl SoldierState {
    /// Can this soldier declare a new attack?
    pub fn is_offensive(&self) -> bool {
        !matches!(
            self,
            SoldierState::Retreating | SoldierState::Routing | SoldierState::Dead
        )
    }

    pub fn is_fighting(&self) -> bool {
        matches!(self, SoldierState::Engaging | SoldierState::Charging)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Soldier {
    pub id: SoldierId,
    pub squad: SquadId,
    pub team: TeamId,
    pub category: UnitCategory,
    /// Stats after training and general modifiers
    pub stats: CategoryStats,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Heading in radians (0 = +z)
    pub facing: f32,
    pub health: f32,
    pub max_health: f32,
    pub morale: f32,
    pub fatigue: f32,
    pub state: SoldierState,
    pub target: Option<SoldierId>,
    /// Seconds until the next attack may be declared
    pub attack_cooldown: f32,
    pub buffs: BuffSet,
    /// Fraction of negative morale shrugged off, from leadership and training
    pub resolve: f32,
    pub disordered: bool,
    pub escaped: bool,
    pub kills: u32,
    /// Distance covered during the current tick
    #[serde(skip)]
    pub moved: f32,
    /// Attacks made during the current tick
    #[serde(skip)]
    pub attacks: u32,
}

impl Soldier {
    pub fn is_alive(&self) -> bool {
        self.state != SoldierState::Dead
    }

    /// Alive and still on the field
    pub fn is_present(&self) -> bool {
        self.is_alive() && !self.escaped
    }

    pub fn is_routing(&self) -> bool {
        self.state == SoldierState::Routing
    }

    pub fn set_morale(&mut self, value: f32) {
        self.morale = value.clamp(MORALE_MIN, MORALE_MAX);
    }

    pub fn set_fatigue(&mut self, value: f32) {
        self.fatigue = value.clamp(FATIGUE_MIN, FATIGUE_MAX);
    }

    /// Multiplier applied to attack, defence and speed by fatigue
    pub fn fatigue_factor(&self, penalty_at_max: f32) -> f32 {
        1.0 - penalty_at_max * (self.fatigue / FATIGUE_MAX)
    }

    /// Movement speed before terrain and formation modifiers
    pub fn base_speed(&self, penalty_at_max: f32) -> f32 {
        self.stats.speed * self.fatigue_factor(penalty_at_max) * self.buffs.multiplier(BuffKind::Speed)
    }

    pub fn kill(&mut self) {
        self.health = 0.0;
        self.state = SoldierState::Dead;
        self.target = None;
        self.velocity = Vec2::ZERO;
        self.buffs.clear();
    }
}

/// Spawn parameters shared by every soldier of a squad
#[derive(Debug, Clone, Copy)]
pub struct SoldierTemplate {
    pub squad: SquadId,
    pub team: TeamId,
    pub category: UnitCategory,
    pub stats: CategoryStats,
    pub morale: f32,
    pub resolve: f32,
}

/// Dense soldier storage; ids are arena indices and are never reused
#[derive(Debug, Clone, Default)]
pub struct SoldierArena {
    soldiers: Vec<Soldier>,
}

impl SoldierArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, template: &SoldierTemplate, position: Vec2, facing: f32) -> SoldierId {
        let id = SoldierId(self.soldiers.len() as u32);
        self.soldiers.push(Soldier {
            id,
            squad: template.squad,
            team: template.team,
            category: template.category,
            stats: template.stats,
            position,
            velocity: Vec2::ZERO,
            facing,
            health: template.stats.max_health,
            max_health: template.stats.max_health,
            morale: template.morale.clamp(MORALE_MIN, MORALE_MAX),
            fatigue: 0.0,
            state: SoldierState::Idle,
            target: None,
            attack_cooldown: 0.0,
            buffs: BuffSet::new(),
            resolve: template.resolve.clamp(0.0, 1.0),
            disordered: false,
            escaped: false,
            kills: 0,
            moved: 0.0,
            attacks: 0,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.soldiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.soldiers.is_empty()
    }

    pub fn get(&self, id: SoldierId) -> Option<&Soldier> {
        self.soldiers.get(id.index())
    }

    pub fn get_mut(&mut self, id: SoldierId) -> Option<&mut Soldier> {
        self.soldiers.get_mut(id.index())
    }

    /// All soldiers ever spawned, in id order
    pub fn iter(&self) -> impl Iterator<Item = &Soldier> {
        self.soldiers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Soldier> {
        self.soldiers.iter_mut()
    }

    /// Soldiers still alive and on the field, in id order
    pub fn present(&self) -> impl Iterator<Item = &Soldier> {
        self.soldiers.iter().filter(|s| s.is_present())
    }

    pub fn as_slice(&self) -> &[Soldier] {
        &self.soldiers
    }
}
