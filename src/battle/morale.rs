//! Morale and fatigue
//!
//! Morale falls with combat events and recovers with time. Crossing the rout
//! threshold routs the soldier immediately; routing soldiers rally once they
//! recover past the rally threshold with no enemy close by.

use serde::{Deserialize, Serialize};

use crate::battle::buffs::{BuffKind, BuffSource};
use crate::battle::soldier::{Soldier, SoldierState};
use crate::core::config::{FatigueConfig, MoraleConfig};
use crate::core::types::{SquadId, TeamId, Vec2};

/// Morale-affecting events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoraleEvent {
    AllyDeathNearby,
    FlankedHit,
    HeavyDamage,
    UnderFlankAttack,
    ChargedInto,
    AllyRouted,
    SquadBroken,
    CombatStress,
    EnemyRoutedNearby,
    GeneralPresence,
    EnemyKilled,
}

impl MoraleEvent {
    pub fn is_negative(&self) -> bool {
        !matches!(
            self,
            MoraleEvent::EnemyRoutedNearby | MoraleEvent::GeneralPresence | MoraleEvent::EnemyKilled
        )
    }

    /// Configured magnitude for one occurrence (per-second events scaled by the caller)
    pub fn magnitude(&self, config: &MoraleConfig) -> f32 {
        match self {
            MoraleEvent::AllyDeathNearby => config.ally_death,
            MoraleEvent::FlankedHit => config.flanked_hit,
            MoraleEvent::HeavyDamage => config.heavy_damage,
            MoraleEvent::UnderFlankAttack => config.flank_pressure_per_sec,
            MoraleEvent::ChargedInto => config.charge_shock,
            MoraleEvent::AllyRouted => config.ally_routed,
            MoraleEvent::SquadBroken => config.squad_broken,
            MoraleEvent::CombatStress => config.combat_stress_per_sec,
            MoraleEvent::EnemyRoutedNearby => config.enemy_routed,
            MoraleEvent::GeneralPresence => config.general_presence_per_sec,
            MoraleEvent::EnemyKilled => config.enemy_killed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoraleTransition {
    None,
    Routed,
    Rallied,
}

/// What the morale tick needs to know about a soldier's surroundings
#[derive(Debug, Clone, Copy, Default)]
pub struct MoraleTick {
    pub enemy_within_engage: bool,
    pub in_combat: bool,
    pub general_present: bool,
}

/// A rout waiting to spread to neighbours on the next tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutNotice {
    pub squad: SquadId,
    pub team: TeamId,
    pub position: Vec2,
}

/// Per-battle morale/fatigue rules plus the contagion queue
#[derive(Debug, Clone)]
pub struct MoraleSystem {
    morale: MoraleConfig,
    fatigue: FatigueConfig,
    pending: Vec<RoutNotice>,
}

impl MoraleSystem {
    pub fn new(morale: MoraleConfig, fatigue: FatigueConfig) -> Self {
        Self {
            morale,
            fatigue,
            pending: Vec::new(),
        }
    }

    pub fn config(&self) -> &MoraleConfig {
        &self.morale
    }

    /// Apply one event. Negative deltas are damped by resolve; a drop below
    /// the rout threshold routs the soldier right away.
    pub fn apply_event(&self, soldier: &mut Soldier, event: MoraleEvent, magnitude: f32) -> MoraleTransition {
        if !soldier.is_present() || magnitude <= 0.0 {
            return MoraleTransition::None;
        }

        if event.is_negative() {
            let damped = magnitude * (1.0 - soldier.resolve * self.morale.resolve_damping);
            soldier.set_morale(soldier.morale - damped);
            if !soldier.is_routing() && soldier.morale < self.morale.rout_threshold {
                self.rout(soldier);
                return MoraleTransition::Routed;
            }
        } else {
            soldier.set_morale(soldier.morale + magnitude);
        }
        MoraleTransition::None
    }

    /// Apply an event at its configured magnitude
    pub fn apply(&self, soldier: &mut Soldier, event: MoraleEvent) -> MoraleTransition {
        self.apply_event(soldier, event, event.magnitude(&self.morale))
    }

    fn rout(&self, soldier: &mut Soldier) {
        soldier.state = SoldierState::Routing;
        soldier.target = None;
        soldier.buffs.remove_source(BuffSource::Charge);
        soldier.buffs.remove_source(BuffSource::Brace);
    }

    /// Passive morale drift, rally checks and fatigue for one tick
    pub fn tick(&self, soldier: &mut Soldier, ctx: &MoraleTick, dt: f32) -> MoraleTransition {
        if !soldier.is_present() {
            return MoraleTransition::None;
        }

        self.tick_fatigue(soldier, dt);

        let buffed = soldier.buffs.total(BuffKind::Morale) * dt;
        if buffed != 0.0 {
            soldier.set_morale(soldier.morale + buffed);
        }

        if soldier.is_routing() {
            soldier.set_morale(soldier.morale + self.morale.routing_recovery_per_sec * dt);
            if soldier.morale >= self.morale.rally_threshold && !ctx.enemy_within_engage {
                soldier.state = SoldierState::Idle;
                return MoraleTransition::Rallied;
            }
            return MoraleTransition::None;
        }

        if ctx.general_present {
            self.apply_event(
                soldier,
                MoraleEvent::GeneralPresence,
                self.morale.general_presence_per_sec * dt,
            );
        }

        if ctx.in_combat {
            return self.apply_event(
                soldier,
                MoraleEvent::CombatStress,
                self.morale.combat_stress_per_sec * dt,
            );
        }

        // Out of combat morale creeps back, but only up to the rally line
        if soldier.morale < self.morale.rally_threshold {
            let recovered = (soldier.morale + self.morale.idle_recovery_per_sec * dt)
                .min(self.morale.rally_threshold);
            soldier.set_morale(recovered);
        }
        MoraleTransition::None
    }

    fn tick_fatigue(&self, soldier: &mut Soldier, dt: f32) {
        let exertion =
            soldier.moved * self.fatigue.move_per_metre + soldier.attacks as f32 * self.fatigue.per_attack;
        if exertion > 0.0 {
            soldier.set_fatigue(soldier.fatigue + exertion);
        } else {
            soldier.set_fatigue(soldier.fatigue - self.fatigue.idle_recovery_per_sec * dt);
        }
    }

    pub fn queue_rout(&mut self, notice: RoutNotice) {
        self.pending.push(notice);
    }

    /// Routs from the previous tick, in the order they happened
    pub fn take_rout_notices(&mut self) -> Vec<RoutNotice> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::category::UnitCategory;
    use crate::battle::soldier::{SoldierArena, SoldierTemplate};
    use crate::core::types::SoldierId;

    fn system() -> MoraleSystem {
        MoraleSystem::new(MoraleConfig::default(), FatigueConfig::default())
    }

    fn arena_with(morale: f32, resolve: f32) -> (SoldierArena, SoldierId) {
        let mut arena = SoldierArena::new();
        let id = arena.spawn(
            &SoldierTemplate {
                squad: SquadId(1),
                team: TeamId(0),
                category: UnitCategory::Infantry,
                stats: UnitCategory::Infantry.base_stats(),
                morale,
                resolve,
            },
            Vec2::ZERO,
            0.0,
        );
        (arena, id)
    }

    #[test]
    fn test_rout_in_same_call() {
        let morale = system();
        let (mut arena, id) = arena_with(30.0, 0.0);
        let soldier = arena.get_mut(id).unwrap();
        let transition = morale.apply_event(soldier, MoraleEvent::ChargedInto, 10.0);
        assert_eq!(transition, MoraleTransition::Routed);
        assert_eq!(soldier.state, SoldierState::Routing);
        assert!(!soldier.state.is_offensive());
    }

    #[test]
    fn test_resolve_damps_negative_events() {
        let morale = system();
        let (mut steady, a) = arena_with(70.0, 1.0);
        let (mut green, b) = arena_with(70.0, 0.0);
        morale.apply_event(steady.get_mut(a).unwrap(), MoraleEvent::HeavyDamage, 10.0);
        morale.apply_event(green.get_mut(b).unwrap(), MoraleEvent::HeavyDamage, 10.0);
        assert!((steady.get(a).unwrap().morale - 64.0).abs() < 1e-4);
        assert!((green.get(b).unwrap().morale - 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_morale_clamped() {
        let morale = system();
        let (mut arena, id) = arena_with(95.0, 0.0);
        let soldier = arena.get_mut(id).unwrap();
        morale.apply_event(soldier, MoraleEvent::EnemyRoutedNearby, 50.0);
        assert_eq!(soldier.morale, 100.0);
        morale.apply_event(soldier, MoraleEvent::SquadBroken, 500.0);
        assert_eq!(soldier.morale, 0.0);
    }

    #[test]
    fn test_rally_blocked_by_nearby_enemy() {
        let morale = system();
        let (mut arena, id) = arena_with(54.9, 0.0);
        let soldier = arena.get_mut(id).unwrap();
        soldier.state = SoldierState::Routing;

        let near = MoraleTick {
            enemy_within_engage: true,
            ..Default::default()
        };
        assert_eq!(morale.tick(soldier, &near, 1.0), MoraleTransition::None);
        assert!(soldier.is_routing());

        let safe = MoraleTick::default();
        assert_eq!(morale.tick(soldier, &safe, 1.0), MoraleTransition::Rallied);
        assert_eq!(soldier.state, SoldierState::Idle);
    }

    #[test]
    fn test_combat_stress_can_rout() {
        let morale = system();
        let (mut arena, id) = arena_with(25.5, 0.0);
        let soldier = arena.get_mut(id).unwrap();
        let ctx = MoraleTick {
            in_combat: true,
            ..Default::default()
        };
        assert_eq!(morale.tick(soldier, &ctx, 1.0), MoraleTransition::Routed);
    }

    #[test]
    fn test_idle_recovery_stops_at_rally_line() {
        let morale = system();
        let (mut arena, id) = arena_with(54.5, 0.0);
        let soldier = arena.get_mut(id).unwrap();
        morale.tick(soldier, &MoraleTick::default(), 5.0);
        assert_eq!(soldier.morale, MoraleConfig::default().rally_threshold);
    }

    #[test]
    fn test_fatigue_rises_with_work_and_recovers_at_rest() {
        let morale = system();
        let (mut arena, id) = arena_with(70.0, 0.0);
        let soldier = arena.get_mut(id).unwrap();
        soldier.moved = 10.0;
        soldier.attacks = 1;
        morale.tick(soldier, &MoraleTick::default(), 0.1);
        assert!((soldier.fatigue - 3.3).abs() < 1e-4);

        soldier.moved = 0.0;
        soldier.attacks = 0;
        morale.tick(soldier, &MoraleTick::default(), 1.0);
        assert!((soldier.fatigue - 1.3).abs() < 1e-4);
    }

    #[test]
    fn test_rout_notices_are_drained_once() {
        let mut morale = system();
        morale.queue_rout(RoutNotice {
            squad: SquadId(1),
            team: TeamId(0),
            position: Vec2::ZERO,
        });
        assert_eq!(morale.take_rout_notices().len(), 1);
        assert!(morale.take_rout_notices().is_empty());
    }
}
