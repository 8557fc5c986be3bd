//! Combat calculator
//!
//! Pure functions: no state, all randomness comes from the caller's RNG.
//! Probabilities are clamped to [0, 1] and damage is never negative.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::battle::buffs::BuffKind;
use crate::battle::category::UnitCategory;
use crate::battle::formation::FormationModifiers;
use crate::battle::soldier::Soldier;
use crate::core::config::CombatConfig;
use crate::core::types::Vec2;

/// Where an attack lands relative to the defender's facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackAngle {
    Front,
    Flank,
    Rear,
}

impl AttackAngle {
    /// Classify by the angle between the defender's forward vector and the
    /// direction to the attacker
    pub fn classify(relative_angle: f32, config: &CombatConfig) -> Self {
        if relative_angle > config.rear_arc {
            AttackAngle::Rear
        } else if relative_angle > config.flank_arc {
            AttackAngle::Flank
        } else {
            AttackAngle::Front
        }
    }

    pub fn is_flanking(&self) -> bool {
        !matches!(self, AttackAngle::Front)
    }
}

/// Relative angle used by `AttackAngle::classify`
pub fn relative_angle(defender_position: Vec2, defender_facing: f32, attacker_position: Vec2) -> f32 {
    let to_attacker = attacker_position - defender_position;
    Vec2::from_heading(defender_facing).angle_between(&to_attacker)
}

/// The parts of a soldier the calculator reads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Combatant {
    pub category: UnitCategory,
    pub power: f32,
    pub armor: f32,
    pub accuracy: f32,
    pub evasion: f32,
    pub crit_chance: f32,
    pub ranged: bool,
    /// Attack buff multiplier
    pub attack_mult: f32,
    /// Defence buff multiplier
    pub defense_mult: f32,
    pub fatigue_factor: f32,
    /// Morale below the wavering threshold
    pub wavering: bool,
}

impl Combatant {
    pub fn from_soldier(soldier: &Soldier, fatigue_penalty: f32, wavering_threshold: f32) -> Self {
        let stats = &soldier.stats;
        Self {
            category: soldier.category,
            power: stats.power,
            armor: stats.armor,
            accuracy: stats.accuracy,
            evasion: stats.evasion,
            crit_chance: stats.crit_chance,
            ranged: stats.ranged,
            attack_mult: soldier.buffs.multiplier(BuffKind::Attack),
            defense_mult: soldier.buffs.multiplier(BuffKind::Defense),
            fatigue_factor: soldier.fatigue_factor(fatigue_penalty),
            wavering: soldier.morale < wavering_threshold,
        }
    }
}

/// Per-engagement context; built fresh for each attack
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatContext {
    /// Angle between defender facing and the direction to the attacker
    pub relative_angle: f32,
    pub distance: f32,
    /// Multiplier on raw damage from ground
    pub terrain_modifier: f32,
    pub defender_formation: FormationModifiers,
    pub defender_disordered: bool,
    /// Weather penalty to ranged hit chance
    pub weather_ranged_penalty: f32,
    pub charging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatOutcome {
    pub hit: bool,
    pub critical: bool,
    pub damage: f32,
    pub angle: AttackAngle,
}

fn flank_scale(ctx: &CombatContext) -> f32 {
    1.0 - ctx.defender_formation.flank_protection.clamp(0.0, 1.0)
}

/// Defender armour after formation, disorder, fatigue and buffs
pub fn effective_armor(defender: &Combatant, ctx: &CombatContext, config: &CombatConfig) -> f32 {
    let disorder = if ctx.defender_disordered {
        config.disordered_armor_multiplier
    } else {
        1.0
    };
    (defender.armor
        * ctx.defender_formation.armor_mult
        * disorder
        * defender.defense_mult
        * defender.fatigue_factor)
        .max(0.0)
}

pub fn hit_chance(
    attacker: &Combatant,
    defender: &Combatant,
    ctx: &CombatContext,
    config: &CombatConfig,
) -> f32 {
    let mut evasion = defender.evasion * defender.fatigue_factor;
    if ctx.defender_disordered {
        evasion -= config.disordered_evasion_penalty;
    }

    let mut chance = attacker.accuracy * attacker.fatigue_factor - evasion.max(0.0);

    chance += match AttackAngle::classify(ctx.relative_angle, config) {
        AttackAngle::Front => 0.0,
        AttackAngle::Flank => config.flank_hit_bonus * flank_scale(ctx),
        AttackAngle::Rear => config.rear_hit_bonus * flank_scale(ctx),
    };

    if attacker.ranged {
        chance -= ctx.defender_formation.ranged_hit_penalty;
        chance -= ctx.weather_ranged_penalty;
        if ctx.distance < config.point_blank_distance {
            chance -= config.point_blank_penalty;
        }
    }

    if attacker.wavering {
        chance -= config.wavering_accuracy_penalty;
    }

    if chance.is_nan() {
        return 0.0;
    }
    chance.clamp(0.0, 1.0)
}

pub fn critical_chance(attacker: &Combatant, ctx: &CombatContext, config: &CombatConfig) -> f32 {
    let mut chance = attacker.crit_chance;
    if AttackAngle::classify(ctx.relative_angle, config) == AttackAngle::Rear {
        chance += config.rear_critical_bonus;
    }
    if chance.is_nan() {
        return 0.0;
    }
    chance.clamp(0.0, 1.0)
}

/// Damage dealt by a landed hit
pub fn hit_damage(
    attacker: &Combatant,
    defender: &Combatant,
    ctx: &CombatContext,
    config: &CombatConfig,
    critical: bool,
) -> f32 {
    let angle_mult = match AttackAngle::classify(ctx.relative_angle, config) {
        AttackAngle::Front => 1.0,
        AttackAngle::Flank => 1.0 + (config.flank_damage_multiplier - 1.0) * flank_scale(ctx),
        AttackAngle::Rear => 1.0 + (config.rear_damage_multiplier - 1.0) * flank_scale(ctx),
    };

    let raw = attacker.power
        * config.counters.multiplier(attacker.category, defender.category)
        * attacker.attack_mult
        * attacker.fatigue_factor
        * angle_mult
        * ctx.terrain_modifier.max(0.0);

    let mut damage = (raw - effective_armor(defender, ctx, config)).max(0.0);
    if critical {
        damage *= config.critical_multiplier;
    }
    if damage.is_finite() {
        damage
    } else {
        0.0
    }
}

/// Mean damage per attack
pub fn expected_damage(
    attacker: &Combatant,
    defender: &Combatant,
    ctx: &CombatContext,
    config: &CombatConfig,
) -> f32 {
    let crit = critical_chance(attacker, ctx, config);
    let normal = hit_damage(attacker, defender, ctx, config, false);
    let critical = hit_damage(attacker, defender, ctx, config, true);
    hit_chance(attacker, defender, ctx, config) * (normal * (1.0 - crit) + critical * crit)
}

/// Resolve a single attack. Always draws exactly two rolls so the RNG stream
/// does not depend on the outcome.
pub fn resolve<R: Rng + ?Sized>(
    attacker: &Combatant,
    defender: &Combatant,
    ctx: &CombatContext,
    config: &CombatConfig,
    rng: &mut R,
) -> CombatOutcome {
    let hit_roll: f32 = rng.gen();
    let crit_roll: f32 = rng.gen();

    let angle = AttackAngle::classify(ctx.relative_angle, config);
    let hit = hit_roll < hit_chance(attacker, defender, ctx, config);
    let critical = hit && crit_roll < critical_chance(attacker, ctx, config);
    let damage = if hit {
        hit_damage(attacker, defender, ctx, config, critical)
    } else {
        0.0
    };

    CombatOutcome {
        hit,
        critical,
        damage,
        angle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::formation::{FormationState, FormationType};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn combatant(category: UnitCategory) -> Combatant {
        let stats = category.base_stats();
        Combatant {
            category,
            power: stats.power,
            armor: stats.armor,
            accuracy: stats.accuracy,
            evasion: stats.evasion,
            crit_chance: stats.crit_chance,
            ranged: stats.ranged,
            attack_mult: 1.0,
            defense_mult: 1.0,
            fatigue_factor: 1.0,
            wavering: false,
        }
    }

    fn front_context() -> CombatContext {
        CombatContext {
            relative_angle: 0.0,
            distance: 1.0,
            terrain_modifier: 1.0,
            defender_formation: FormationType::Line.modifiers(),
            defender_disordered: false,
            weather_ranged_penalty: 0.0,
            charging: false,
        }
    }

    #[test]
    fn test_classify_angles() {
        let config = CombatConfig::default();
        assert_eq!(AttackAngle::classify(0.2, &config), AttackAngle::Front);
        assert_eq!(AttackAngle::classify(1.6, &config), AttackAngle::Flank);
        assert_eq!(AttackAngle::classify(3.0, &config), AttackAngle::Rear);
    }

    #[test]
    fn test_relative_angle_from_behind() {
        // Defender faces +z, attacker sits behind at -z
        let angle = relative_angle(Vec2::ZERO, 0.0, Vec2::new(0.0, -2.0));
        assert!((angle - std::f32::consts::PI).abs() < 1e-4);
    }

    #[test]
    fn test_rear_attack_is_stronger() {
        let config = CombatConfig::default();
        let att = combatant(UnitCategory::Infantry);
        let def = combatant(UnitCategory::Infantry);
        let front = front_context();
        let rear = CombatContext {
            relative_angle: 3.0,
            ..front
        };
        assert!(hit_chance(&att, &def, &rear, &config) > hit_chance(&att, &def, &front, &config));
        assert!(
            hit_damage(&att, &def, &rear, &config, false)
                > hit_damage(&att, &def, &front, &config, false)
        );
    }

    #[test]
    fn test_square_cancels_most_of_the_flank_bonus() {
        let config = CombatConfig::default();
        let att = combatant(UnitCategory::Cavalry);
        let def = combatant(UnitCategory::Infantry);
        let line = CombatContext {
            relative_angle: 3.0,
            ..front_context()
        };
        let square = CombatContext {
            defender_formation: FormationType::Square.modifiers(),
            ..line
        };
        assert!(
            hit_damage(&att, &def, &square, &config, false)
                < hit_damage(&att, &def, &line, &config, false)
        );
    }

    #[test]
    fn test_disorder_lowers_armor() {
        let config = CombatConfig::default();
        let def = combatant(UnitCategory::Infantry);
        let ordered = front_context();
        let disordered = CombatContext {
            defender_disordered: true,
            ..ordered
        };
        assert!(
            effective_armor(&def, &disordered, &config)
                <= effective_armor(&def, &ordered, &config) * 0.6
        );
    }

    #[test]
    fn test_armor_floors_damage_at_zero() {
        let config = CombatConfig::default();
        let mut att = combatant(UnitCategory::Infantry);
        att.power = 1.0;
        let mut def = combatant(UnitCategory::Infantry);
        def.armor = 50.0;
        assert_eq!(hit_damage(&att, &def, &front_context(), &config, true), 0.0);
    }

    #[test]
    fn test_ranged_penalties_apply_only_to_ranged() {
        let config = CombatConfig::default();
        let archer = combatant(UnitCategory::Ranged);
        let swordsman = combatant(UnitCategory::Infantry);
        let def = combatant(UnitCategory::Infantry);
        let clear = CombatContext {
            distance: 20.0,
            ..front_context()
        };
        let testudo = CombatContext {
            defender_formation: FormationType::Testudo.modifiers(),
            weather_ranged_penalty: 0.1,
            ..clear
        };
        assert!(hit_chance(&archer, &def, &testudo, &config) < hit_chance(&archer, &def, &clear, &config));
        assert_eq!(
            hit_chance(&swordsman, &def, &testudo, &config),
            hit_chance(&swordsman, &def, &clear, &config)
        );
    }

    #[test]
    fn test_archers_gain_nothing_from_unfinished_testudo() {
        let config = CombatConfig::default();
        let formation_cfg = crate::core::config::FormationConfig::default();
        let archer = combatant(UnitCategory::Ranged);
        let def = combatant(UnitCategory::Infantry);
        let mut formation = FormationState::new(FormationType::Line, 30, &formation_cfg);
        let settled = CombatContext {
            distance: 20.0,
            defender_formation: formation.modifiers(),
            ..front_context()
        };

        formation.set_formation(FormationType::Testudo, 30, &formation_cfg);
        formation.transition(0.1);
        let changing = CombatContext {
            defender_formation: formation.modifiers(),
            defender_disordered: true,
            ..settled
        };
        assert!(hit_chance(&archer, &def, &changing, &config) >= hit_chance(&archer, &def, &settled, &config));
    }

    #[test]
    fn test_resolve_is_deterministic_per_seed() {
        let config = CombatConfig::default();
        let att = combatant(UnitCategory::Cavalry);
        let def = combatant(UnitCategory::Ranged);
        let ctx = front_context();
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(
                resolve(&att, &def, &ctx, &config, &mut a),
                resolve(&att, &def, &ctx, &config, &mut b)
            );
        }
    }

    #[test]
    fn test_miss_deals_no_damage() {
        let config = CombatConfig::default();
        let mut att = combatant(UnitCategory::Infantry);
        att.accuracy = 0.0;
        let def = combatant(UnitCategory::Infantry);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let outcome = resolve(&att, &def, &front_context(), &config, &mut rng);
        assert!(!outcome.hit);
        assert!(!outcome.critical);
        assert_eq!(outcome.damage, 0.0);
    }

    #[test]
    fn test_counter_advantage_shows_in_expected_damage() {
        let config = CombatConfig::default();
        let mut spear = combatant(UnitCategory::Infantry);
        let mut horse = combatant(UnitCategory::Cavalry);
        // Equalise everything but the category
        horse.power = spear.power;
        horse.armor = spear.armor;
        horse.accuracy = spear.accuracy;
        horse.evasion = spear.evasion;
        horse.crit_chance = spear.crit_chance;
        spear.ranged = false;

        let ctx = front_context();
        assert!(
            expected_damage(&spear, &horse, &ctx, &config)
                > expected_damage(&horse, &spear, &ctx, &config)
        );
    }
}
