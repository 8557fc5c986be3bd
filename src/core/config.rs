//! Battle configuration with documented tuning values
//!
//! Balance numbers are configuration, not invariants. Every section is
//! `#[serde(default)]` so a TOML file only needs to list what it changes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::battle::ai::profile::AiProfile;
use crate::battle::category::CounterTable;
use crate::battle::constants::*;
use crate::core::error::{BattleError, Result};

/// Complete per-battle configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    pub simulation: SimulationConfig,
    pub spatial: SpatialConfig,
    pub steering: SteeringConfig,
    pub combat: CombatConfig,
    pub morale: MoraleConfig,
    pub fatigue: FatigueConfig,
    pub formation: FormationConfig,
    pub actions: ActionConfig,
    pub ai: AiConfig,
}

/// Tick pacing and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated seconds per tick
    pub tick_seconds: f32,
    /// Ticks before a battle is forced to a timeout result
    pub tick_ceiling: u64,
    /// Ticks between `state` snapshots in the outbound queue
    pub snapshot_interval: u64,
    /// Soldier count above which steering runs on the rayon pool
    pub parallel_threshold: usize,
    /// Troops represented by one simulated soldier
    pub troops_per_soldier: u32,
    /// Hard cap on simulated soldiers per squad
    pub max_soldiers_per_squad: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_seconds: DEFAULT_TICK_SECONDS,
            tick_ceiling: DEFAULT_TICK_CEILING,
            snapshot_interval: 5,
            parallel_threshold: 512,
            troops_per_soldier: 1,
            max_soldiers_per_squad: 400,
        }
    }
}

/// Quadtree tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Entries per leaf before it splits
    pub node_capacity: usize,
    pub max_depth: u32,
    /// Below this many entries queries scan linearly instead of using the tree
    pub linear_threshold: usize,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            node_capacity: 8,
            max_depth: 10,
            linear_threshold: 32,
        }
    }
}

/// Per-soldier steering and squad movement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Collision radius of a soldier's body (metres)
    pub body_radius: f32,
    /// Neighbours closer than this push each other apart
    pub separation_radius: f32,
    pub separation_weight: f32,
    /// Distance at which arrival damping starts
    pub arrive_radius: f32,
    /// Distance to a slot considered "in place"
    pub slot_tolerance: f32,
    /// Melee soldiers leave their slot for enemies inside this radius
    pub chase_radius: f32,
    /// Enemies inside this radius count as engaged / block rallying
    pub engage_radius: f32,
    /// Soldier facing turn rate (radians per second)
    pub turn_rate: f32,
    /// Squad heading turn rate (radians per second)
    pub squad_turn_rate: f32,
    /// Half-angle of the forward arc a soldier can attack into
    pub attack_arc: f32,
    /// Maximum distance the anchor may lead the squad centroid
    pub max_anchor_lead: f32,
    /// Melee squads stop their anchor this far from the target centroid
    pub melee_stop_distance: f32,
    /// Ranged squads stop at this fraction of weapon range
    pub ranged_stand_off: f32,
    pub rout_speed_multiplier: f32,
    pub retreat_speed_multiplier: f32,
    /// Routing soldiers flee from enemies inside this radius
    pub flee_radius: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            body_radius: 0.4,
            separation_radius: 1.2,
            separation_weight: 1.5,
            arrive_radius: 2.0,
            slot_tolerance: 0.15,
            chase_radius: 6.0,
            engage_radius: 8.0,
            turn_rate: 3.0,
            squad_turn_rate: 1.5,
            attack_arc: 1.4,
            max_anchor_lead: 4.0,
            melee_stop_distance: 2.0,
            ranged_stand_off: 0.85,
            rout_speed_multiplier: 1.15,
            retreat_speed_multiplier: 0.85,
            flee_radius: 25.0,
        }
    }
}

/// Combat calculator modifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Attacks from outside this half-angle of the defender's facing are flank attacks
    pub flank_arc: f32,
    /// Attacks from outside this half-angle are rear attacks
    pub rear_arc: f32,
    pub flank_hit_bonus: f32,
    pub rear_hit_bonus: f32,
    pub flank_damage_multiplier: f32,
    pub rear_damage_multiplier: f32,
    pub critical_multiplier: f32,
    pub rear_critical_bonus: f32,
    pub disordered_armor_multiplier: f32,
    pub disordered_evasion_penalty: f32,
    /// Accuracy lost by attackers whose morale is below the wavering threshold
    pub wavering_accuracy_penalty: f32,
    /// Ranged attackers shooting at an enemy inside `point_blank_distance`
    pub point_blank_penalty: f32,
    pub point_blank_distance: f32,
    /// Accuracy bonus at training 1.0
    pub training_accuracy_bonus: f32,
    /// Power bonus at general strength 1.0
    pub strength_power_bonus: f32,
    /// Accuracy bonus at general intelligence 1.0
    pub intelligence_accuracy_bonus: f32,
    /// A single hit above this fraction of max health counts as heavy damage
    pub heavy_damage_fraction: f32,
    pub counters: CounterTable,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            flank_arc: 1.22,
            rear_arc: 2.36,
            flank_hit_bonus: 0.1,
            rear_hit_bonus: 0.2,
            flank_damage_multiplier: 1.2,
            rear_damage_multiplier: 1.5,
            critical_multiplier: 2.0,
            rear_critical_bonus: 0.05,
            disordered_armor_multiplier: 0.5,
            disordered_evasion_penalty: 0.1,
            wavering_accuracy_penalty: 0.1,
            point_blank_penalty: 0.2,
            point_blank_distance: 2.0,
            training_accuracy_bonus: 0.1,
            strength_power_bonus: 0.25,
            intelligence_accuracy_bonus: 0.05,
            heavy_damage_fraction: 0.25,
            counters: CounterTable::default(),
        }
    }
}

/// Morale thresholds and event magnitudes (morale lives in `[0, 100]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MoraleConfig {
    pub rout_threshold: f32,
    pub rally_threshold: f32,
    pub wavering_threshold: f32,
    pub idle_recovery_per_sec: f32,
    pub routing_recovery_per_sec: f32,
    pub ally_death: f32,
    pub ally_death_radius: f32,
    pub flanked_hit: f32,
    pub heavy_damage: f32,
    pub flank_pressure_per_sec: f32,
    /// How long a flank/rear hit keeps the whole squad under pressure
    pub flank_pressure_seconds: f32,
    pub charge_shock: f32,
    /// Charge shock multiplier when the charge lands on a flank or the rear
    pub rear_shock_multiplier: f32,
    pub ally_routed: f32,
    pub contagion_radius: f32,
    pub squad_broken: f32,
    pub enemy_routed: f32,
    pub enemy_routed_radius: f32,
    pub enemy_killed: f32,
    pub general_presence_per_sec: f32,
    pub combat_stress_per_sec: f32,
    /// Fraction of negative morale absorbed at resolve 1.0
    pub resolve_damping: f32,
    /// Fraction of living soldiers routing at which the squad counts as routing
    pub squad_rout_fraction: f32,
}

impl Default for MoraleConfig {
    fn default() -> Self {
        Self {
            rout_threshold: DEFAULT_ROUT_THRESHOLD,
            rally_threshold: DEFAULT_RALLY_THRESHOLD,
            wavering_threshold: 40.0,
            idle_recovery_per_sec: 1.0,
            routing_recovery_per_sec: 3.0,
            ally_death: 4.0,
            ally_death_radius: 5.0,
            flanked_hit: 3.0,
            heavy_damage: 5.0,
            flank_pressure_per_sec: 8.0,
            flank_pressure_seconds: 2.0,
            charge_shock: 25.0,
            rear_shock_multiplier: 1.5,
            ally_routed: 3.0,
            contagion_radius: 6.0,
            squad_broken: 15.0,
            enemy_routed: 6.0,
            enemy_routed_radius: 20.0,
            enemy_killed: 1.0,
            general_presence_per_sec: 1.5,
            combat_stress_per_sec: 1.0,
            resolve_damping: 0.4,
            squad_rout_fraction: 0.5,
        }
    }
}

/// Fatigue accumulation (fatigue lives in `[0, 100]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueConfig {
    pub move_per_metre: f32,
    pub per_attack: f32,
    pub idle_recovery_per_sec: f32,
    /// Attack/defence/speed lost at fatigue 100 (never reaches 1.0)
    pub penalty_at_max: f32,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            move_per_metre: 0.25,
            per_attack: 0.8,
            idle_recovery_per_sec: 2.0,
            penalty_at_max: 0.4,
        }
    }
}

/// Slot layout and transition timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormationConfig {
    /// Distance between neighbouring slots (metres)
    pub spacing: f32,
    /// Soldiers per rank in line formation
    pub line_width: usize,
    /// Soldiers per rank in column formation
    pub column_width: usize,
    pub transition_base_seconds: f32,
    pub transition_per_soldier_seconds: f32,
}

impl Default for FormationConfig {
    fn default() -> Self {
        Self {
            spacing: 1.2,
            line_width: 20,
            column_width: 4,
            transition_base_seconds: 1.0,
            transition_per_soldier_seconds: 0.05,
        }
    }
}

/// Special action timings (seconds) and bonuses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    pub charge_duration: f32,
    pub charge_cooldown: f32,
    pub charge_max_range: f32,
    pub charge_speed_bonus: f32,
    pub charge_attack_bonus: f32,
    pub flank_offset: f32,
    pub flank_approach_timeout: f32,
    pub flank_duration: f32,
    pub flank_cooldown: f32,
    pub kite_duration: f32,
    pub kite_cooldown: f32,
    /// Kiting squads back off when an enemy is inside this fraction of their range
    pub kite_distance_fraction: f32,
    pub surround_duration: f32,
    pub surround_cooldown: f32,
    /// Own living count must exceed the target's by this ratio
    pub surround_strength_ratio: f32,
    pub defensive_duration: f32,
    pub defensive_cooldown: f32,
    pub brace_defense_bonus: f32,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            charge_duration: 4.0,
            charge_cooldown: 15.0,
            charge_max_range: 60.0,
            charge_speed_bonus: 0.6,
            charge_attack_bonus: 0.5,
            flank_offset: 25.0,
            flank_approach_timeout: 20.0,
            flank_duration: 10.0,
            flank_cooldown: 20.0,
            kite_duration: 12.0,
            kite_cooldown: 10.0,
            kite_distance_fraction: 0.5,
            surround_duration: 15.0,
            surround_cooldown: 25.0,
            surround_strength_ratio: 1.5,
            defensive_duration: 15.0,
            defensive_cooldown: 20.0,
            brace_defense_bonus: 0.3,
        }
    }
}

/// AI controller settings and named behaviour profiles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Profile used by autonomous squads that do not name one
    pub default_profile: String,
    /// Seconds an autonomous squad follows a direct command before the AI resumes
    pub command_override_seconds: f32,
    pub profiles: BTreeMap<String, AiProfile>,
}

impl Default for AiConfig {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert("default".to_string(), AiProfile::default());
        profiles.insert("aggressive".to_string(), AiProfile::aggressive());
        profiles.insert("cautious".to_string(), AiProfile::cautious());
        Self {
            default_profile: "default".to_string(),
            command_override_seconds: 10.0,
            profiles,
        }
    }
}

impl AiConfig {
    pub fn profile(&self, name: &str) -> Option<&AiProfile> {
        self.profiles.get(name)
    }
}

impl BattleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing sections and fields keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: BattleConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Ticks corresponding to a duration in seconds (at least one)
    pub fn seconds_to_ticks(&self, seconds: f32) -> u64 {
        (seconds / self.simulation.tick_seconds).ceil().max(1.0) as u64
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(BattleError::InvalidConfig(msg)) };

        if !(self.simulation.tick_seconds > 0.0) {
            return invalid(format!(
                "tick_seconds must be positive ({})",
                self.simulation.tick_seconds
            ));
        }
        if self.simulation.tick_ceiling == 0 {
            return invalid("tick_ceiling must be at least 1".into());
        }
        if self.simulation.snapshot_interval == 0 {
            return invalid("snapshot_interval must be at least 1".into());
        }
        if self.simulation.troops_per_soldier == 0 {
            return invalid("troops_per_soldier must be at least 1".into());
        }

        let m = &self.morale;
        for (name, value) in [
            ("rout_threshold", m.rout_threshold),
            ("rally_threshold", m.rally_threshold),
            ("wavering_threshold", m.wavering_threshold),
        ] {
            if !(MORALE_MIN..=MORALE_MAX).contains(&value) {
                return invalid(format!("{name} ({value}) must lie in [0, 100]"));
            }
        }
        if m.rally_threshold <= m.rout_threshold {
            return invalid(format!(
                "rally_threshold ({}) must exceed rout_threshold ({})",
                m.rally_threshold, m.rout_threshold
            ));
        }
        if !(0.0..=1.0).contains(&m.resolve_damping) {
            return invalid("resolve_damping must lie in [0, 1]".into());
        }
        if !(m.squad_rout_fraction > 0.0 && m.squad_rout_fraction <= 1.0) {
            return invalid("squad_rout_fraction must lie in (0, 1]".into());
        }

        if !(0.0..1.0).contains(&self.fatigue.penalty_at_max) {
            return invalid("fatigue penalty_at_max must lie in [0, 1)".into());
        }

        if self.combat.rear_arc <= self.combat.flank_arc {
            return invalid("rear_arc must be wider than flank_arc".into());
        }
        if self.combat.critical_multiplier < 1.0 {
            return invalid("critical_multiplier must be at least 1".into());
        }
        if let Some(entry) = self.combat.counters.entries.iter().find(|e| e.multiplier <= 0.0) {
            return invalid(format!(
                "counter multiplier {:?} vs {:?} must be positive",
                entry.attacker, entry.defender
            ));
        }

        if self.formation.spacing <= 0.0
            || self.formation.line_width == 0
            || self.formation.column_width == 0
        {
            return invalid("formation spacing and widths must be positive".into());
        }

        if self.spatial.node_capacity == 0 {
            return invalid("spatial node_capacity must be at least 1".into());
        }

        if !self.ai.profiles.contains_key(&self.ai.default_profile) {
            return invalid(format!(
                "default AI profile `{}` is not defined",
                self.ai.default_profile
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BattleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bundled_config_parses() {
        let config = BattleConfig::from_toml_str(include_str!("../../data/battle/default.toml"))
            .expect("bundled config should parse");
        assert!(config.ai.profile("aggressive").is_some());
        assert!(config.morale.rally_threshold > config.morale.rout_threshold);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BattleConfig::from_toml_str(
            r#"
            [morale]
            rout_threshold = 30.0
            "#,
        )
        .unwrap();
        assert_eq!(config.morale.rout_threshold, 30.0);
        assert_eq!(config.morale.rally_threshold, DEFAULT_RALLY_THRESHOLD);
        assert_eq!(config.simulation.tick_seconds, DEFAULT_TICK_SECONDS);
    }

    #[test]
    fn test_rally_below_rout_rejected() {
        let err = BattleConfig::from_toml_str(
            r#"
            [morale]
            rout_threshold = 60.0
            rally_threshold = 50.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, BattleError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let err = BattleConfig::from_toml_str("[morale\nrout_threshold = ").unwrap_err();
        assert!(matches!(err, BattleError::TomlError(_)));
    }

    #[test]
    fn test_seconds_to_ticks() {
        let config = BattleConfig::default();
        assert_eq!(config.seconds_to_ticks(1.0), 10);
        assert_eq!(config.seconds_to_ticks(0.0), 1);
    }
}
