//! Battle initialization record
//!
//! Produced by the host's adapter layer (usually as JSON). Validation runs
//! before any state is built, so a malformed record never yields a battle.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::battle::category::UnitCategory;
use crate::battle::constants::{
    DEFAULT_FIELD_HALF_DEPTH, DEFAULT_FIELD_HALF_WIDTH, DEFAULT_STARTING_MORALE, MORALE_MAX,
    MORALE_MIN,
};
use crate::battle::formation::FormationType;
use crate::battle::squad::Controller;
use crate::battle::terrain::{TerrainSpec, Weather};
use crate::core::config::BattleConfig;
use crate::core::error::{BattleError, Result};
use crate::core::types::{Rect, SquadId, TeamId, Vec2};

fn default_morale() -> f32 {
    DEFAULT_STARTING_MORALE
}

fn default_training() -> f32 {
    0.5
}

/// Battlefield half extents around the origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub half_width: f32,
    pub half_depth: f32,
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self {
            half_width: DEFAULT_FIELD_HALF_WIDTH,
            half_depth: DEFAULT_FIELD_HALF_DEPTH,
        }
    }
}

impl FieldSpec {
    pub fn rect(&self) -> Rect {
        Rect::centered(self.half_width, self.half_depth)
    }
}

/// General-derived modifiers, each in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneralInit {
    pub leadership: f32,
    pub strength: f32,
    pub intelligence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquadInit {
    pub id: SquadId,
    /// Category name, e.g. "infantry" or "archers"
    pub category: String,
    /// Starting troop count; divided by `troops_per_soldier`
    pub crew: u32,
    #[serde(default = "default_morale")]
    pub morale: f32,
    #[serde(default = "default_training")]
    pub training: f32,
    #[serde(default)]
    pub formation: FormationType,
    pub position: Vec2,
    #[serde(default)]
    pub heading: f32,
    #[serde(default)]
    pub controller: Controller,
    #[serde(default)]
    pub general: Option<GeneralInit>,
    #[serde(default)]
    pub ai_profile: Option<String>,
}

impl SquadInit {
    pub fn new(id: u32, category: &str, crew: u32, position: Vec2, heading: f32) -> Self {
        Self {
            id: SquadId(id),
            category: category.to_string(),
            crew,
            morale: DEFAULT_STARTING_MORALE,
            training: default_training(),
            formation: FormationType::Line,
            position,
            heading,
            controller: Controller::Autonomous,
            general: None,
            ai_profile: None,
        }
    }

    pub fn with_controller(mut self, controller: Controller) -> Self {
        self.controller = controller;
        self
    }

    pub fn with_formation(mut self, formation: FormationType) -> Self {
        self.formation = formation;
        self
    }

    pub fn with_morale(mut self, morale: f32) -> Self {
        self.morale = morale;
        self
    }

    pub fn with_training(mut self, training: f32) -> Self {
        self.training = training;
        self
    }

    pub fn with_general(mut self, general: GeneralInit) -> Self {
        self.general = Some(general);
        self
    }

    pub fn with_profile(mut self, profile: &str) -> Self {
        self.ai_profile = Some(profile.to_string());
        self
    }

    /// Simulated soldiers for this squad under `config`
    pub fn soldier_count(&self, config: &BattleConfig) -> usize {
        let per = config.simulation.troops_per_soldier.max(1);
        let soldiers = self.crew.div_ceil(per);
        soldiers.min(config.simulation.max_soldiers_per_squad) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideInit {
    pub team: TeamId,
    pub squads: Vec<SquadInit>,
}

impl SideInit {
    pub fn new(team: u8, squads: Vec<SquadInit>) -> Self {
        Self {
            team: TeamId(team),
            squads,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleInit {
    #[serde(default)]
    pub battle_id: Option<Uuid>,
    pub seed: u64,
    /// Overrides `simulation.tick_ceiling`
    #[serde(default)]
    pub tick_ceiling: Option<u64>,
    #[serde(default)]
    pub field: FieldSpec,
    #[serde(default)]
    pub terrain: TerrainSpec,
    #[serde(default)]
    pub weather: Weather,
    pub sides: Vec<SideInit>,
}

impl BattleInit {
    pub fn new(seed: u64, sides: Vec<SideInit>) -> Self {
        Self {
            battle_id: None,
            seed,
            tick_ceiling: None,
            field: FieldSpec::default(),
            terrain: TerrainSpec::default(),
            weather: Weather::Clear,
            sides,
        }
    }

    pub fn with_tick_ceiling(mut self, ticks: u64) -> Self {
        self.tick_ceiling = Some(ticks);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Reject anything that cannot become a battle
    pub fn validate(&self, config: &BattleConfig) -> Result<()> {
        if self.sides.len() < 2 {
            return Err(BattleError::NotEnoughSides(self.sides.len()));
        }

        let mut teams = BTreeSet::new();
        let mut squads = BTreeSet::new();
        for side in &self.sides {
            if !teams.insert(side.team) {
                return Err(BattleError::DuplicateTeam(side.team));
            }
            if side.squads.is_empty() {
                return Err(BattleError::EmptySide(side.team));
            }
            for squad in &side.squads {
                if !squads.insert(squad.id) {
                    return Err(BattleError::DuplicateSquad(squad.id));
                }
                squad.category.parse::<UnitCategory>()?;
                if squad.crew == 0 || squad.soldier_count(config) == 0 {
                    return Err(BattleError::EmptySquad(squad.id));
                }
                let out_of_range = |field: &'static str, value: f32| BattleError::OutOfRange {
                    squad: squad.id,
                    field,
                    value,
                };
                if !(MORALE_MIN..=MORALE_MAX).contains(&squad.morale) {
                    return Err(out_of_range("morale", squad.morale));
                }
                if !(0.0..=1.0).contains(&squad.training) {
                    return Err(out_of_range("training", squad.training));
                }
                if let Some(general) = &squad.general {
                    for (field, value) in [
                        ("leadership", general.leadership),
                        ("strength", general.strength),
                        ("intelligence", general.intelligence),
                    ] {
                        if !(0.0..=1.0).contains(&value) {
                            return Err(out_of_range(field, value));
                        }
                    }
                }
                if !squad.heading.is_finite() {
                    return Err(out_of_range("heading", squad.heading));
                }
                if let Some(profile) = &squad.ai_profile {
                    if config.ai.profile(profile).is_none() {
                        return Err(BattleError::UnknownProfile(profile.clone()));
                    }
                }
            }
        }

        if !(self.field.half_width > 0.0 && self.field.half_depth > 0.0) {
            return Err(BattleError::InvalidConfig("field extents must be positive".into()));
        }
        if self.tick_ceiling == Some(0) {
            return Err(BattleError::InvalidConfig("tick_ceiling must be at least 1".into()));
        }
        Ok(())
    }
}
