//! Terrain and weather
//!
//! The simulation only talks to terrain through the `Terrain` trait so a host
//! can plug in its own map. `FieldTerrain` is the built-in implementation:
//! uniform ground with impassable rectangles.

use serde::{Deserialize, Serialize};

use crate::core::types::{Rect, Vec2};

/// Terrain collaborator consulted by movement and combat
pub trait Terrain: Send + Sync {
    /// Battlefield extents; routing soldiers leaving them escape
    fn bounds(&self) -> Rect;

    fn is_passable(&self, position: Vec2) -> bool;

    /// Multiplier on movement speed at `position`
    fn speed_modifier(&self, position: Vec2) -> f32;

    /// Multiplier on raw damage for an attack between two positions
    fn combat_modifier(&self, attacker: Vec2, defender: Vec2) -> f32;

    /// Penalty subtracted from ranged hit chance
    fn ranged_hit_penalty(&self) -> f32 {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundKind {
    #[default]
    Flat,
    Hills,
    Forest,
    Marsh,
}

impl GroundKind {
    pub fn speed_modifier(&self) -> f32 {
        match self {
            GroundKind::Flat => 1.0,
            GroundKind::Hills => 0.85,
            GroundKind::Forest => 0.7,
            GroundKind::Marsh => 0.6,
        }
    }

    pub fn combat_modifier(&self) -> f32 {
        match self {
            GroundKind::Flat => 1.0,
            GroundKind::Hills => 1.05,
            GroundKind::Forest => 0.9,
            GroundKind::Marsh => 0.85,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    #[default]
    Clear,
    Rain,
    Fog,
    Snow,
}

impl Weather {
    pub fn ranged_hit_penalty(&self) -> f32 {
        match self {
            Weather::Clear => 0.0,
            Weather::Rain => 0.1,
            Weather::Fog => 0.15,
            Weather::Snow => 0.05,
        }
    }

    pub fn speed_modifier(&self) -> f32 {
        match self {
            Weather::Clear | Weather::Fog => 1.0,
            Weather::Rain => 0.9,
            Weather::Snow => 0.85,
        }
    }
}

/// Terrain description carried by the init record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSpec {
    pub ground: GroundKind,
    pub impassable: Vec<Rect>,
}

#[derive(Debug, Clone)]
pub struct FieldTerrain {
    bounds: Rect,
    ground: GroundKind,
    weather: Weather,
    impassable: Vec<Rect>,
}

impl FieldTerrain {
    pub fn new(bounds: Rect, spec: &TerrainSpec, weather: Weather) -> Self {
        Self {
            bounds,
            ground: spec.ground,
            weather,
            impassable: spec.impassable.clone(),
        }
    }

    /// Open flat field in clear weather
    pub fn open(bounds: Rect) -> Self {
        Self::new(bounds, &TerrainSpec::default(), Weather::Clear)
    }
}

impl Terrain for FieldTerrain {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn is_passable(&self, position: Vec2) -> bool {
        !self.impassable.iter().any(|r| r.contains(position))
    }

    fn speed_modifier(&self, _position: Vec2) -> f32 {
        self.ground.speed_modifier() * self.weather.speed_modifier()
    }

    fn combat_modifier(&self, _attacker: Vec2, _defender: Vec2) -> f32 {
        self.ground.combat_modifier()
    }

    fn ranged_hit_penalty(&self) -> f32 {
        self.weather.ranged_hit_penalty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impassable_rectangles() {
        let spec = TerrainSpec {
            ground: GroundKind::Flat,
            impassable: vec![Rect::new(Vec2::new(0.0, 0.0), Vec2::new(5.0, 5.0))],
        };
        let terrain = FieldTerrain::new(Rect::centered(50.0, 50.0), &spec, Weather::Clear);
        assert!(!terrain.is_passable(Vec2::new(2.0, 2.0)));
        assert!(terrain.is_passable(Vec2::new(-2.0, 2.0)));
    }

    #[test]
    fn test_weather_and_ground_compose() {
        let spec = TerrainSpec {
            ground: GroundKind::Marsh,
            impassable: Vec::new(),
        };
        let terrain = FieldTerrain::new(Rect::centered(50.0, 50.0), &spec, Weather::Snow);
        assert!((terrain.speed_modifier(Vec2::ZERO) - 0.6 * 0.85).abs() < 1e-6);
        assert!(terrain.ranged_hit_penalty() > 0.0);
    }

    #[test]
    fn test_open_field_is_neutral() {
        let terrain = FieldTerrain::open(Rect::centered(10.0, 10.0));
        assert_eq!(terrain.speed_modifier(Vec2::ZERO), 1.0);
        assert_eq!(terrain.combat_modifier(Vec2::ZERO, Vec2::ZERO), 1.0);
        assert_eq!(terrain.ranged_hit_penalty(), 0.0);
    }
}
