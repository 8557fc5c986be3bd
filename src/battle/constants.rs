//! Battle system constants - headline tuning values in one place
//!
//! Everything else lives in `BattleConfig`; these seed its defaults.

// Time
pub const DEFAULT_TICK_SECONDS: f32 = 0.1;
pub const DEFAULT_TICK_CEILING: u64 = 6000; // 10 minutes of battle time

// Stat ranges
pub const MORALE_MIN: f32 = 0.0;
pub const MORALE_MAX: f32 = 100.0;
pub const FATIGUE_MIN: f32 = 0.0;
pub const FATIGUE_MAX: f32 = 100.0;

// Morale thresholds
pub const DEFAULT_ROUT_THRESHOLD: f32 = 25.0;
pub const DEFAULT_RALLY_THRESHOLD: f32 = 55.0;
pub const DEFAULT_STARTING_MORALE: f32 = 70.0;

// Battlefield
pub const DEFAULT_FIELD_HALF_WIDTH: f32 = 150.0;
pub const DEFAULT_FIELD_HALF_DEPTH: f32 = 150.0;
