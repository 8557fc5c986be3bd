pub mod config;
pub mod error;
pub mod types;

pub use config::BattleConfig;
pub use error::{BattleError, CommandError, Result};
pub use types::{SoldierId, SquadId, TeamId, Tick, Vec2};
