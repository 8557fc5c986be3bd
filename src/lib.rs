//! Tactica - deterministic real-time tactical battle simulation

pub mod battle;
pub mod core;
pub mod runtime;
pub mod spatial;

pub use battle::{BattleInit, BattleResult, BattleState, Command, CommandKind, OutboundEvent, Snapshot};
pub use core::{BattleConfig, BattleError, CommandError};
pub use runtime::{spawn_battle, BattleHandle};
