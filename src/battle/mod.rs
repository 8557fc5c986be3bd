//! Battle system - real-time squad combat on an open field
//!
//! Soldiers are simulated individually; squads own formations, tactics and
//! special actions. Everything runs on a fixed tick and is deterministic for
//! a given seed and command sequence.
//!
//! Layering:
//! - per-soldier: `soldier`, `buffs`, `steering`, `combat`, `morale`
//! - per-squad: `squad`, `formation`, `special_actions`, `targeting`, `ai`
//! - per-battle: `init`, `state`, `command`, `events`, `snapshot`, `result`

pub mod ai;
pub mod buffs;
pub mod category;
pub mod combat;
pub mod command;
pub mod constants;
pub mod events;
pub mod formation;
pub mod init;
pub mod morale;
pub mod result;
pub mod snapshot;
pub mod soldier;
pub mod special_actions;
pub mod squad;
pub mod state;
pub mod steering;
pub mod targeting;
pub mod terrain;

// Re-exports for convenient access
pub use ai::{AiController, AiProfile, Decision};
pub use buffs::{Buff, BuffKind, BuffSet, BuffSource};
pub use category::{CategoryStats, CounterTable, UnitCategory};
pub use combat::{AttackAngle, CombatContext, CombatOutcome, Combatant};
pub use command::{Command, CommandKind, CommandQueue};
pub use constants::*;
pub use events::{EventQueue, OutboundEvent};
pub use formation::{FormationModifiers, FormationState, FormationType};
pub use init::{BattleInit, FieldSpec, GeneralInit, SideInit, SquadInit};
pub use morale::{MoraleEvent, MoraleSystem, MoraleTransition};
pub use result::{BattleResult, LogEntry, LogKind, Outcome, SquadResult};
pub use snapshot::{SoldierSnapshot, Snapshot, SquadSnapshot};
pub use soldier::{Soldier, SoldierArena, SoldierState};
pub use special_actions::{ActionSlot, ActiveAction, SpecialActionKind};
pub use squad::{Controller, Intent, Squad, SquadState, SquadStats, SquadView, Tactic};
pub use state::{AttackRecord, BattleState};
pub use terrain::{FieldTerrain, GroundKind, Terrain, TerrainSpec, Weather};
