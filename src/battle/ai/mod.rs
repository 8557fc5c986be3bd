//! Squad-level AI
//!
//! - `behavior_tree`: closed node set and the default decision procedure
//! - `tactics`: condition checks and decision -> tactic mapping
//! - `profile`: TOML-configurable behaviour tendencies
//! - `controller`: one brain per autonomous squad; sole writer of tactics

pub mod behavior_tree;
pub mod controller;
pub mod profile;
pub mod tactics;

pub use behavior_tree::{default_tree, Condition, Node, Status, TacticAction};
pub use controller::{ActionRequest, AiController, SquadBrain};
pub use profile::AiProfile;
pub use tactics::{Assessment, Decision};
