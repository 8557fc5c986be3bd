use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{SquadId, TeamId};

/// Fatal errors: malformed init records, invalid configuration, file I/O
#[derive(Error, Debug)]
pub enum BattleError {
    #[error("battle needs at least two sides, got {0}")]
    NotEnoughSides(usize),

    #[error("side {0} has no squads")]
    EmptySide(TeamId),

    #[error("{0} is listed on more than one side")]
    DuplicateTeam(TeamId),

    #[error("{0} has no soldiers")]
    EmptySquad(SquadId),

    #[error("{0} is declared more than once")]
    DuplicateSquad(SquadId),

    #[error("unknown unit category `{0}`")]
    UnknownCategory(String),

    #[error("unknown formation `{0}`")]
    UnknownFormation(String),

    #[error("unknown AI profile `{0}`")]
    UnknownProfile(String),

    #[error("{squad}: {field} out of range ({value})")]
    OutOfRange {
        squad: SquadId,
        field: &'static str,
        value: f32,
    },

    #[error("{squad} deploys on impassable ground at ({x}, {z})")]
    ImpassableDeployment { squad: SquadId, x: f32, z: f32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BattleError>;

/// Why a command was rejected; surfaced to observers as an `error` event
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandError {
    #[error("{0} does not exist")]
    UnknownSquad(SquadId),

    #[error("{0} has already been destroyed or has left the field")]
    SquadDestroyed(SquadId),

    #[error("{squad} is not owned by {team}")]
    NotOwner { squad: SquadId, team: TeamId },

    #[error("target {0} does not exist")]
    UnknownTarget(SquadId),

    #[error("target {0} has already been destroyed")]
    TargetDestroyed(SquadId),

    #[error("target {0} is on the same side")]
    FriendlyTarget(SquadId),

    #[error("{action} requires a target squad")]
    MissingTarget { action: &'static str },

    #[error("{squad} cannot perform {action}: {reason}")]
    ActionVetoed {
        squad: SquadId,
        action: &'static str,
        reason: &'static str,
    },

    #[error("battle has already ended")]
    BattleFinished,
}

impl CommandError {
    /// Stable reason code for the transport layer
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::UnknownSquad(_) => "unknown_squad",
            CommandError::SquadDestroyed(_) => "squad_destroyed",
            CommandError::NotOwner { .. } => "not_owner",
            CommandError::UnknownTarget(_) => "unknown_target",
            CommandError::TargetDestroyed(_) => "target_destroyed",
            CommandError::FriendlyTarget(_) => "friendly_target",
            CommandError::MissingTarget { .. } => "missing_target",
            CommandError::ActionVetoed { .. } => "action_vetoed",
            CommandError::BattleFinished => "battle_finished",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_codes_are_stable() {
        assert_eq!(CommandError::UnknownSquad(SquadId(1)).code(), "unknown_squad");
        assert_eq!(
            CommandError::NotOwner {
                squad: SquadId(1),
                team: TeamId(2)
            }
            .code(),
            "not_owner"
        );
        assert_eq!(CommandError::BattleFinished.code(), "battle_finished");
    }

    #[test]
    fn test_error_messages() {
        let err = BattleError::UnknownCategory("dragon".into());
        assert_eq!(err.to_string(), "unknown unit category `dragon`");
        let err = CommandError::NotOwner {
            squad: SquadId(4),
            team: TeamId(1),
        };
        assert_eq!(err.to_string(), "squad#4 is not owned by team#1");
    }
}
