//! Battle result and chronological log

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::battle::formation::FormationType;
use crate::battle::special_actions::SpecialActionKind;
use crate::battle::squad::SquadState;
use crate::core::types::{SquadId, TeamId, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Victory { winner: TeamId },
    /// Every side was destroyed or fled in the same tick
    Draw,
    /// Tick ceiling reached with more than one side still fighting
    Timeout,
}

/// Notable things that happened, in tick order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogKind {
    BattleStarted { squads: usize, soldiers: usize },
    Engagement { squad: SquadId, enemy: SquadId },
    SquadRouted { squad: SquadId },
    SquadRallied { squad: SquadId },
    SquadDestroyed { squad: SquadId },
    SquadFled { squad: SquadId },
    ActionStarted { squad: SquadId, action: SpecialActionKind },
    ActionFinished { squad: SquadId, action: SpecialActionKind },
    FormationChanged { squad: SquadId, formation: FormationType },
    BattleEnded { outcome: Outcome },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub tick: Tick,
    #[serde(flatten)]
    pub kind: LogKind,
}

impl LogEntry {
    pub fn describe(&self) -> String {
        let what = match &self.kind {
            LogKind::BattleStarted { squads, soldiers } => {
                format!("battle started with {squads} squads ({soldiers} soldiers)")
            }
            LogKind::Engagement { squad, enemy } => format!("{squad} engaged {enemy}"),
            LogKind::SquadRouted { squad } => format!("{squad} broke and ran"),
            LogKind::SquadRallied { squad } => format!("{squad} rallied"),
            LogKind::SquadDestroyed { squad } => format!("{squad} was destroyed"),
            LogKind::SquadFled { squad } => format!("{squad} fled the field"),
            LogKind::ActionStarted { squad, action } => format!("{squad} began {action}"),
            LogKind::ActionFinished { squad, action } => format!("{squad} finished {action}"),
            LogKind::FormationChanged { squad, formation } => {
                format!("{squad} formed {formation}")
            }
            LogKind::BattleEnded { outcome } => match outcome {
                Outcome::Victory { winner } => format!("{winner} won"),
                Outcome::Draw => "battle ended in a draw".to_string(),
                Outcome::Timeout => "battle timed out".to_string(),
            },
        };
        format!("[{:>5}] {}", self.tick, what)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquadResult {
    pub squad: SquadId,
    pub team: TeamId,
    pub starting: usize,
    /// Living soldiers plus those who escaped the field
    pub surviving: usize,
    pub escaped: usize,
    pub kills: u32,
    pub average_morale: f32,
    pub final_state: SquadState,
}

impl SquadResult {
    pub fn casualties(&self) -> usize {
        self.starting.saturating_sub(self.surviving)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleResult {
    pub battle_id: Uuid,
    pub outcome: Outcome,
    pub ticks: Tick,
    pub squads: Vec<SquadResult>,
    pub log: Vec<LogEntry>,
}

impl BattleResult {
    pub fn winner(&self) -> Option<TeamId> {
        match self.outcome {
            Outcome::Victory { winner } => Some(winner),
            _ => None,
        }
    }

    pub fn squad(&self, id: SquadId) -> Option<&SquadResult> {
        self.squads.iter().find(|s| s.squad == id)
    }

    /// Soldiers lost by a team across all its squads
    pub fn team_casualties(&self, team: TeamId) -> usize {
        self.squads
            .iter()
            .filter(|s| s.team == team)
            .map(SquadResult::casualties)
            .sum()
    }

    /// Human-readable summary: outcome, per-squad lines, then the log
    pub fn recap(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.squads.len() + self.log.len() + 2);
        let headline = match self.outcome {
            Outcome::Victory { winner } => format!("Victory for {winner} after {} ticks", self.ticks),
            Outcome::Draw => format!("Draw after {} ticks", self.ticks),
            Outcome::Timeout => format!("Timeout after {} ticks", self.ticks),
        };
        lines.push(headline);

        for squad in &self.squads {
            lines.push(format!(
                "  {} ({}): {}/{} surviving, {} escaped, {} kills, morale {:.0}, {:?}",
                squad.squad,
                squad.team,
                squad.surviving,
                squad.starting,
                squad.escaped,
                squad.kills,
                squad.average_morale,
                squad.final_state,
            ));
        }

        if !self.log.is_empty() {
            lines.push("Log:".to_string());
            lines.extend(self.log.iter().map(|entry| format!("  {}", entry.describe())));
        }
        lines
    }
}
