//! Player/host commands and the per-battle command queue
//!
//! Commands are validated at submission and queued; the tick drains them in
//! `(timestamp, sequence)` order. A `hold` or `retreat` drained in the same
//! batch supersedes that squad's other movement and attack orders; formation
//! changes are kept.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::battle::formation::FormationType;
use crate::battle::special_actions::SpecialActionKind;
use crate::core::types::{SquadId, TeamId, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandKind {
    Move {
        squad: SquadId,
        destination: Vec2,
    },
    Attack {
        squad: SquadId,
        target: SquadId,
    },
    Hold {
        squad: SquadId,
    },
    Retreat {
        squad: SquadId,
    },
    SpecialAction {
        squad: SquadId,
        action: SpecialActionKind,
        #[serde(default)]
        target: Option<SquadId>,
    },
    SetFormation {
        squad: SquadId,
        formation: FormationType,
    },
}

impl CommandKind {
    pub fn squad(&self) -> SquadId {
        match self {
            CommandKind::Move { squad, .. }
            | CommandKind::Attack { squad, .. }
            | CommandKind::Hold { squad }
            | CommandKind::Retreat { squad }
            | CommandKind::SpecialAction { squad, .. }
            | CommandKind::SetFormation { squad, .. } => *squad,
        }
    }

    /// Target squad, for commands that name one
    pub fn target(&self) -> Option<SquadId> {
        match self {
            CommandKind::Attack { target, .. } => Some(*target),
            CommandKind::SpecialAction { target, .. } => *target,
            _ => None,
        }
    }

    /// Hold and retreat override anything else queued for the squad
    pub fn is_overriding(&self) -> bool {
        matches!(self, CommandKind::Hold { .. } | CommandKind::Retreat { .. })
    }

    /// Orders a hold or retreat replaces; formation changes are independent
    pub fn is_superseded_by_override(&self) -> bool {
        !matches!(self, CommandKind::SetFormation { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Move { .. } => "move",
            CommandKind::Attack { .. } => "attack",
            CommandKind::Hold { .. } => "hold",
            CommandKind::Retreat { .. } => "retreat",
            CommandKind::SpecialAction { .. } => "special_action",
            CommandKind::SetFormation { .. } => "set_formation",
        }
    }
}

/// A command as it arrives from the transport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub team: TeamId,
    /// Client timestamp (milliseconds); orders the queue
    pub timestamp: u64,
    #[serde(flatten)]
    pub kind: CommandKind,
}

impl Command {
    pub fn new(team: TeamId, timestamp: u64, kind: CommandKind) -> Self {
        Self {
            team,
            timestamp,
            kind,
        }
    }

    pub fn squad(&self) -> SquadId {
        self.kind.squad()
    }
}

#[derive(Debug, Clone)]
struct Queued {
    timestamp: u64,
    seq: u64,
    command: Command,
}

#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: Vec<Queued>,
    next_seq: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.pending.push(Queued {
            timestamp: command.timestamp,
            seq: self.next_seq,
            command,
        });
        self.next_seq += 1;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Everything queued, ordered and with superseded commands removed
    pub fn drain(&mut self) -> Vec<Command> {
        let mut batch = std::mem::take(&mut self.pending);
        batch.sort_by_key(|q| (q.timestamp, q.seq));

        let overridden: BTreeSet<SquadId> = batch
            .iter()
            .filter(|q| q.command.kind.is_overriding())
            .map(|q| q.command.squad())
            .collect();

        // For an overridden squad only its last hold/retreat survives, plus
        // any formation change
        let mut last_override = BTreeMap::new();
        for (i, q) in batch.iter().enumerate() {
            if q.command.kind.is_overriding() {
                last_override.insert(q.command.squad(), i);
            }
        }

        batch
            .into_iter()
            .enumerate()
            .filter(|(i, q)| {
                let squad = q.command.squad();
                !overridden.contains(&squad)
                    || last_override.get(&squad) == Some(i)
                    || !q.command.kind.is_superseded_by_override()
            })
            .map(|(_, q)| q.command)
            .collect()
    }
}
