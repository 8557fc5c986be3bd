//! Outbound event queue drained by the transport

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::battle::result::BattleResult;
use crate::battle::snapshot::Snapshot;
use crate::core::error::CommandError;
use crate::core::types::{SquadId, TeamId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Full snapshot for an observer that just connected
    Joined { snapshot: Snapshot },
    /// Periodic state update
    State { snapshot: Snapshot },
    Ended { result: BattleResult },
    /// A command was rejected
    Error {
        team: TeamId,
        squad: Option<SquadId>,
        reason: String,
        message: String,
    },
}

impl OutboundEvent {
    pub fn rejected(team: TeamId, squad: Option<SquadId>, error: &CommandError) -> Self {
        OutboundEvent::Error {
            team,
            squad,
            reason: error.code().to_string(),
            message: error.to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundEvent::Joined { .. } => "joined",
            OutboundEvent::State { .. } => "state",
            OutboundEvent::Ended { .. } => "ended",
            OutboundEvent::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: VecDeque<OutboundEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: OutboundEvent) {
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Everything queued since the last drain, oldest first
    pub fn drain(&mut self) -> Vec<OutboundEvent> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_carries_reason_code() {
        let event = OutboundEvent::rejected(
            TeamId(0),
            Some(SquadId(4)),
            &CommandError::NotOwner {
                squad: SquadId(4),
                team: TeamId(0),
            },
        );
        match &event {
            OutboundEvent::Error { reason, message, .. } => {
                assert_eq!(reason, "not_owner");
                assert!(message.contains("squad#4"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"error""#));
    }

    #[test]
    fn test_queue_drains_in_order() {
        let mut queue = EventQueue::new();
        for tick in 1..=3 {
            queue.push(OutboundEvent::State {
                snapshot: Snapshot {
                    tick,
                    squads: Vec::new(),
                    soldiers: Vec::new(),
                },
            });
        }
        let ticks: Vec<u64> = queue
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                OutboundEvent::State { snapshot } => Some(snapshot.tick),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }
}
