//! AI controller: the single writer of squad tactics
//!
//! Autonomous squads get a brain (tree + profile + evaluation timer).
//! Player squads, and autonomous squads inside a manual override window,
//! have their tactic translated from the last command's intent.

use std::collections::BTreeMap;

use tracing::debug;

use crate::battle::ai::behavior_tree::{default_tree, Node};
use crate::battle::ai::profile::AiProfile;
use crate::battle::ai::tactics::{Assessment, Decision};
use crate::battle::special_actions::SpecialActionKind;
use crate::battle::squad::{Intent, Squad, SquadView, Tactic};
use crate::battle::targeting::select_target;
use crate::core::config::BattleConfig;
use crate::core::types::{SquadId, Tick};

/// Per-squad decision state
#[derive(Debug, Clone)]
pub struct SquadBrain {
    pub squad: SquadId,
    pub profile_name: String,
    pub profile: AiProfile,
    tree: Node,
    next_evaluation: Tick,
    pub last_decision: Option<Decision>,
}

impl SquadBrain {
    pub fn new(squad: SquadId, profile_name: impl Into<String>, profile: AiProfile) -> Self {
        Self {
            squad,
            profile_name: profile_name.into(),
            profile,
            tree: default_tree(),
            next_evaluation: 0,
            last_decision: None,
        }
    }

    /// Force an evaluation on the next run
    pub fn wake(&mut self) {
        self.next_evaluation = 0;
    }
}

/// Special action the controller wants started this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionRequest {
    pub squad: SquadId,
    pub action: SpecialActionKind,
    pub target: Option<SquadId>,
}

#[derive(Debug, Clone, Default)]
pub struct AiController {
    brains: BTreeMap<SquadId, SquadBrain>,
}

fn view_of(views: &[SquadView], id: SquadId) -> Option<&SquadView> {
    views
        .binary_search_by_key(&id, |v| v.id)
        .ok()
        .map(|i| &views[i])
}

fn target_alive(views: &[SquadView], id: SquadId) -> bool {
    view_of(views, id).map_or(false, |v| v.is_targetable())
}

impl AiController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, squad: SquadId, profile_name: impl Into<String>, profile: AiProfile) {
        self.brains.insert(squad, SquadBrain::new(squad, profile_name, profile));
    }

    pub fn brain(&self, squad: SquadId) -> Option<&SquadBrain> {
        self.brains.get(&squad)
    }

    pub fn brain_count(&self) -> usize {
        self.brains.len()
    }

    /// Write every live squad's tactic. `views` must be sorted by squad id.
    pub fn run(
        &mut self,
        tick: Tick,
        squads: &mut BTreeMap<SquadId, Squad>,
        views: &[SquadView],
        config: &BattleConfig,
    ) -> Vec<ActionRequest> {
        let mut requests = Vec::new();

        for (id, squad) in squads.iter_mut() {
            if squad.is_destroyed() {
                continue;
            }

            if squad.is_manually_controlled(tick) || !self.brains.contains_key(id) {
                squad.tactic = Self::tactic_from_intent(squad, views);
                continue;
            }

            let Some(view) = view_of(views, *id) else {
                continue;
            };
            let Some(brain) = self.brains.get_mut(id) else {
                continue;
            };

            // A dead target forces a fresh look this tick
            if let Some(target) = squad.tactic.target() {
                if !target_alive(views, target) {
                    squad.tactic = Tactic::Idle;
                    brain.wake();
                }
            }
            if tick < brain.next_evaluation {
                continue;
            }
            brain.next_evaluation = tick + brain.profile.evaluation_interval.max(1);

            let target_info = select_target(view, views, &brain.profile.weights, &config.combat.counters);
            let target = target_info.and_then(|info| view_of(views, info.squad));
            let assessment = Assessment {
                squad: view,
                target,
                target_info,
                profile: &brain.profile,
                actions: &config.actions,
            };

            let decision = brain.tree.evaluate(&assessment).unwrap_or(Decision::Idle);
            if brain.last_decision != Some(decision) {
                debug!(squad = %id, ?decision, "AI decision changed");
            }
            brain.last_decision = Some(decision);

            if let Decision::Special { action, target } = decision {
                if squad.actions.active_kind() != Some(action) {
                    requests.push(ActionRequest {
                        squad: *id,
                        action,
                        target,
                    });
                }
            }
            squad.tactic = decision.into_tactic(squad.tactic);
        }

        requests
    }

    /// A special action began; the squad follows it until it ends
    pub fn on_action_started(&mut self, squad: &mut Squad, action: SpecialActionKind, target: Option<SquadId>) {
        squad.tactic = Tactic::Special { action, target };
        if let Some(brain) = self.brains.get_mut(&squad.id) {
            brain.last_decision = Some(Decision::Special { action, target });
        }
    }

    /// The active action ended or was cancelled. A squad still following it
    /// falls back to advancing on the action's target.
    pub fn on_action_finished(&mut self, squad: &mut Squad, target: Option<SquadId>) {
        if !matches!(squad.tactic, Tactic::Special { .. }) {
            return;
        }
        self.fall_back(squad, target);
        if let Some(brain) = self.brains.get_mut(&squad.id) {
            brain.wake();
        }
    }

    /// An action the brain asked for failed its entry checks
    pub fn on_action_vetoed(&mut self, squad: &mut Squad, target: Option<SquadId>) {
        self.fall_back(squad, target);
    }

    /// Drop whatever the squad was doing: its target is gone or it is destroyed
    pub fn clear_tactic(&mut self, squad: &mut Squad) {
        squad.tactic = Tactic::Idle;
        if let Some(brain) = self.brains.get_mut(&squad.id) {
            brain.last_decision = Some(Decision::Idle);
            brain.wake();
        }
    }

    fn fall_back(&mut self, squad: &mut Squad, target: Option<SquadId>) {
        let decision = match target {
            Some(target) => Decision::Advance { target },
            None => Decision::Idle,
        };
        squad.tactic = decision.into_tactic(squad.tactic);
        if let Some(brain) = self.brains.get_mut(&squad.id) {
            brain.last_decision = Some(decision);
        }
    }

    /// Tactic implied by the last command. Clears intents whose target is gone
    /// or whose special action has run its course.
    fn tactic_from_intent(squad: &mut Squad, views: &[SquadView]) -> Tactic {
        match squad.intent {
            Intent::None => Tactic::Idle,
            Intent::MoveTo { destination } => Tactic::MoveTo { destination },
            Intent::Attack { target } => {
                if target_alive(views, target) {
                    Tactic::Advance { target }
                } else {
                    debug!(squad = %squad.id, target = %target, "attack target gone, squad idles");
                    squad.intent = Intent::None;
                    Tactic::Idle
                }
            }
            Intent::Hold => Tactic::Hold,
            Intent::Retreat => Tactic::Retreat,
            Intent::Special { action, target } => {
                if squad.actions.active_kind() == Some(action) {
                    Tactic::Special { action, target }
                } else {
                    squad.intent = match target {
                        Some(target) if target_alive(views, target) => Intent::Attack { target },
                        _ => Intent::None,
                    };
                    Self::tactic_from_intent(squad, views)
                }
            }
        }
    }
}
