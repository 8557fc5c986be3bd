//! Squad behaviour tree
//!
//! Closed node set evaluated top-down once per evaluation. Conditions read
//! the squad's `Assessment`; actions write the `Decision` and succeed.

use crate::battle::ai::tactics::{Assessment, Decision};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    ActionInProgress,
    HasTarget,
    Engaged,
    TargetEngaged,
    FlankReady,
    StrengthFavours,
    HeavyMoralePressure,
    EnemyTooClose,
    CavalryThreat,
    SurroundOpportunity,
    ChargeOpportunity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TacticAction {
    MaintainTactic,
    RequestFlank,
    Retreat,
    Kite,
    Brace,
    Surround,
    Charge,
    AdvanceOnTarget,
    Idle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// First child to succeed wins
    Selector(Vec<Node>),
    /// Every child must succeed, in order
    Sequence(Vec<Node>),
    Inverter(Box<Node>),
    Condition(Condition),
    Action(TacticAction),
}

impl Node {
    pub fn tick(&self, ctx: &Assessment<'_>, decision: &mut Option<Decision>) -> Status {
        match self {
            Node::Selector(children) => {
                for child in children {
                    if child.tick(ctx, decision) == Status::Success {
                        return Status::Success;
                    }
                }
                Status::Failure
            }
            Node::Sequence(children) => {
                for child in children {
                    if child.tick(ctx, decision) == Status::Failure {
                        return Status::Failure;
                    }
                }
                Status::Success
            }
            Node::Inverter(child) => match child.tick(ctx, decision) {
                Status::Success => Status::Failure,
                Status::Failure => Status::Success,
            },
            Node::Condition(condition) => {
                if ctx.check(*condition) {
                    Status::Success
                } else {
                    Status::Failure
                }
            }
            Node::Action(action) => match ctx.decide(*action) {
                Some(d) => {
                    *decision = Some(d);
                    Status::Success
                }
                None => Status::Failure,
            },
        }
    }

    /// Run the tree and return its decision, if any
    pub fn evaluate(&self, ctx: &Assessment<'_>) -> Option<Decision> {
        let mut decision = None;
        match self.tick(ctx, &mut decision) {
            Status::Success => decision,
            Status::Failure => None,
        }
    }
}

fn when(conditions: &[Condition], action: TacticAction) -> Node {
    let mut children: Vec<Node> = conditions.iter().copied().map(Node::Condition).collect();
    children.push(Node::Action(action));
    Node::Sequence(children)
}

/// Standard squad decision procedure
pub fn default_tree() -> Node {
    use Condition::*;

    Node::Selector(vec![
        Node::Sequence(vec![
            Node::Condition(HasTarget),
            Node::Inverter(Box::new(Node::Condition(Engaged))),
            Node::Condition(TargetEngaged),
            Node::Condition(FlankReady),
            Node::Condition(StrengthFavours),
            Node::Action(TacticAction::RequestFlank),
        ]),
        when(&[HeavyMoralePressure], TacticAction::Retreat),
        when(&[ActionInProgress], TacticAction::MaintainTactic),
        when(&[EnemyTooClose], TacticAction::Kite),
        when(&[CavalryThreat], TacticAction::Brace),
        Node::Sequence(vec![
            Node::Condition(Engaged),
            Node::Selector(vec![
                when(&[SurroundOpportunity], TacticAction::Surround),
                Node::Action(TacticAction::MaintainTactic),
            ]),
        ]),
        when(&[ChargeOpportunity], TacticAction::Charge),
        Node::Action(TacticAction::AdvanceOnTarget),
        Node::Action(TacticAction::Idle),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::ai::profile::AiProfile;
    use crate::battle::category::UnitCategory;
    use crate::battle::formation::FormationType;
    use crate::battle::special_actions::{self, ActionSlot, SpecialActionKind};
    use crate::battle::squad::{SquadState, SquadView, Tactic};
    use crate::battle::targeting::TargetInfo;
    use crate::core::config::ActionConfig;
    use crate::core::types::{SquadId, TeamId, Vec2};

    fn view(id: u32, team: u8, category: UnitCategory, centroid: Vec2, living: usize) -> SquadView {
        let stats = category.base_stats();
        SquadView {
            id: SquadId(id),
            team: TeamId(team),
            category,
            state: SquadState::Idle,
            tactic: Tactic::Idle,
            anchor: centroid,
            heading: 0.0,
            centroid,
            living,
            starting: living,
            health_fraction: 1.0,
            average_morale: 70.0,
            routing_fraction: 0.0,
            engaged: false,
            flanked: false,
            threat: 10.0,
            weapon_range: stats.weapon_range,
            ranged: stats.ranged,
            can_charge: stats.can_charge,
            actions: ActionSlot::default(),
        }
    }

    fn info(target: &SquadView, me: &SquadView) -> TargetInfo {
        TargetInfo {
            squad: target.id,
            distance: me.centroid.distance(&target.centroid),
            score: 1.0,
            distance_score: 0.0,
            counter_score: 0.0,
            health_score: 0.0,
            threat_score: 0.0,
        }
    }

    fn decide(me: &SquadView, target: Option<&SquadView>, profile: &AiProfile) -> Option<Decision> {
        let actions = ActionConfig::default();
        let ctx = Assessment {
            squad: me,
            target,
            target_info: target.map(|t| info(t, me)),
            profile,
            actions: &actions,
        };
        default_tree().evaluate(&ctx)
    }

    #[test]
    fn test_idle_without_enemies() {
        let me = view(1, 0, UnitCategory::Infantry, Vec2::ZERO, 50);
        assert_eq!(decide(&me, None, &AiProfile::default()), Some(Decision::Idle));
    }

    #[test]
    fn test_advance_on_distant_target() {
        let me = view(1, 0, UnitCategory::Infantry, Vec2::ZERO, 50);
        let enemy = view(2, 1, UnitCategory::Infantry, Vec2::new(0.0, 100.0), 50);
        assert_eq!(
            decide(&me, Some(&enemy), &AiProfile::default()),
            Some(Decision::Advance { target: SquadId(2) })
        );
    }

    #[test]
    fn test_flank_engaged_target_when_stronger() {
        let me = view(1, 0, UnitCategory::Infantry, Vec2::ZERO, 80);
        let mut enemy = view(2, 1, UnitCategory::Infantry, Vec2::new(0.0, 60.0), 50);
        enemy.engaged = true;
        assert_eq!(
            decide(&me, Some(&enemy), &AiProfile::default()),
            Some(Decision::Special {
                action: SpecialActionKind::Flank,
                target: Some(SquadId(2))
            })
        );
    }

    #[test]
    fn test_low_morale_retreats() {
        let mut me = view(1, 0, UnitCategory::Infantry, Vec2::ZERO, 50);
        me.average_morale = 20.0;
        let enemy = view(2, 1, UnitCategory::Infantry, Vec2::new(0.0, 10.0), 50);
        assert_eq!(decide(&me, Some(&enemy), &AiProfile::default()), Some(Decision::Retreat));
    }

    #[test]
    fn test_morale_pressure_overrides_running_action() {
        let mut me = view(1, 0, UnitCategory::Infantry, Vec2::ZERO, 50);
        me.average_morale = 5.0;
        me.engaged = true;
        me.tactic = Tactic::Special {
            action: SpecialActionKind::Flank,
            target: Some(SquadId(2)),
        };
        me.actions.active = Some(special_actions::start(
            SpecialActionKind::Flank,
            Some(SquadId(2)),
            FormationType::Line,
            &ActionConfig::default(),
        ));
        let enemy = view(2, 1, UnitCategory::Infantry, Vec2::new(0.0, 2.0), 50);
        assert_eq!(decide(&me, Some(&enemy), &AiProfile::default()), Some(Decision::Retreat));
    }

    #[test]
    fn test_running_action_is_maintained() {
        let mut me = view(1, 0, UnitCategory::Cavalry, Vec2::ZERO, 50);
        me.tactic = Tactic::Special {
            action: SpecialActionKind::Charge,
            target: Some(SquadId(2)),
        };
        me.actions.active = Some(special_actions::start(
            SpecialActionKind::Charge,
            Some(SquadId(2)),
            FormationType::Wedge,
            &ActionConfig::default(),
        ));
        let enemy = view(2, 1, UnitCategory::Ranged, Vec2::new(0.0, 30.0), 50);
        assert_eq!(decide(&me, Some(&enemy), &AiProfile::default()), Some(Decision::Maintain));
    }

    #[test]
    fn test_engaged_squad_keeps_tactic() {
        let mut me = view(1, 0, UnitCategory::Infantry, Vec2::ZERO, 50);
        me.engaged = true;
        me.tactic = Tactic::Advance { target: SquadId(2) };
        let enemy = view(2, 1, UnitCategory::Infantry, Vec2::new(0.0, 2.0), 50);
        assert_eq!(decide(&me, Some(&enemy), &AiProfile::default()), Some(Decision::Maintain));
    }

    #[test]
    fn test_cavalry_charges_in_range() {
        let me = view(1, 0, UnitCategory::Cavalry, Vec2::ZERO, 30);
        let enemy = view(2, 1, UnitCategory::Ranged, Vec2::new(0.0, 30.0), 50);
        assert_eq!(
            decide(&me, Some(&enemy), &AiProfile::default()),
            Some(Decision::Special {
                action: SpecialActionKind::Charge,
                target: Some(SquadId(2))
            })
        );
    }

    #[test]
    fn test_inverter_and_sequence_semantics() {
        let me = view(1, 0, UnitCategory::Infantry, Vec2::ZERO, 50);
        let profile = AiProfile::default();
        let actions = ActionConfig::default();
        let ctx = Assessment {
            squad: &me,
            target: None,
            target_info: None,
            profile: &profile,
            actions: &actions,
        };
        let mut out = None;
        let inverted = Node::Inverter(Box::new(Node::Condition(Condition::Engaged)));
        assert_eq!(inverted.tick(&ctx, &mut out), Status::Success);
        let seq = Node::Sequence(vec![
            Node::Condition(Condition::HasTarget),
            Node::Action(TacticAction::Idle),
        ]);
        assert_eq!(seq.tick(&ctx, &mut out), Status::Failure);
        assert!(out.is_none());
    }
}
