//! Squad tactical assessment
//!
//! Evaluates behaviour tree conditions for one squad and turns tree
//! decisions into tactics.

use crate::battle::ai::behavior_tree::{Condition, TacticAction};
use crate::battle::ai::profile::AiProfile;
use crate::battle::category::UnitCategory;
use crate::battle::special_actions::{check_eligibility, SpecialActionKind};
use crate::battle::squad::{SquadView, Tactic};
use crate::battle::targeting::TargetInfo;
use crate::core::config::ActionConfig;
use crate::core::types::SquadId;

/// Charges closer than this are already melee
const MIN_CHARGE_DISTANCE: f32 = 12.0;
/// Cavalry closer than this makes cautious infantry brace
const CAVALRY_THREAT_DISTANCE: f32 = 30.0;

/// What the behaviour tree decided for a squad
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Special {
        action: SpecialActionKind,
        target: Option<SquadId>,
    },
    Retreat,
    /// Keep the current tactic
    Maintain,
    Advance {
        target: SquadId,
    },
    Idle,
}

impl Decision {
    pub fn into_tactic(self, current: Tactic) -> Tactic {
        match self {
            Decision::Special { action, target } => Tactic::Special { action, target },
            Decision::Retreat => Tactic::Retreat,
            Decision::Maintain => current,
            Decision::Advance { target } => Tactic::Advance { target },
            Decision::Idle => Tactic::Idle,
        }
    }
}

/// Everything the tree reads for one squad
#[derive(Debug, Clone, Copy)]
pub struct Assessment<'a> {
    pub squad: &'a SquadView,
    /// Best-scored enemy, if any
    pub target: Option<&'a SquadView>,
    pub target_info: Option<TargetInfo>,
    pub profile: &'a AiProfile,
    pub actions: &'a ActionConfig,
}

impl<'a> Assessment<'a> {
    fn target_distance(&self) -> Option<f32> {
        self.target_info.map(|info| info.distance)
    }

    fn eligible(&self, kind: SpecialActionKind) -> bool {
        check_eligibility(kind, self.squad, self.target, self.actions).is_ok()
    }

    pub fn check(&self, condition: Condition) -> bool {
        let squad = self.squad;
        match condition {
            Condition::ActionInProgress => squad.actions.active.is_some(),
            Condition::HasTarget => self.target.is_some(),
            Condition::Engaged => squad.engaged,
            Condition::TargetEngaged => self.target.map_or(false, |t| t.engaged),
            Condition::FlankReady => !squad.ranged && self.eligible(SpecialActionKind::Flank),
            Condition::StrengthFavours => self.target.map_or(false, |t| {
                squad.living as f32 >= t.living as f32 * self.profile.flank_strength_ratio
            }),
            Condition::HeavyMoralePressure => {
                squad.average_morale < self.profile.effective_retreat_morale()
                    || (squad.engaged && squad.strength_ratio() < self.profile.retreat_strength_ratio)
            }
            Condition::EnemyTooClose => {
                squad.ranged
                    && self.target_distance().map_or(false, |d| {
                        d < squad.weapon_range * self.actions.kite_distance_fraction
                    })
                    && self.eligible(SpecialActionKind::Kite)
            }
            Condition::CavalryThreat => {
                !squad.ranged
                    && squad.category != UnitCategory::Cavalry
                    && self.profile.caution >= 0.5
                    && self.target.map_or(false, |t| t.category == UnitCategory::Cavalry)
                    && self.target_distance().map_or(false, |d| d < CAVALRY_THREAT_DISTANCE)
                    && self.eligible(SpecialActionKind::DefensiveFormation)
            }
            Condition::SurroundOpportunity => {
                self.profile.aggression >= 0.5 && self.eligible(SpecialActionKind::Surround)
            }
            Condition::ChargeOpportunity => {
                let reach = self.profile.charge_range.min(self.actions.charge_max_range);
                squad.can_charge
                    && self.profile.aggression >= 0.4
                    && self
                        .target_distance()
                        .map_or(false, |d| (MIN_CHARGE_DISTANCE..=reach).contains(&d))
                    && self.eligible(SpecialActionKind::Charge)
            }
        }
    }

    pub fn decide(&self, action: TacticAction) -> Option<Decision> {
        let target = self.target.map(|t| t.id);
        let special = |kind: SpecialActionKind| Decision::Special { action: kind, target };
        match action {
            TacticAction::MaintainTactic => match (self.squad.tactic, target) {
                (Tactic::Idle, Some(target)) => Some(Decision::Advance { target }),
                _ => Some(Decision::Maintain),
            },
            TacticAction::RequestFlank => target.map(|_| special(SpecialActionKind::Flank)),
            TacticAction::Retreat => Some(Decision::Retreat),
            TacticAction::Kite => Some(special(SpecialActionKind::Kite)),
            TacticAction::Brace => Some(Decision::Special {
                action: SpecialActionKind::DefensiveFormation,
                target: None,
            }),
            TacticAction::Surround => target.map(|_| special(SpecialActionKind::Surround)),
            TacticAction::Charge => target.map(|_| special(SpecialActionKind::Charge)),
            TacticAction::AdvanceOnTarget => target.map(|target| Decision::Advance { target }),
            TacticAction::Idle => Some(Decision::Idle),
        }
    }
}
