//! Battle state and the per-tick loop
//!
//! One `BattleState` per battle. Each tick runs, in order:
//! 1. index rebuild + formation sanity check
//! 2. command drain (intent)
//! 3. AI controller (tactics, special action requests)
//! 4. special actions + squad anchors + slot assignment
//! 5. soldier steering, collision correction, escapes
//! 6. combat against post-move positions, damage applied simultaneously
//! 7. morale and fatigue (rout contagion from the previous tick)
//! 8. formation reconciliation and transitions
//! 9. removal of the dead/escaped, squad state derivation
//! 10. termination check and snapshot emission

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use ordered_float::OrderedFloat;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::battle::ai::AiController;
use crate::battle::buffs::{Buff, BuffKind, BuffSource};
use crate::battle::category::UnitCategory;
use crate::battle::combat::{self, relative_angle, CombatContext, Combatant};
use crate::battle::command::{Command, CommandKind, CommandQueue};
use crate::battle::events::{EventQueue, OutboundEvent};
use crate::battle::formation::{FormationState, FormationType};
use crate::battle::init::BattleInit;
use crate::battle::morale::{MoraleEvent, MoraleSystem, MoraleTick, MoraleTransition, RoutNotice};
use crate::battle::result::{BattleResult, LogEntry, LogKind, Outcome, SquadResult};
use crate::battle::snapshot::Snapshot;
use crate::battle::soldier::{Soldier, SoldierArena, SoldierState, SoldierTemplate};
use crate::battle::special_actions::{
    self, check_eligibility, ActionContext, ActionStep, Directive, SpecialActionKind, TargetFix,
};
use crate::battle::squad::{Controller, Intent, Squad, SquadState, SquadStats, SquadView, Tactic};
use crate::battle::steering::{
    collision_corrections, steer_all, MoveMode, SquadOrders, SteeringInput, SteeringWorld,
};
use crate::battle::terrain::{FieldTerrain, Terrain};
use crate::core::config::BattleConfig;
use crate::core::error::{BattleError, CommandError, Result};
use crate::core::types::{turn_towards, Rect, SoldierId, SquadId, TeamId, Tick, Vec2};
use crate::spatial::{QuadEntry, SpatialIndex};

/// One resolved attack from the last tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackRecord {
    pub attacker: SoldierId,
    pub attacker_squad: SquadId,
    pub defender: SoldierId,
    pub defender_squad: SquadId,
    pub hit: bool,
    pub damage: f32,
}

#[derive(Debug, Default)]
struct DamageTally {
    total: f32,
    by_attacker: BTreeMap<SoldierId, f32>,
}

pub struct BattleState {
    battle_id: Uuid,
    tick: Tick,
    tick_ceiling: Tick,
    config: BattleConfig,
    terrain: Box<dyn Terrain>,
    rng: ChaCha8Rng,
    soldiers: SoldierArena,
    squads: BTreeMap<SquadId, Squad>,
    index: SpatialIndex,
    ai: AiController,
    morale: MoraleSystem,
    commands: CommandQueue,
    events: EventQueue,
    log: Vec<LogEntry>,
    engaged_pairs: BTreeSet<(SquadId, SquadId)>,
    last_attacks: Vec<AttackRecord>,
    result: Option<BattleResult>,
}

impl std::fmt::Debug for BattleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BattleState")
            .field("battle_id", &self.battle_id)
            .field("tick", &self.tick)
            .field("squads", &self.squads.len())
            .field("soldiers", &self.soldiers.len())
            .field("finished", &self.result.is_some())
            .finish()
    }
}

impl BattleState {
    /// Build a battle on the built-in field terrain described by the init record
    pub fn new(init: &BattleInit, config: BattleConfig) -> Result<Self> {
        let terrain = FieldTerrain::new(init.field.rect(), &init.terrain, init.weather);
        Self::with_terrain(init, config, Box::new(terrain))
    }

    /// Build a battle on host-provided terrain
    pub fn with_terrain(init: &BattleInit, config: BattleConfig, terrain: Box<dyn Terrain>) -> Result<Self> {
        config.validate()?;
        init.validate(&config)?;
        for squad_init in init.sides.iter().flat_map(|side| side.squads.iter()) {
            let at = squad_init.position;
            if !terrain.is_passable(at) {
                return Err(BattleError::ImpassableDeployment {
                    squad: squad_init.id,
                    x: at.x,
                    z: at.z,
                });
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(init.seed);
        let battle_id = init
            .battle_id
            .unwrap_or_else(|| uuid::Builder::from_random_bytes(rng.gen()).into_uuid());

        let mut squad_inits: Vec<_> = init
            .sides
            .iter()
            .flat_map(|side| side.squads.iter().map(move |s| (side.team, s)))
            .collect();
        squad_inits.sort_by_key(|(_, s)| s.id);

        let mut soldiers = SoldierArena::new();
        let mut squads = BTreeMap::new();
        let mut ai = AiController::new();
        let combat_cfg = &config.combat;

        for (team, squad_init) in squad_inits {
            let category: UnitCategory = squad_init.category.parse()?;
            let general = squad_init.general;
            let stats = SquadStats {
                leadership: general.map_or(0.0, |g| g.leadership),
                strength: general.map_or(0.0, |g| g.strength),
                intelligence: general.map_or(0.0, |g| g.intelligence),
                training: squad_init.training,
            };

            let mut soldier_stats = category.base_stats();
            soldier_stats.power *= 1.0 + stats.strength * combat_cfg.strength_power_bonus;
            soldier_stats.accuracy = (soldier_stats.accuracy
                + stats.training * combat_cfg.training_accuracy_bonus
                + stats.intelligence * combat_cfg.intelligence_accuracy_bonus)
                .min(1.0);

            let template = SoldierTemplate {
                squad: squad_init.id,
                team,
                category,
                stats: soldier_stats,
                morale: squad_init.morale,
                resolve: stats.resolve(),
            };

            let count = squad_init.soldier_count(&config);
            let formation = FormationState::new(squad_init.formation, count, &config.formation);
            let roster: Vec<SoldierId> = (0..count)
                .map(|i| {
                    let position = formation.slot(i).local_to_world(squad_init.position, squad_init.heading);
                    soldiers.spawn(&template, position, squad_init.heading)
                })
                .collect();

            if squad_init.controller == Controller::Autonomous {
                let name = squad_init
                    .ai_profile
                    .clone()
                    .unwrap_or_else(|| config.ai.default_profile.clone());
                let profile = config.ai.profile(&name).cloned().unwrap_or_default();
                ai.register(squad_init.id, name, profile);
            }

            squads.insert(
                squad_init.id,
                Squad {
                    id: squad_init.id,
                    team,
                    category,
                    controller: squad_init.controller,
                    formation,
                    living: roster.clone(),
                    roster,
                    stats,
                    has_general: general.is_some(),
                    ai_profile: squad_init.ai_profile.clone(),
                    intent: Intent::None,
                    tactic: Tactic::Idle,
                    state: SquadState::Idle,
                    anchor: squad_init.position,
                    heading: squad_init.heading,
                    deploy_heading: squad_init.heading,
                    actions: Default::default(),
                    manual_until: None,
                    kills: 0,
                    escaped: 0,
                    starting_count: count,
                    flanked_timer: 0.0,
                    engaged: false,
                },
            );
        }

        let mut index = SpatialIndex::new(terrain.bounds(), &config.spatial);
        index.rebuild(soldiers.present().map(entry_of));

        let morale = MoraleSystem::new(config.morale.clone(), config.fatigue.clone());
        let tick_ceiling = init.tick_ceiling.unwrap_or(config.simulation.tick_ceiling);

        info!(
            battle = %battle_id,
            squads = squads.len(),
            soldiers = soldiers.len(),
            seed = init.seed,
            "battle started"
        );

        let log = vec![LogEntry {
            tick: 0,
            kind: LogKind::BattleStarted {
                squads: squads.len(),
                soldiers: soldiers.len(),
            },
        }];

        Ok(Self {
            battle_id,
            tick: 0,
            tick_ceiling,
            config,
            terrain,
            rng,
            soldiers,
            squads,
            index,
            ai,
            morale,
            commands: CommandQueue::new(),
            events: EventQueue::new(),
            log,
            engaged_pairs: BTreeSet::new(),
            last_attacks: Vec::new(),
            result: None,
        })
    }

    // ---- accessors ----------------------------------------------------

    pub fn battle_id(&self) -> Uuid {
        self.battle_id
    }

    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    pub fn squad(&self, id: SquadId) -> Option<&Squad> {
        self.squads.get(&id)
    }

    pub fn squads(&self) -> impl Iterator<Item = &Squad> {
        self.squads.values()
    }

    pub fn soldier(&self, id: SoldierId) -> Option<&Soldier> {
        self.soldiers.get(id)
    }

    pub fn soldiers(&self) -> &SoldierArena {
        &self.soldiers
    }

    pub fn ai(&self) -> &AiController {
        &self.ai
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Soldiers alive and on the field
    pub fn living_count(&self) -> usize {
        self.soldiers.present().count()
    }

    pub fn formation_slot_count(&self, squad: SquadId) -> Option<usize> {
        self.squads.get(&squad).map(|s| s.formation.slots.len())
    }

    /// Attacks resolved during the last tick, in attacker id order
    pub fn last_tick_attacks(&self) -> &[AttackRecord] {
        &self.last_attacks
    }

    /// Effective armour of a soldier in its current formation and order
    pub fn soldier_defense(&self, id: SoldierId) -> Option<f32> {
        let soldier = self.soldiers.get(id)?;
        let squad = self.squads.get(&soldier.squad)?;
        let combatant = Combatant::from_soldier(
            soldier,
            self.config.fatigue.penalty_at_max,
            self.config.morale.wavering_threshold,
        );
        let ctx = CombatContext {
            relative_angle: 0.0,
            distance: 1.0,
            terrain_modifier: 1.0,
            defender_formation: squad.formation.modifiers(),
            defender_disordered: soldier.disordered,
            weather_ranged_penalty: 0.0,
            charging: false,
        };
        Some(combat::effective_armor(&combatant, &ctx, &self.config.combat))
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    pub fn result(&self) -> Option<&BattleResult> {
        self.result.as_ref()
    }

    // ---- observers ----------------------------------------------------

    pub fn snapshot(&self, view: Option<Rect>) -> Snapshot {
        Snapshot::capture(self.tick, self.squads.values(), &self.soldiers, view)
    }

    /// Snapshot for a newly connected observer; also queued as `joined`
    pub fn join(&mut self, view: Option<Rect>) -> Snapshot {
        let snapshot = self.snapshot(view);
        self.events.push(OutboundEvent::Joined {
            snapshot: snapshot.clone(),
        });
        snapshot
    }

    pub fn drain_events(&mut self) -> Vec<OutboundEvent> {
        self.events.drain()
    }

    // ---- commands -----------------------------------------------------

    /// Validate and queue a command. Rejections are also queued as `error` events.
    pub fn submit(&mut self, command: Command) -> std::result::Result<(), CommandError> {
        match self.validate_command(&command) {
            Ok(()) => {
                self.commands.push(command);
                Ok(())
            }
            Err(error) => {
                debug!(team = %command.team, squad = %command.squad(), %error, "command rejected");
                self.events
                    .push(OutboundEvent::rejected(command.team, Some(command.squad()), &error));
                Err(error)
            }
        }
    }

    fn validate_command(&self, command: &Command) -> std::result::Result<(), CommandError> {
        if self.result.is_some() {
            return Err(CommandError::BattleFinished);
        }
        let id = command.squad();
        let squad = self.squads.get(&id).ok_or(CommandError::UnknownSquad(id))?;
        if squad.is_destroyed() {
            return Err(CommandError::SquadDestroyed(id));
        }
        if squad.team != command.team {
            return Err(CommandError::NotOwner {
                squad: id,
                team: command.team,
            });
        }

        if let CommandKind::SpecialAction { action, target: None, .. } = command.kind {
            if action.requires_target() {
                return Err(CommandError::MissingTarget { action: action.name() });
            }
        }
        if let Some(target_id) = command.kind.target() {
            let target = self
                .squads
                .get(&target_id)
                .ok_or(CommandError::UnknownTarget(target_id))?;
            if target.is_destroyed() {
                return Err(CommandError::TargetDestroyed(target_id));
            }
            if target.team == squad.team {
                return Err(CommandError::FriendlyTarget(target_id));
            }
        }
        Ok(())
    }

    // ---- tick ---------------------------------------------------------

    /// Advance the battle by one tick. Does nothing once the battle has ended.
    pub fn tick(&mut self) {
        if self.result.is_some() {
            return;
        }
        self.tick += 1;
        let dt = self.config.simulation.tick_seconds;
        let contagion = self.morale.take_rout_notices();

        self.prepare_tick();
        self.apply_commands();
        self.run_ai();
        let inputs = self.move_squads(dt);
        self.steer(&inputs, dt);
        let attacks = self.resolve_combat();
        self.update_morale(&contagion, dt);
        self.update_formations(dt);
        self.update_squads();
        self.finish_tick();

        trace!(tick = self.tick, attacks, living = self.living_count(), "tick complete");
    }

    /// Tick until the battle ends and return its result
    pub fn run_to_completion(&mut self) -> BattleResult {
        while self.result.is_none() {
            self.tick();
        }
        self.result.clone().unwrap_or_else(|| self.build_result(Outcome::Timeout))
    }

    fn prepare_tick(&mut self) {
        self.index.rebuild(self.soldiers.present().map(entry_of));
        for soldier in self.soldiers.iter_mut() {
            soldier.moved = 0.0;
            soldier.attacks = 0;
        }

        let formation_cfg = &self.config.formation;
        for squad in self.squads.values_mut() {
            if squad.formation.slots.len() != squad.living.len() {
                warn!(
                    squad = %squad.id,
                    slots = squad.formation.slots.len(),
                    living = squad.living.len(),
                    "formation slot mismatch, recomputing"
                );
                squad.formation.reconcile(squad.living.len(), formation_cfg);
            }
        }
    }

    fn target_available(&self, id: SquadId) -> bool {
        self.squads
            .get(&id)
            .map_or(false, |s| !s.is_destroyed() && !s.living.is_empty())
    }

    fn view(&self, id: SquadId) -> Option<SquadView> {
        self.squads.get(&id).map(|s| SquadView::build(s, &self.soldiers))
    }

    fn apply_commands(&mut self) {
        let override_ticks = self.config.seconds_to_ticks(self.config.ai.command_override_seconds);

        for command in self.commands.drain() {
            let id = command.squad();
            let Some(squad) = self.squads.get(&id) else {
                continue;
            };
            if squad.is_destroyed() {
                debug!(squad = %id, command = command.kind.name(), "squad gone before command applied");
                continue;
            }

            if let Some(target) = command.kind.target() {
                if !self.target_available(target) {
                    debug!(squad = %id, target = %target, "target destroyed before command applied, squad idles");
                    if let Some(squad) = self.squads.get_mut(&id) {
                        squad.intent = Intent::None;
                        self.ai.clear_tactic(squad);
                    }
                    continue;
                }
            }

            let intent = match command.kind {
                CommandKind::Move { destination, .. } => Some(Intent::MoveTo { destination }),
                CommandKind::Attack { target, .. } => Some(Intent::Attack { target }),
                CommandKind::Hold { .. } => {
                    self.cancel_action(id);
                    Some(Intent::Hold)
                }
                CommandKind::Retreat { .. } => {
                    self.cancel_action(id);
                    Some(Intent::Retreat)
                }
                CommandKind::SpecialAction { action, target, .. } => match self.start_action(id, action, target) {
                    Ok(()) => Some(Intent::Special { action, target }),
                    Err(reason) => {
                        let error = CommandError::ActionVetoed {
                            squad: id,
                            action: action.name(),
                            reason,
                        };
                        debug!(squad = %id, %error, "special action vetoed");
                        self.events.push(OutboundEvent::rejected(command.team, Some(id), &error));
                        None
                    }
                },
                CommandKind::SetFormation { formation, .. } => {
                    self.change_formation(id, formation);
                    None
                }
            };

            if let (Some(intent), Some(squad)) = (intent, self.squads.get_mut(&id)) {
                squad.intent = intent;
                if squad.controller == Controller::Autonomous {
                    squad.manual_until = Some(self.tick + override_ticks);
                }
            }
        }
    }

    fn change_formation(&mut self, id: SquadId, formation: FormationType) {
        let Some(squad) = self.squads.get_mut(&id) else {
            return;
        };
        let living = squad.living.len();
        if squad.formation.set_formation(formation, living, &self.config.formation) {
            debug!(squad = %id, %formation, "formation change started");
            self.log.push(LogEntry {
                tick: self.tick,
                kind: LogKind::FormationChanged { squad: id, formation },
            });
        }
    }

    /// Entry checks, then start the action and apply its opening effects
    fn start_action(
        &mut self,
        id: SquadId,
        kind: SpecialActionKind,
        target: Option<SquadId>,
    ) -> std::result::Result<(), &'static str> {
        let view = self.view(id).ok_or("squad is routing")?;
        let target_view = target.and_then(|t| self.view(t));
        check_eligibility(kind, &view, target_view.as_ref(), &self.config.actions)?;

        let actions = &self.config.actions;
        let Some(squad) = self.squads.get_mut(&id) else {
            return Err("squad is routing");
        };
        let action = special_actions::start(kind, target, squad.formation.kind, actions);
        squad.actions.active = Some(action);
        self.ai.on_action_started(squad, kind, target);

        let buffs: Vec<Buff> = match kind {
            SpecialActionKind::Charge => vec![
                Buff::new(BuffKind::Speed, actions.charge_speed_bonus, BuffSource::Charge, actions.charge_duration),
                Buff::new(BuffKind::Attack, actions.charge_attack_bonus, BuffSource::Charge, actions.charge_duration),
            ],
            SpecialActionKind::DefensiveFormation => vec![Buff::new(
                BuffKind::Defense,
                actions.brace_defense_bonus,
                BuffSource::Brace,
                actions.defensive_duration,
            )],
            _ => Vec::new(),
        };
        for soldier_id in &squad.living {
            if let Some(soldier) = self.soldiers.get_mut(*soldier_id) {
                if soldier.is_routing() || !soldier.is_present() {
                    continue;
                }
                for buff in &buffs {
                    soldier.buffs.push(*buff);
                }
            }
        }

        debug!(squad = %id, action = %kind, target = ?target, "special action started");
        self.log.push(LogEntry {
            tick: self.tick,
            kind: LogKind::ActionStarted { squad: id, action: kind },
        });

        if kind == SpecialActionKind::DefensiveFormation {
            self.change_formation(id, FormationType::ShieldWall);
        }
        Ok(())
    }

    /// End the active action (cooldown starts) and undo its lasting effects
    fn finish_action(&mut self, id: SquadId) {
        let Some(squad) = self.squads.get_mut(&id) else {
            return;
        };
        let Some(action) = squad.actions.finish(&self.config.actions) else {
            return;
        };

        let source = match action.kind {
            SpecialActionKind::Charge => Some(BuffSource::Charge),
            SpecialActionKind::DefensiveFormation => Some(BuffSource::Brace),
            _ => None,
        };
        if let Some(source) = source {
            for soldier_id in &squad.roster {
                if let Some(soldier) = self.soldiers.get_mut(*soldier_id) {
                    soldier.buffs.remove_source(source);
                }
            }
        }

        self.ai.on_action_finished(squad, action.target);

        debug!(squad = %id, action = %action.kind, "special action finished");
        self.log.push(LogEntry {
            tick: self.tick,
            kind: LogKind::ActionFinished {
                squad: id,
                action: action.kind,
            },
        });

        if let Some(previous) = action.previous_formation {
            self.change_formation(id, previous);
        }
    }

    fn cancel_action(&mut self, id: SquadId) {
        let active = self
            .squads
            .get(&id)
            .map_or(false, |s| s.actions.active.is_some());
        if active {
            self.finish_action(id);
        }
    }

    fn run_ai(&mut self) {
        let views: Vec<SquadView> = self
            .squads
            .values()
            .map(|s| SquadView::build(s, &self.soldiers))
            .collect();
        let requests = self.ai.run(self.tick, &mut self.squads, &views, &self.config);

        for request in requests {
            if let Err(reason) = self.start_action(request.squad, request.action, request.target) {
                debug!(squad = %request.squad, action = %request.action, reason, "AI action vetoed");
                if let Some(squad) = self.squads.get_mut(&request.squad) {
                    self.ai.on_action_vetoed(squad, request.target);
                }
            }
        }

        // A squad told to fall back abandons whatever action it was running
        let abandoning: Vec<SquadId> = self
            .squads
            .values()
            .filter(|s| s.tactic == Tactic::Retreat && s.actions.active.is_some())
            .map(|s| s.id)
            .collect();
        for id in abandoning {
            debug!(squad = %id, "retreat cancels special action");
            self.cancel_action(id);
        }
    }

    /// Advance special actions and anchors; produce steering inputs in id order
    fn move_squads(&mut self, dt: f32) -> Vec<SteeringInput> {
        let fixes: BTreeMap<SquadId, (TeamId, TargetFix, bool)> = self
            .squads
            .values()
            .map(|s| {
                let fix = TargetFix {
                    centroid: s.centroid(&self.soldiers),
                    heading: s.heading,
                };
                let available = !s.is_destroyed() && !s.living.is_empty();
                (s.id, (s.team, fix, available))
            })
            .collect();

        let ids: Vec<SquadId> = self.squads.keys().copied().collect();
        let mut inputs = Vec::with_capacity(self.soldiers.len());

        for id in ids {
            let Some(squad) = self.squads.get(&id) else {
                continue;
            };
            if squad.is_destroyed() || squad.living.is_empty() {
                continue;
            }
            let team = squad.team;
            let centroid = fixes.get(&id).map_or(squad.anchor, |(_, f, _)| f.centroid);
            let weapon_range = squad.category.base_stats().weapon_range;
            let target_fix = |target: SquadId| {
                fixes
                    .get(&target)
                    .filter(|(_, _, available)| *available)
                    .map(|(_, fix, _)| *fix)
            };
            let nearest_enemy = fixes
                .values()
                .filter(|(t, _, available)| *t != team && *available)
                .map(|(_, fix, _)| fix.centroid)
                .min_by_key(|c| OrderedFloat(c.distance_squared(&centroid)));

            // Special action step
            let mut directive = None;
            let mut finished = false;
            if let Some(squad) = self.squads.get_mut(&id) {
                if let Some(action) = squad.actions.active.as_mut() {
                    let ctx = ActionContext {
                        anchor: squad.anchor,
                        target: action.target.and_then(target_fix),
                        nearest_enemy,
                        weapon_range,
                    };
                    match special_actions::advance(action, &ctx, &self.config.actions, dt) {
                        ActionStep::Continue(d) => directive = Some(d),
                        ActionStep::Finished => finished = true,
                    }
                }
            }
            if finished {
                self.finish_action(id);
            }

            let steering = &self.config.steering;
            let Some(squad) = self.squads.get_mut(&id) else {
                continue;
            };

            let retreating = squad.tactic == Tactic::Retreat;
            let charging = squad.actions.active_kind() == Some(SpecialActionKind::Charge);
            let modifiers = squad.formation.modifiers();

            // Slowest soldier sets the squad's pace
            let pace = squad
                .living
                .iter()
                .filter_map(|sid| self.soldiers.get(*sid))
                .filter(|s| !s.is_routing())
                .map(|s| OrderedFloat(s.base_speed(self.config.fatigue.penalty_at_max)))
                .min()
                .map_or(squad.category.base_stats().speed, |s| s.0);
            let mut speed = pace * modifiers.speed_mult * self.terrain.speed_modifier(squad.anchor);
            if retreating {
                speed *= steering.retreat_speed_multiplier;
            }

            let stand_off = |target: Vec2, stop: f32, anchor: Vec2| {
                let offset = anchor - target;
                if offset.length() <= stop {
                    anchor
                } else {
                    target + offset.normalize() * stop
                }
            };
            let ranged = squad.category.base_stats().ranged;
            let engage_distance = if ranged {
                weapon_range * steering.ranged_stand_off
            } else {
                steering.melee_stop_distance
            };

            let mut face: Option<Vec2> = None;
            let goal = if squad.state == SquadState::Routing {
                centroid
            } else {
                match directive {
                    Some(Directive::Pursue { target }) | Some(Directive::Surround { target }) => {
                        match target_fix(target) {
                            Some(fix) => {
                                face = Some(fix.centroid);
                                stand_off(fix.centroid, engage_distance, squad.anchor)
                            }
                            None => squad.anchor,
                        }
                    }
                    Some(Directive::Reposition { waypoint }) => waypoint,
                    Some(Directive::Kite { away_from }) => match away_from {
                        Some(enemy) => {
                            face = Some(enemy);
                            let away = (squad.anchor - enemy).normalize();
                            enemy + away * (weapon_range * steering.ranged_stand_off)
                        }
                        None => {
                            face = nearest_enemy;
                            squad.anchor
                        }
                    },
                    Some(Directive::Brace) => {
                        face = nearest_enemy;
                        squad.anchor
                    }
                    None => match squad.tactic {
                        Tactic::Idle | Tactic::Hold | Tactic::Special { .. } => squad.anchor,
                        Tactic::MoveTo { destination } => destination,
                        Tactic::Advance { target } => match target_fix(target) {
                            Some(fix) => {
                                face = Some(fix.centroid);
                                stand_off(fix.centroid, engage_distance, squad.anchor)
                            }
                            None => squad.anchor,
                        },
                        Tactic::Retreat => squad.anchor + squad.retreat_direction() * (speed * dt * 2.0),
                    },
                }
            };

            // Anchor leads the squad, never by more than max_anchor_lead
            let previous_anchor = squad.anchor;
            let step = (goal - squad.anchor).clamp_length(speed * dt);
            let mut anchor = squad.anchor + step;
            if anchor.distance(&centroid) > steering.max_anchor_lead {
                anchor = centroid + (anchor - centroid).clamp_length(steering.max_anchor_lead);
            }
            if !self.terrain.is_passable(anchor) {
                anchor = previous_anchor;
            }
            squad.anchor = anchor;

            let desired_heading = match face {
                Some(point) if point.distance_squared(&anchor) > 1e-4 => Some((point - anchor).heading()),
                _ if step.length() > 1e-3 => Some(step.heading()),
                _ => None,
            };
            if let Some(desired) = desired_heading {
                squad.heading = turn_towards(squad.heading, desired, steering.squad_turn_rate * dt);
            }

            let mode = if retreating {
                MoveMode::Retreat
            } else if matches!(squad.tactic, Tactic::Hold)
                || matches!(directive, Some(Directive::Brace) | Some(Directive::Kite { .. }))
            {
                MoveMode::Hold
            } else {
                MoveMode::Formation
            };
            let orders = SquadOrders {
                squad: id,
                mode,
                heading: squad.heading,
                retreat_direction: squad.retreat_direction(),
                speed_multiplier: modifiers.speed_mult
                    * if retreating {
                        steering.retreat_speed_multiplier
                    } else {
                        1.0
                    },
                charging,
                focus: squad.tactic.target(),
            };

            let ring = match directive {
                Some(Directive::Surround { target }) => target_fix(target).map(|fix| {
                    let n = squad.living.len().max(1) as f32;
                    let radius = (self.config.formation.spacing * n / std::f32::consts::TAU)
                        .max(steering.melee_stop_distance * 2.0);
                    (fix.centroid, radius)
                }),
                _ => None,
            };

            let n = squad.living.len();
            for (i, soldier) in squad.living.iter().enumerate() {
                let slot = match ring {
                    Some((center, radius)) => {
                        let angle = std::f32::consts::TAU * i as f32 / n as f32;
                        center + Vec2::from_heading(angle) * radius
                    }
                    None => squad.formation.slot(i).local_to_world(squad.anchor, squad.heading),
                };
                inputs.push(SteeringInput {
                    soldier: *soldier,
                    slot,
                    orders,
                });
            }
        }

        inputs.sort_by_key(|input| input.soldier);
        inputs
    }

    fn steer(&mut self, inputs: &[SteeringInput], dt: f32) {
        let outputs = {
            let world = SteeringWorld {
                soldiers: &self.soldiers,
                index: &self.index,
                terrain: self.terrain.as_ref(),
                config: &self.config.steering,
                fatigue_penalty: self.config.fatigue.penalty_at_max,
                dt,
            };
            steer_all(&world, inputs, self.config.simulation.parallel_threshold)
        };

        for out in &outputs {
            if let Some(soldier) = self.soldiers.get_mut(out.soldier) {
                soldier.position = out.position;
                soldier.velocity = out.velocity;
                soldier.facing = out.facing;
                soldier.state = out.state;
                soldier.target = out.attack;
                soldier.attack_cooldown = out.attack_cooldown;
                soldier.moved = out.moved;
                self.index.update(soldier.id, soldier.team, soldier.position);
            }
        }

        // Overlap correction from the post-move positions, applied together
        let corrections = collision_corrections(&self.soldiers, &self.index, self.config.steering.body_radius);
        for (id, correction) in corrections {
            if let Some(soldier) = self.soldiers.get_mut(id) {
                let corrected = soldier.position + correction;
                if self.terrain.is_passable(corrected) {
                    soldier.position = corrected;
                    self.index.update(id, soldier.team, corrected);
                }
            }
        }

        // Routing or retreating soldiers that leave the field are gone for good
        let bounds = self.terrain.bounds();
        for soldier in self.soldiers.iter_mut() {
            if !soldier.is_present()
                || !matches!(soldier.state, SoldierState::Routing | SoldierState::Retreating)
                || bounds.contains(soldier.position)
            {
                continue;
            }
            soldier.escaped = true;
            soldier.target = None;
            self.index.remove(soldier.id);
            if let Some(squad) = self.squads.get_mut(&soldier.squad) {
                squad.escaped += 1;
            }
        }
    }

    /// Resolve declared attacks in attacker id order; returns the attack count
    fn resolve_combat(&mut self) -> usize {
        for squad in self.squads.values_mut() {
            squad.engaged = false;
        }
        self.last_attacks.clear();

        let declared: Vec<(SoldierId, SoldierId)> = self
            .soldiers
            .present()
            .filter(|s| s.state.is_offensive())
            .filter_map(|s| s.target.map(|t| (s.id, t)))
            .collect();

        let combat_cfg = &self.config.combat;
        let penalty = self.config.fatigue.penalty_at_max;
        let wavering = self.config.morale.wavering_threshold;
        let mut tallies: BTreeMap<SoldierId, DamageTally> = BTreeMap::new();
        let mut morale_hits: Vec<(SoldierId, MoraleEvent)> = Vec::new();
        let mut impacts: Vec<(SquadId, SquadId)> = Vec::new();
        let mut flanked_squads: BTreeSet<SquadId> = BTreeSet::new();
        let mut engagements: BTreeSet<(SquadId, SquadId)> = BTreeSet::new();

        for (attacker_id, defender_id) in declared {
            let (Some(attacker), Some(defender)) = (self.soldiers.get(attacker_id), self.soldiers.get(defender_id)) else {
                continue;
            };
            if !defender.is_present() || defender.team == attacker.team {
                continue;
            }
            let Some(defender_squad) = self.squads.get(&defender.squad) else {
                continue;
            };

            let att = Combatant::from_soldier(attacker, penalty, wavering);
            let def = Combatant::from_soldier(defender, penalty, wavering);
            let ctx = CombatContext {
                relative_angle: relative_angle(defender.position, defender.facing, attacker.position),
                distance: attacker.position.distance(&defender.position),
                terrain_modifier: self.terrain.combat_modifier(attacker.position, defender.position),
                defender_formation: defender_squad.formation.modifiers(),
                defender_disordered: defender.disordered,
                weather_ranged_penalty: self.terrain.ranged_hit_penalty(),
                charging: attacker.state == SoldierState::Charging,
            };
            let outcome = combat::resolve(&att, &def, &ctx, combat_cfg, &mut self.rng);

            self.last_attacks.push(AttackRecord {
                attacker: attacker_id,
                attacker_squad: attacker.squad,
                defender: defender_id,
                defender_squad: defender.squad,
                hit: outcome.hit,
                damage: outcome.damage,
            });
            engagements.insert((attacker.squad, defender.squad));

            if outcome.hit {
                let tally = tallies.entry(defender_id).or_default();
                tally.total += outcome.damage;
                *tally.by_attacker.entry(attacker_id).or_insert(0.0) += outcome.damage;

                if outcome.angle.is_flanking() {
                    morale_hits.push((defender_id, MoraleEvent::FlankedHit));
                    flanked_squads.insert(defender.squad);
                }
                if outcome.damage > defender.max_health * combat_cfg.heavy_damage_fraction {
                    morale_hits.push((defender_id, MoraleEvent::HeavyDamage));
                }
                let first_charge_hit = ctx.charging
                    && self.squads.get(&attacker.squad).map_or(false, |s| {
                        s.actions
                            .active
                            .as_ref()
                            .map_or(false, |a| a.kind == SpecialActionKind::Charge && !a.impact_delivered)
                    })
                    && !impacts.iter().any(|(squad, _)| *squad == attacker.squad);
                if first_charge_hit {
                    impacts.push((attacker.squad, defender.squad));
                }
            }

            if let Some(attacker) = self.soldiers.get_mut(attacker_id) {
                attacker.attacks += 1;
            }
        }

        for (a, b) in &engagements {
            for id in [a, b] {
                if let Some(squad) = self.squads.get_mut(id) {
                    squad.engaged = true;
                }
            }
            let pair = if a < b { (*a, *b) } else { (*b, *a) };
            if self.engaged_pairs.insert(pair) {
                self.log.push(LogEntry {
                    tick: self.tick,
                    kind: LogKind::Engagement { squad: *a, enemy: *b },
                });
            }
        }
        let flank_seconds = self.config.morale.flank_pressure_seconds;
        for id in flanked_squads {
            if let Some(squad) = self.squads.get_mut(&id) {
                squad.flanked_timer = flank_seconds;
            }
        }

        // Damage lands all at once
        let mut deaths: Vec<(SoldierId, TeamId, Vec2)> = Vec::new();
        let mut killers: Vec<SoldierId> = Vec::new();
        for (defender_id, tally) in &tallies {
            let Some(defender) = self.soldiers.get_mut(*defender_id) else {
                continue;
            };
            defender.health -= tally.total;
            if defender.health > 0.0 {
                continue;
            }
            defender.kill();
            deaths.push((*defender_id, defender.team, defender.position));
            let killer = tally
                .by_attacker
                .iter()
                .max_by_key(|(id, damage)| (OrderedFloat(**damage), Reverse(**id)))
                .map(|(id, _)| *id);
            if let Some(killer) = killer {
                killers.push(killer);
            }
        }
        for killer in &killers {
            if let Some(soldier) = self.soldiers.get_mut(*killer) {
                soldier.kills += 1;
                let squad = soldier.squad;
                if let Some(squad) = self.squads.get_mut(&squad) {
                    squad.kills += 1;
                }
            }
            morale_hits.push((*killer, MoraleEvent::EnemyKilled));
        }

        let death_radius = self.config.morale.ally_death_radius;
        for (dead, team, position) in &deaths {
            for entry in self.index.query_radius_entries(*position, death_radius) {
                if entry.id != *dead && entry.team == *team {
                    morale_hits.push((entry.id, MoraleEvent::AllyDeathNearby));
                }
            }
        }

        for (id, event) in morale_hits {
            self.apply_morale(id, event, event.magnitude(self.morale.config()));
        }

        for (attacker_squad, defender_squad) in impacts {
            self.deliver_charge_shock(attacker_squad, defender_squad);
        }

        self.last_attacks.len()
    }

    /// One-shot shock to the whole squad hit by a charge
    fn deliver_charge_shock(&mut self, attacker_squad: SquadId, defender_squad: SquadId) {
        let Some(attacker) = self.squads.get_mut(&attacker_squad) else {
            return;
        };
        if let Some(action) = attacker.actions.active.as_mut() {
            action.impact_delivered = true;
        }
        let attacker_centroid = attacker.centroid(&self.soldiers);

        let Some(defender) = self.squads.get(&defender_squad) else {
            return;
        };
        let approach = Vec2::from_heading(defender.heading)
            .angle_between(&(attacker_centroid - defender.centroid(&self.soldiers)));
        let morale_cfg = self.morale.config();
        let mut shock = morale_cfg.charge_shock;
        if approach > self.config.combat.flank_arc {
            shock *= morale_cfg.rear_shock_multiplier;
        }
        debug!(attacker = %attacker_squad, defender = %defender_squad, shock, "charge impact");

        let victims = defender.living.clone();
        for id in victims {
            self.apply_morale(id, MoraleEvent::ChargedInto, shock);
        }
    }

    fn apply_morale(&mut self, id: SoldierId, event: MoraleEvent, magnitude: f32) {
        let Some(soldier) = self.soldiers.get_mut(id) else {
            return;
        };
        if self.morale.apply_event(soldier, event, magnitude) == MoraleTransition::Routed {
            let notice = RoutNotice {
                squad: soldier.squad,
                team: soldier.team,
                position: soldier.position,
            };
            self.morale.queue_rout(notice);
        }
    }

    fn update_morale(&mut self, contagion: &[RoutNotice], dt: f32) {
        let morale_cfg = self.morale.config().clone();

        for notice in contagion {
            let radius = morale_cfg.contagion_radius.max(morale_cfg.enemy_routed_radius);
            for entry in self.index.query_radius_entries(notice.position, radius) {
                let distance = entry.position.distance(&notice.position);
                if entry.team == notice.team {
                    if distance <= morale_cfg.contagion_radius {
                        self.apply_morale(entry.id, MoraleEvent::AllyRouted, morale_cfg.ally_routed);
                    }
                } else if distance <= morale_cfg.enemy_routed_radius {
                    self.apply_morale(entry.id, MoraleEvent::EnemyRoutedNearby, morale_cfg.enemy_routed);
                }
            }
        }

        // Sustained pressure on squads recently hit in the flank or rear
        let pressured: Vec<SoldierId> = self
            .squads
            .values_mut()
            .filter(|s| s.flanked_timer > 0.0)
            .flat_map(|s| {
                s.flanked_timer = (s.flanked_timer - dt).max(0.0);
                s.living.clone()
            })
            .collect();
        for id in pressured {
            self.apply_morale(id, MoraleEvent::UnderFlankAttack, morale_cfg.flank_pressure_per_sec * dt);
        }

        let engage_radius = self.config.steering.engage_radius;
        let mut routed = Vec::new();
        for soldier in self.soldiers.iter_mut() {
            if !soldier.is_present() {
                continue;
            }
            let ctx = MoraleTick {
                enemy_within_engage: self
                    .index
                    .query_nearest_enemy(soldier.position, soldier.team, engage_radius)
                    .is_some(),
                in_combat: soldier.state.is_fighting(),
                general_present: self.squads.get(&soldier.squad).map_or(false, |s| s.has_general),
            };
            if self.morale.tick(soldier, &ctx, dt) == MoraleTransition::Routed {
                routed.push(RoutNotice {
                    squad: soldier.squad,
                    team: soldier.team,
                    position: soldier.position,
                });
            }
            soldier.buffs.decay(dt);
        }
        for notice in routed {
            self.morale.queue_rout(notice);
        }

        for squad in self.squads.values_mut() {
            squad.actions.tick_cooldowns(dt);
        }
    }

    fn update_formations(&mut self, dt: f32) {
        let formation_cfg = &self.config.formation;
        for squad in self.squads.values_mut() {
            if squad.is_destroyed() {
                continue;
            }
            let soldiers = &self.soldiers;
            squad
                .living
                .retain(|id| soldiers.get(*id).map_or(false, |s| s.is_present()));

            squad.formation.reconcile(squad.living.len(), formation_cfg);
            squad.formation.transition(dt);

            let disordered = squad.formation.is_transitioning();
            for id in &squad.living {
                if let Some(soldier) = self.soldiers.get_mut(*id) {
                    soldier.disordered = disordered;
                }
            }
        }
    }

    fn update_squads(&mut self) {
        let gone: Vec<SoldierId> = self
            .soldiers
            .iter()
            .filter(|s| !s.is_present() && self.index.contains(s.id))
            .map(|s| s.id)
            .collect();
        for id in gone {
            self.index.remove(id);
        }

        let rout_fraction = self.config.morale.squad_rout_fraction;
        let ids: Vec<SquadId> = self.squads.keys().copied().collect();
        for id in ids {
            let Some(squad) = self.squads.get(&id) else {
                continue;
            };
            if squad.is_destroyed() {
                continue;
            }
            let previous = squad.state;

            if squad.living.is_empty() {
                let fled = squad.escaped as usize * 2 >= squad.starting_count;
                if let Some(squad) = self.squads.get_mut(&id) {
                    squad.actions.active = None;
                    squad.state = SquadState::Destroyed;
                    self.ai.clear_tactic(squad);
                }
                debug!(squad = %id, fled, "squad retired");
                self.log.push(LogEntry {
                    tick: self.tick,
                    kind: if fled {
                        LogKind::SquadFled { squad: id }
                    } else {
                        LogKind::SquadDestroyed { squad: id }
                    },
                });
                continue;
            }

            if squad.routing_fraction(&self.soldiers) >= rout_fraction {
                if previous != SquadState::Routing {
                    debug!(squad = %id, "squad routed");
                    self.log.push(LogEntry {
                        tick: self.tick,
                        kind: LogKind::SquadRouted { squad: id },
                    });
                    self.cancel_action(id);
                    if let Some(squad) = self.squads.get_mut(&id) {
                        squad.state = SquadState::Routing;
                    }
                    let members = self.squads.get(&id).map(|s| s.living.clone()).unwrap_or_default();
                    for member in members {
                        self.apply_morale(member, MoraleEvent::SquadBroken, self.morale.config().squad_broken);
                    }
                }
                continue;
            }

            if previous == SquadState::Routing {
                debug!(squad = %id, "squad rallied");
                self.log.push(LogEntry {
                    tick: self.tick,
                    kind: LogKind::SquadRallied { squad: id },
                });
                // Rallied squads regroup where they stand
                if let Some(squad) = self.squads.get_mut(&id) {
                    squad.anchor = squad.centroid(&self.soldiers);
                }
            }

            if let Some(squad) = self.squads.get_mut(&id) {
                squad.state = match squad.tactic {
                    Tactic::Retreat => SquadState::Retreating,
                    _ if squad.engaged => SquadState::Engaging,
                    Tactic::MoveTo { .. } | Tactic::Advance { .. } | Tactic::Special { .. } => SquadState::Advancing,
                    Tactic::Idle | Tactic::Hold => SquadState::Idle,
                };
            }
        }
    }

    fn finish_tick(&mut self) {
        let mut fighting: BTreeSet<TeamId> = BTreeSet::new();
        for squad in self.squads.values() {
            if squad.is_active() {
                fighting.insert(squad.team);
            }
        }

        let outcome = match fighting.len() {
            0 => Some(Outcome::Draw),
            1 => fighting.iter().next().map(|winner| Outcome::Victory { winner: *winner }),
            _ if self.tick >= self.tick_ceiling => Some(Outcome::Timeout),
            _ => None,
        };

        let interval = self.config.simulation.snapshot_interval.max(1);
        if self.tick % interval == 0 || outcome.is_some() {
            let snapshot = self.snapshot(None);
            self.events.push(OutboundEvent::State { snapshot });
        }

        if let Some(outcome) = outcome {
            self.log.push(LogEntry {
                tick: self.tick,
                kind: LogKind::BattleEnded { outcome },
            });
            let result = self.build_result(outcome);
            info!(battle = %self.battle_id, ticks = self.tick, ?outcome, "battle ended");
            self.events.push(OutboundEvent::Ended {
                result: result.clone(),
            });
            self.result = Some(result);
        }
    }

    fn build_result(&self, outcome: Outcome) -> BattleResult {
        let squads = self
            .squads
            .values()
            .map(|squad| SquadResult {
                squad: squad.id,
                team: squad.team,
                starting: squad.starting_count,
                surviving: squad.living.len() + squad.escaped as usize,
                escaped: squad.escaped as usize,
                kills: squad.kills,
                average_morale: squad.average_morale(&self.soldiers),
                final_state: squad.state,
            })
            .collect();
        BattleResult {
            battle_id: self.battle_id,
            outcome,
            ticks: self.tick,
            squads,
            log: self.log.clone(),
        }
    }
}

fn entry_of(soldier: &Soldier) -> QuadEntry {
    QuadEntry {
        id: soldier.id,
        team: soldier.team,
        position: soldier.position,
    }
}
