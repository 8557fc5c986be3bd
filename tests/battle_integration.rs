//! Battle system integration tests

use std::f32::consts::PI;

use tactica::battle::*;
use tactica::core::types::{Rect, SquadId, TeamId, Vec2};
use tactica::core::{BattleConfig, BattleError, CommandError};

fn two_squads(seed: u64, a: SquadInit, b: SquadInit) -> BattleInit {
    BattleInit::new(seed, vec![SideInit::new(0, vec![a]), SideInit::new(1, vec![b])])
}

fn order(state: &mut BattleState, team: u8, kind: CommandKind) {
    let timestamp = state.current_tick();
    state
        .submit(Command::new(TeamId(team), timestamp, kind))
        .expect("command should be accepted");
}

/// Every soldier is exactly one of: present, escaped, dead
fn assert_conserved(state: &BattleState) {
    for squad in state.squads() {
        let mut present = 0;
        let mut escaped = 0;
        let mut dead = 0;
        for id in &squad.roster {
            let soldier = state.soldier(*id).expect("roster ids exist");
            assert_eq!(soldier.squad, squad.id);
            if !soldier.is_alive() {
                dead += 1;
            } else if soldier.escaped {
                escaped += 1;
            } else {
                present += 1;
            }
        }
        assert_eq!(present + escaped + dead, squad.starting_count, "{}", squad.id);
        assert_eq!(present, squad.living.len(), "{}", squad.id);
        assert_eq!(escaped, squad.escaped as usize, "{}", squad.id);
        if !squad.is_destroyed() {
            assert_eq!(squad.formation.slots.len(), squad.living.len(), "{}", squad.id);
        }
    }
}

// Scenario 1: evenly matched infantry meeting head-on
#[test]
fn test_mirror_infantry_is_near_draw() {
    let mut total_gap = 0.0;
    let seeds = [11, 12, 13];

    for seed in seeds {
        let init = two_squads(
            seed,
            SquadInit::new(1, "infantry", 100, Vec2::new(0.0, -12.0), 0.0).with_controller(Controller::Player),
            SquadInit::new(2, "infantry", 100, Vec2::new(0.0, 12.0), PI).with_controller(Controller::Player),
        )
        .with_tick_ceiling(3000);
        let mut state = BattleState::new(&init, BattleConfig::default()).unwrap();
        order(&mut state, 0, CommandKind::Attack { squad: SquadId(1), target: SquadId(2) });
        order(&mut state, 1, CommandKind::Attack { squad: SquadId(2), target: SquadId(1) });

        let result = state.run_to_completion();
        let a = result.team_casualties(TeamId(0)) as f32;
        let b = result.team_casualties(TeamId(1)) as f32;
        assert!(a + b > 0.0, "seed {seed}: no one fought");
        total_gap += (a - b).abs() / 100.0;
    }

    let mean_gap = total_gap / seeds.len() as f32;
    assert!(mean_gap <= 0.25, "mean casualty gap {mean_gap}");
}

// Scenario 2: cavalry charging into an unengaged rear
#[test]
fn test_rear_charge_routs_infantry() {
    let init = two_squads(
        5,
        SquadInit::new(1, "infantry", 100, Vec2::new(0.0, 0.0), 0.0)
            .with_controller(Controller::Player)
            .with_morale(30.0)
            .with_training(0.0),
        // Behind the infantry, facing the same way
        SquadInit::new(2, "cavalry", 50, Vec2::new(0.0, -25.0), 0.0).with_controller(Controller::Player),
    )
    .with_tick_ceiling(600);
    let mut state = BattleState::new(&init, BattleConfig::default()).unwrap();
    order(
        &mut state,
        1,
        CommandKind::SpecialAction {
            squad: SquadId(2),
            action: SpecialActionKind::Charge,
            target: Some(SquadId(1)),
        },
    );

    let mut routed = false;
    for _ in 0..600 {
        state.tick();
        let infantry = state.squad(SquadId(1)).unwrap();
        if infantry.state == SquadState::Routing || infantry.is_destroyed() {
            routed = true;
            break;
        }
        if state.is_finished() {
            break;
        }
    }

    assert!(routed, "infantry never broke");
    let cavalry = state.squad(SquadId(2)).unwrap();
    assert!(
        cavalry.living.len() >= 45,
        "cavalry lost {} before the rout",
        50 - cavalry.living.len()
    );
    assert!(state
        .log()
        .iter()
        .any(|e| matches!(e.kind, LogKind::SquadRouted { squad } if squad == SquadId(1))));
}

// Scenario 3: retreat order overrides the AI mid-fight
#[test]
fn test_retreat_order_takes_effect_next_tick() {
    let init = two_squads(
        9,
        SquadInit::new(1, "infantry", 30, Vec2::new(0.0, -3.0), 0.0).with_profile("aggressive"),
        SquadInit::new(2, "infantry", 30, Vec2::new(0.0, 3.0), PI).with_controller(Controller::Player),
    );
    let mut state = BattleState::new(&init, BattleConfig::default()).unwrap();
    order(&mut state, 1, CommandKind::Attack { squad: SquadId(2), target: SquadId(1) });

    let mut engaged = false;
    for _ in 0..200 {
        state.tick();
        if state.squad(SquadId(1)).unwrap().engaged {
            engaged = true;
            break;
        }
    }
    assert!(engaged, "squads never made contact");

    order(&mut state, 0, CommandKind::Retreat { squad: SquadId(1) });
    for _ in 0..20 {
        state.tick();
        let squad = state.squad(SquadId(1)).unwrap();
        if squad.is_destroyed() {
            break;
        }
        assert_eq!(squad.tactic, Tactic::Retreat);
        assert!(
            state.last_tick_attacks().iter().all(|a| a.attacker_squad != SquadId(1)),
            "retreating squad attacked at tick {}",
            state.current_tick()
        );
        if state.is_finished() {
            break;
        }
    }
}

// Scenario 4: line to square keeps every slot and disorders the squad
#[test]
fn test_line_to_square_disorders_until_settled() {
    let init = two_squads(
        3,
        SquadInit::new(1, "infantry", 60, Vec2::new(0.0, -100.0), 0.0).with_controller(Controller::Player),
        SquadInit::new(2, "infantry", 10, Vec2::new(0.0, 120.0), PI).with_controller(Controller::Player),
    );
    let mut state = BattleState::new(&init, BattleConfig::default()).unwrap();
    let first = state.squad(SquadId(1)).unwrap().living[0];
    let baseline = state.soldier_defense(first).unwrap();

    order(
        &mut state,
        0,
        CommandKind::SetFormation {
            squad: SquadId(1),
            formation: FormationType::Square,
        },
    );
    state.tick();

    let squad = state.squad(SquadId(1)).unwrap();
    assert_eq!(squad.formation.kind, FormationType::Square);
    assert_eq!(state.formation_slot_count(SquadId(1)), Some(60));
    for id in &squad.living {
        assert!(state.soldier(*id).unwrap().disordered);
    }
    assert!(state.soldier_defense(first).unwrap() <= baseline * 0.6);

    for _ in 0..50 {
        state.tick();
        assert_eq!(state.formation_slot_count(SquadId(1)), Some(60));
    }

    let squad = state.squad(SquadId(1)).unwrap();
    assert!(!squad.formation.is_transitioning());
    for id in &squad.living {
        assert!(!state.soldier(*id).unwrap().disordered);
    }
    assert!(state.soldier_defense(first).unwrap() >= baseline * 0.95);
}

fn melee(seed: u64) -> BattleInit {
    BattleInit::new(
        seed,
        vec![
            SideInit::new(
                0,
                vec![
                    SquadInit::new(1, "infantry", 40, Vec2::new(-10.0, -20.0), 0.0),
                    SquadInit::new(2, "archers", 20, Vec2::new(0.0, -40.0), 0.0).with_profile("cautious"),
                ],
            ),
            SideInit::new(
                1,
                vec![
                    SquadInit::new(11, "infantry", 40, Vec2::new(10.0, 20.0), PI),
                    SquadInit::new(12, "cavalry", 15, Vec2::new(30.0, 30.0), PI).with_profile("aggressive"),
                ],
            ),
        ],
    )
    .with_tick_ceiling(800)
}

#[test]
fn test_same_seed_same_battle() {
    let mut a = BattleState::new(&melee(77), BattleConfig::default()).unwrap();
    let mut b = BattleState::new(&melee(77), BattleConfig::default()).unwrap();

    for _ in 0..300 {
        a.tick();
        b.tick();
        assert_eq!(a.last_tick_attacks(), b.last_tick_attacks());
    }
    assert_eq!(a.snapshot(None), b.snapshot(None));

    let ra = a.run_to_completion();
    let rb = b.run_to_completion();
    assert_eq!(ra, rb);
}

#[test]
fn test_parallel_steering_matches_serial() {
    let mut serial_config = BattleConfig::default();
    serial_config.simulation.parallel_threshold = usize::MAX;
    let mut parallel_config = BattleConfig::default();
    parallel_config.simulation.parallel_threshold = 1;

    let mut serial = BattleState::new(&melee(5), serial_config).unwrap();
    let mut parallel = BattleState::new(&melee(5), parallel_config).unwrap();
    for _ in 0..150 {
        serial.tick();
        parallel.tick();
    }
    assert_eq!(serial.snapshot(None), parallel.snapshot(None));
}

#[test]
fn test_soldiers_are_conserved() {
    let mut state = BattleState::new(&melee(21), BattleConfig::default()).unwrap();
    let total = state.soldiers().len();
    assert_conserved(&state);

    while !state.is_finished() {
        state.tick();
        assert_conserved(&state);
        assert_eq!(state.soldiers().len(), total);
    }

    let result = state.result().unwrap();
    for squad in &result.squads {
        assert!(squad.surviving <= squad.starting);
        assert!(squad.escaped <= squad.surviving);
    }
}

#[test]
fn test_damage_never_exceeds_health_pool() {
    let mut state = BattleState::new(&melee(8), BattleConfig::default()).unwrap();
    for _ in 0..400 {
        state.tick();
        for attack in state.last_tick_attacks() {
            assert!(attack.damage >= 0.0);
            if !attack.hit {
                assert_eq!(attack.damage, 0.0);
            }
        }
        for soldier in state.soldiers().as_slice() {
            assert!(soldier.health <= soldier.max_health);
            assert!((0.0..=100.0).contains(&soldier.morale));
        }
        if state.is_finished() {
            break;
        }
    }
}

#[test]
fn test_battle_ends_with_result_event() {
    let mut state = BattleState::new(&melee(3), BattleConfig::default()).unwrap();
    let result = state.run_to_completion();
    assert!(result.ticks <= 800);
    assert!(matches!(result.log.first().map(|e| &e.kind), Some(LogKind::BattleStarted { .. })));
    assert!(matches!(result.log.last().map(|e| &e.kind), Some(LogKind::BattleEnded { .. })));

    let events = state.drain_events();
    assert!(events.iter().any(|e| matches!(e, OutboundEvent::Ended { .. })));
    let states = events.iter().filter(|e| e.type_name() == "state").count();
    assert!(states as u64 >= result.ticks / 5);

    assert_eq!(
        state.submit(Command::new(TeamId(0), 0, CommandKind::Hold { squad: SquadId(1) })),
        Err(CommandError::BattleFinished)
    );
}

#[test]
fn test_command_validation() {
    let mut state = BattleState::new(&melee(1), BattleConfig::default()).unwrap();

    let cases = [
        (0, CommandKind::Hold { squad: SquadId(99) }, "unknown_squad"),
        (1, CommandKind::Hold { squad: SquadId(1) }, "not_owner"),
        (0, CommandKind::Attack { squad: SquadId(1), target: SquadId(2) }, "friendly_target"),
        (0, CommandKind::Attack { squad: SquadId(1), target: SquadId(50) }, "unknown_target"),
        (
            0,
            CommandKind::SpecialAction {
                squad: SquadId(1),
                action: SpecialActionKind::Charge,
                target: None,
            },
            "missing_target",
        ),
    ];
    let expected = cases.len();
    for (team, kind, code) in cases {
        let err = state.submit(Command::new(TeamId(team), 0, kind)).unwrap_err();
        assert_eq!(err.code(), code);
    }

    let errors = state
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, OutboundEvent::Error { .. }))
        .count();
    assert_eq!(errors, expected);

    // Rejections never touch the simulation
    assert_eq!(state.current_tick(), 0);
    assert_eq!(state.squad(SquadId(1)).unwrap().intent, Intent::None);
}

#[test]
fn test_malformed_init_is_rejected() {
    let config = BattleConfig::default();

    let mut init = melee(1);
    init.sides[1].squads[0].category = "dragons".into();
    assert!(matches!(
        BattleState::new(&init, config.clone()),
        Err(BattleError::UnknownCategory(_))
    ));

    let mut init = melee(1);
    init.sides[1].squads[0].id = SquadId(1);
    assert!(matches!(
        BattleState::new(&init, config.clone()),
        Err(BattleError::DuplicateSquad(_))
    ));

    let mut init = melee(1);
    init.sides[0].squads[0].crew = 0;
    assert!(matches!(BattleState::new(&init, config.clone()), Err(BattleError::EmptySquad(_))));

    let mut init = melee(1);
    init.sides[0].squads[0].morale = 140.0;
    assert!(matches!(
        BattleState::new(&init, config.clone()),
        Err(BattleError::OutOfRange { .. })
    ));

    let mut init = melee(1);
    let deploy = init.sides[0].squads[0].position;
    init.terrain.impassable.push(Rect::new(
        Vec2::new(deploy.x - 5.0, deploy.z - 5.0),
        Vec2::new(deploy.x + 5.0, deploy.z + 5.0),
    ));
    assert!(matches!(
        BattleState::new(&init, config.clone()),
        Err(BattleError::ImpassableDeployment { .. })
    ));

    let mut bad = config;
    bad.morale.rally_threshold = 10.0;
    assert!(matches!(BattleState::new(&melee(1), bad), Err(BattleError::InvalidConfig(_))));
}

#[test]
fn test_snapshot_view_limits_soldier_rows() {
    let mut state = BattleState::new(&melee(4), BattleConfig::default()).unwrap();
    let everything = state.snapshot(None);
    assert_eq!(everything.squads.len(), 4);
    assert_eq!(everything.soldiers.len(), state.living_count());

    // Only the southern half: team 0's squads
    let south = Rect::new(Vec2::new(-150.0, -150.0), Vec2::new(150.0, 0.0));
    let partial = state.snapshot(Some(south));
    assert_eq!(partial.squads.len(), 4);
    assert!(partial.soldiers.iter().all(|s| s.squad == SquadId(1) || s.squad == SquadId(2)));
    assert!(partial.soldiers.windows(2).all(|w| w[0].id < w[1].id));

    let joined = state.join(None);
    assert_eq!(joined, everything);
    assert!(matches!(state.drain_events().as_slice(), [OutboundEvent::Joined { .. }]));
}

#[test]
fn test_move_and_hold_commands() {
    let init = two_squads(
        2,
        SquadInit::new(1, "infantry", 20, Vec2::new(0.0, -100.0), 0.0).with_controller(Controller::Player),
        SquadInit::new(2, "infantry", 20, Vec2::new(0.0, 120.0), PI).with_controller(Controller::Player),
    );
    let mut state = BattleState::new(&init, BattleConfig::default()).unwrap();
    let destination = Vec2::new(30.0, -100.0);
    order(&mut state, 0, CommandKind::Move { squad: SquadId(1), destination });

    for _ in 0..200 {
        state.tick();
    }
    let squad = state.squad(SquadId(1)).unwrap();
    assert!(squad.centroid(state.soldiers()).distance(&destination) < 4.0);

    order(&mut state, 0, CommandKind::Hold { squad: SquadId(1) });
    state.tick();
    let anchor = state.squad(SquadId(1)).unwrap().anchor;
    for _ in 0..20 {
        state.tick();
    }
    let squad = state.squad(SquadId(1)).unwrap();
    assert_eq!(squad.tactic, Tactic::Hold);
    assert!(squad.anchor.distance(&anchor) < 1e-3);
}

#[test]
fn test_defensive_formation_braces_and_restores() {
    let init = two_squads(
        6,
        SquadInit::new(1, "infantry", 20, Vec2::new(0.0, -100.0), 0.0).with_controller(Controller::Player),
        SquadInit::new(2, "infantry", 20, Vec2::new(0.0, 120.0), PI).with_controller(Controller::Player),
    );
    let mut state = BattleState::new(&init, BattleConfig::default()).unwrap();
    order(
        &mut state,
        0,
        CommandKind::SpecialAction {
            squad: SquadId(1),
            action: SpecialActionKind::DefensiveFormation,
            target: None,
        },
    );
    state.tick();
    let squad = state.squad(SquadId(1)).unwrap();
    assert_eq!(squad.formation.kind, FormationType::ShieldWall);
    assert_eq!(squad.actions.active_kind(), Some(SpecialActionKind::DefensiveFormation));
    let soldier = state.soldier(squad.living[0]).unwrap();
    assert!(soldier.buffs.has_source(BuffSource::Brace));

    let ticks = state.config().seconds_to_ticks(state.config().actions.defensive_duration);
    for _ in 0..ticks + 2 {
        state.tick();
    }
    let squad = state.squad(SquadId(1)).unwrap();
    assert!(squad.actions.active.is_none());
    assert_eq!(squad.formation.kind, FormationType::Line);
    assert!(!squad.actions.is_ready(SpecialActionKind::DefensiveFormation));
    let soldier = state.soldier(squad.living[0]).unwrap();
    assert!(!soldier.buffs.has_source(BuffSource::Brace));
}
