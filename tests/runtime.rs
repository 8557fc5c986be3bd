//! Async battle host tests

use std::f32::consts::PI;
use std::time::Duration;

use tactica::battle::{BattleInit, BattleState, Command, CommandKind, Controller, OutboundEvent, SideInit, SquadInit};
use tactica::core::types::{SquadId, TeamId, Vec2};
use tactica::core::{BattleConfig, CommandError};
use tactica::runtime::spawn_battle;

fn small_battle(ceiling: u64) -> BattleState {
    let init = BattleInit::new(
        17,
        vec![
            SideInit::new(
                0,
                vec![SquadInit::new(1, "infantry", 20, Vec2::new(0.0, -6.0), 0.0).with_controller(Controller::Player)],
            ),
            SideInit::new(1, vec![SquadInit::new(2, "infantry", 20, Vec2::new(0.0, 6.0), PI)]),
        ],
    )
    .with_tick_ceiling(ceiling);
    BattleState::new(&init, BattleConfig::default()).unwrap()
}

#[tokio::test]
async fn test_host_runs_to_result() {
    let handle = spawn_battle(small_battle(200), Duration::ZERO);
    let result = handle.finish().await.expect("battle should produce a result");
    assert!(result.ticks <= 200);
}

#[tokio::test]
async fn test_submit_reports_validation() {
    let handle = spawn_battle(small_battle(5_000), Duration::from_millis(1));

    let accepted = handle
        .submit(Command::new(
            TeamId(0),
            0,
            CommandKind::Attack {
                squad: SquadId(1),
                target: SquadId(2),
            },
        ))
        .await;
    assert_eq!(accepted, Ok(()));

    let rejected = handle
        .submit(Command::new(TeamId(1), 0, CommandKind::Hold { squad: SquadId(1) }))
        .await;
    assert_eq!(
        rejected,
        Err(CommandError::NotOwner {
            squad: SquadId(1),
            team: TeamId(1),
        })
    );
}

#[tokio::test]
async fn test_joined_snapshot_then_state_stream() {
    let handle = spawn_battle(small_battle(400), Duration::ZERO);
    let mut events = handle.join().await;

    let mut joined = false;
    let mut states = 0;
    let mut ended = false;
    while let Ok(event) = events.recv().await {
        match event {
            OutboundEvent::Joined { snapshot } => {
                assert_eq!(snapshot.squads.len(), 2);
                joined = true;
            }
            OutboundEvent::State { .. } => states += 1,
            OutboundEvent::Ended { .. } => {
                ended = true;
                break;
            }
            OutboundEvent::Error { .. } => {}
        }
    }

    assert!(joined);
    assert!(states > 0);
    assert!(ended);
    assert!(handle.finish().await.is_some());
}
