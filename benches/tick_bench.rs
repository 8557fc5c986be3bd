use std::f32::consts::PI;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use tactica::battle::{BattleInit, BattleState, SideInit, SquadInit};
use tactica::core::types::Vec2;
use tactica::core::BattleConfig;

/// Two armies of `squads` infantry squads each, lined up facing one another
fn battle(squads: u32, crew: u32) -> BattleState {
    let side = |team: u8, z: f32, heading: f32| {
        let squads = (0..squads)
            .map(|i| {
                let x = (i as f32 - squads as f32 / 2.0) * 28.0;
                SquadInit::new(team as u32 * 100 + i + 1, "infantry", crew, Vec2::new(x, z), heading)
            })
            .collect();
        SideInit::new(team, squads)
    };
    let mut init = BattleInit::new(7, vec![side(0, -15.0, 0.0), side(1, 15.0, PI)]);
    init.field.half_width = 200.0;
    BattleState::new(&init, BattleConfig::default()).expect("bench battle is valid")
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for squads in [2u32, 4, 8] {
        let soldiers = squads * 2 * 60;
        group.bench_with_input(BenchmarkId::new("soldiers", soldiers), &squads, |b, &squads| {
            b.iter_batched(
                || {
                    let mut state = battle(squads, 60);
                    // Past the approach so the bench measures contact
                    for _ in 0..50 {
                        state.tick();
                    }
                    state
                },
                |mut state| {
                    for _ in 0..10 {
                        state.tick();
                    }
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(tick_benches, bench_tick);
criterion_main!(tick_benches);
