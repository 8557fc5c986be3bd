//! Headless Battle Runner
//!
//! Runs a battle from an init file or a built-in scenario and prints the
//! result as JSON or a text recap.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tactica::battle::{BattleInit, BattleResult, BattleState, Controller, SideInit, SquadInit};
use tactica::core::error::{BattleError, Result};
use tactica::core::types::Vec2;
use tactica::core::BattleConfig;
use tactica::runtime::spawn_battle;
use tracing_subscriber::EnvFilter;

/// Headless Battle Runner - AI vs AI battles from an init record
#[derive(Parser, Debug)]
#[command(name = "battle_runner")]
#[command(about = "Run a tactical battle headless and print the result")]
struct Args {
    /// Battle init JSON (see data/scenarios/)
    #[arg(long)]
    init: Option<PathBuf>,

    /// Built-in scenario when no init file is given: skirmish, cavalry_charge, archer_screen
    #[arg(long, default_value = "skirmish")]
    scenario: String,

    /// Battle configuration TOML
    #[arg(long, default_value = "data/battle/default.toml")]
    config: PathBuf,

    /// Override the init record's seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the tick ceiling
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Pace ticks in real time on the async host (milliseconds per tick)
    #[arg(long)]
    realtime_ms: Option<u64>,

    /// Output format: json or text
    #[arg(long, default_value = "json")]
    format: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tactica=info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = if args.config.exists() {
        BattleConfig::load(&args.config)?
    } else {
        tracing::warn!(path = %args.config.display(), "config file not found, using defaults");
        BattleConfig::default()
    };

    let mut init = match &args.init {
        Some(path) => BattleInit::load(path)?,
        None => builtin_scenario(&args.scenario)?,
    };
    if let Some(seed) = args.seed {
        init.seed = seed;
    }
    if let Some(ticks) = args.max_ticks {
        init.tick_ceiling = Some(ticks);
    }

    let state = BattleState::new(&init, config)?;
    let result = match args.realtime_ms {
        Some(ms) => run_paced(state, Duration::from_millis(ms))?,
        None => {
            let mut state = state;
            state.run_to_completion()
        }
    };

    match args.format.as_str() {
        "text" => {
            for line in result.recap() {
                println!("{line}");
            }
        }
        _ => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}

fn run_paced(state: BattleState, tick_interval: Duration) -> Result<BattleResult> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let handle = spawn_battle(state, tick_interval);
        handle
            .finish()
            .await
            .ok_or_else(|| BattleError::InvalidConfig("battle host stopped without a result".into()))
    })
}

fn builtin_scenario(name: &str) -> Result<BattleInit> {
    let south = std::f32::consts::PI;
    let init = match name {
        "skirmish" => BattleInit::new(
            1,
            vec![
                SideInit::new(
                    0,
                    vec![
                        SquadInit::new(1, "infantry", 40, Vec2::new(-15.0, -40.0), 0.0),
                        SquadInit::new(2, "infantry", 40, Vec2::new(15.0, -40.0), 0.0),
                        SquadInit::new(3, "archers", 25, Vec2::new(0.0, -60.0), 0.0),
                    ],
                ),
                SideInit::new(
                    1,
                    vec![
                        SquadInit::new(11, "infantry", 40, Vec2::new(-15.0, 40.0), south),
                        SquadInit::new(12, "infantry", 40, Vec2::new(15.0, 40.0), south),
                        SquadInit::new(13, "cavalry", 20, Vec2::new(40.0, 55.0), south)
                            .with_profile("aggressive"),
                    ],
                ),
            ],
        ),
        "cavalry_charge" => BattleInit::new(
            2,
            vec![
                SideInit::new(
                    0,
                    vec![SquadInit::new(1, "infantry", 60, Vec2::new(0.0, 0.0), 0.0)
                        .with_controller(Controller::Player)
                        .with_morale(45.0)],
                ),
                SideInit::new(
                    1,
                    vec![SquadInit::new(2, "cavalry", 40, Vec2::new(0.0, -45.0), 0.0).with_profile("aggressive")],
                ),
            ],
        ),
        "archer_screen" => BattleInit::new(
            3,
            vec![
                SideInit::new(
                    0,
                    vec![
                        SquadInit::new(1, "archers", 30, Vec2::new(-20.0, -50.0), 0.0).with_profile("cautious"),
                        SquadInit::new(2, "archers", 30, Vec2::new(20.0, -50.0), 0.0).with_profile("cautious"),
                    ],
                ),
                SideInit::new(
                    1,
                    vec![SquadInit::new(11, "infantry", 60, Vec2::new(0.0, 50.0), south)],
                ),
            ],
        ),
        other => return Err(BattleError::InvalidConfig(format!("unknown scenario '{other}'"))),
    };
    Ok(init)
}
