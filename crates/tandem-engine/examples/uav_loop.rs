//! Tandem UAV loop: fly a quadcopter against an in-process engine.
//!
//! Demonstrates:
//!   1. Configuring a session (TOML overrides plus environment variables)
//!   2. Starting the mock engine and building an `Environment`
//!   3. Stepping with actions, reading borrowed snapshots and metrics
//!   4. Teleporting, resetting, and closing
//!
//! Run with:
//!   RUST_LOG=tandem_engine=debug cargo run --example uav_loop

use tandem_core::{AgentDefinition, AgentKind, SensorKind};
use tandem_engine::{EnvConfig, Environment};
use tandem_test_utils::MockEngine;

// ─── Flight parameters ──────────────────────────────────────────

const TICKS: u64 = 200;
const CLIMB: [f32; 4] = [0.0, 0.0, 0.5, 10.0];
const CRUISE: [f32; 4] = [1.0, 0.0, 0.0, 10.0];

// ─── Main ───────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Tandem UAV loop ===\n");

    // 1. Config: small camera so the loop stays fast.
    let root = tempfile::tempdir()?;
    let mut config = EnvConfig::from_toml_str(
        r#"
        tick_timeout_ms = 2000
        camera_shape = [64, 64, 4]
        "#,
    )?;
    config.shm_root = root.path().to_path_buf();
    config.apply_env_overrides()?;
    println!("Config: {config}");

    // 2. Engine first: it waits for the control block.
    let engine = MockEngine::spawn(config.shm_config());
    let uav = AgentDefinition::new(
        "uav0",
        AgentKind::Uav,
        vec![
            SensorKind::RgbCamera,
            SensorKind::Location,
            SensorKind::Velocity,
        ],
    );
    let mut env = Environment::new(config, [uav])?;
    println!("Environment ready: {env:?}\n");

    // 3. Climb, then cruise.
    for i in 0..TICKS {
        let action = if i < TICKS / 2 { CLIMB } else { CRUISE };
        let result = env.step(action)?;
        if result.info.tick.0 % 50 == 0 {
            let location = result
                .observation
                .get(SensorKind::Location)
                .and_then(|v| v.as_f32())
                .map(|v| v.to_vec())
                .unwrap_or_default();
            println!(
                "  tick {:>3}: location={:?} reward={:.0} wait={}μs total={}μs",
                result.info.tick.0,
                location,
                result.reward,
                result.info.metrics.wait_us,
                result.info.metrics.total_us,
            );
        }
    }

    // 4. Teleport back home and look at the result on the next tick.
    env.request_teleport("uav0", Some([0.0, 0.0, 10.0]), None)?;
    let home = env.step([0.0; 4])?;
    println!(
        "\nAfter teleport: location={:?}",
        home.observation
            .get(SensorKind::Location)
            .and_then(|v| v.as_f32())
            .map(|v| v.to_vec())
            .unwrap_or_default()
    );

    // 5. Reset the world and close.
    let tick = env.reset()?.tick();
    println!("World reset, now at tick {tick}");
    env.close();
    engine.stop()?;
    println!("Closed.");
    Ok(())
}
