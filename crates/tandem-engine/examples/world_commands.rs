//! Tandem world commands: weather, time of day, and mid-session spawns.
//!
//! Demonstrates:
//!   1. Staging world commands (the latest value per property wins)
//!   2. Spawning an agent while the session runs
//!   3. Watching what the engine received through the mock's state
//!
//! Run with:
//!   cargo run --example world_commands

use tandem_core::{Weather, WorldCommand};
use tandem_engine::{EnvConfig, Environment};
use tandem_test_utils::{light_uav, MockEngine};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let root = tempfile::tempdir()?;
    let config = EnvConfig {
        shm_root: root.path().to_path_buf(),
        ..EnvConfig::default()
    };
    let engine = MockEngine::spawn(config.shm_config());
    let mut env = Environment::new(config, [light_uav("scout")])?;

    // ─── World commands ─────────────────────────────────────────

    env.set_weather(Weather::Rain)?;
    env.set_day_time(6)?;
    env.set_fog_density(0.3)?;
    // Replaces the rain staged above.
    env.stage(tandem_core::Command::World(WorldCommand::SetWeather {
        kind: Weather::Cloudy,
    }))?;
    env.tick()?;
    let world = engine.world();
    println!(
        "weather={} day_time={:?} fog={}",
        world.weather, world.day_time, world.fog_density
    );

    // ─── Spawning ───────────────────────────────────────────────

    env.spawn_agent(light_uav("wingman"), [5.0, 0.0, 0.0])?;
    let visible = env.tick()?.contains("wingman");
    println!("tick {}: wingman visible={visible}", env.tick_count());
    let snapshot = env.tick()?;
    println!(
        "tick {}: agents={:?}",
        snapshot.tick(),
        snapshot.agent_names().collect::<Vec<_>>()
    );
    drop(snapshot);

    env.close();
    engine.stop()?;
    Ok(())
}
