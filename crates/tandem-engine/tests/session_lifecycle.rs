//! Integration test: a full session against the mock engine.
//!
//! Covers construction and the manifest handshake, long tick runs,
//! per-agent buffer isolation, world resets that keep every region in
//! place, and teardown.

use tandem_core::{AgentDefinition, AgentKind, Dtype, RegistryError, SensorKind, TickId};
use tandem_engine::{EnvConfig, EnvError, EnvState, Environment, Snapshot};
use tandem_test_utils::{light_uav, temp_session, uav, EngineEvent, MockEngine, MockEngineConfig};

// ── Helpers ──────────────────────────────────────────────────────────

fn start(session: &str, opts: MockEngineConfig) -> (tempfile::TempDir, EnvConfig, MockEngine) {
    let (dir, shm) = temp_session(session);
    let engine = MockEngine::spawn_with(shm, opts);
    let config = EnvConfig {
        shm_root: dir.path().to_path_buf(),
        session_id: session.to_string(),
        ..EnvConfig::default()
    };
    (dir, config, engine)
}

fn f32s(snapshot: &Snapshot<'_>, agent: &str, kind: SensorKind) -> Vec<f32> {
    snapshot
        .sensor(agent, kind)
        .and_then(|v| v.as_f32())
        .unwrap_or_else(|| panic!("{agent} has no f32 {kind}"))
        .to_vec()
}

fn region_files(dir: &tempfile::TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

// ── Construction ─────────────────────────────────────────────────────

#[test]
fn construction_waits_for_manifest_ack() {
    let (_dir, config, engine) = start("ack", MockEngineConfig::default());
    let env = Environment::new(config, [light_uav("uav0")]).unwrap();

    assert_eq!(env.state(), EnvState::Running);
    assert_eq!(env.tick_count(), 0);
    assert_eq!(env.manifest().generation, 1);
    assert!(env.manifest().entry("uav0_LocationSensor").is_some());
    // The verdict is published before the event is sent.
    let event = engine
        .events()
        .recv_timeout(std::time::Duration::from_secs(1))
        .unwrap();
    assert_eq!(
        event,
        EngineEvent::ManifestChecked {
            generation: 1,
            accepted: true
        }
    );
    assert_eq!(engine.world().agents, vec!["uav0".to_string()]);
}

#[test]
fn duplicate_initial_agents_are_rejected() {
    let opts = MockEngineConfig {
        attach_timeout: std::time::Duration::from_millis(200),
        ..MockEngineConfig::default()
    };
    let (dir, config, _engine) = start("dup", opts);
    let err = Environment::new(config, [light_uav("a"), light_uav("a")]).unwrap_err();
    assert!(matches!(err, EnvError::DuplicateAgent(name) if name == "a"));
    assert_eq!(region_files(&dir), 0);
}

#[test]
fn camera_shape_comes_from_config() {
    let (_dir, mut config, _engine) = start("camera", MockEngineConfig::default());
    config.camera_shape = Some([64, 32, 4]);
    let mut env = Environment::new(config, [uav("uav0")]).unwrap();

    let handle = env
        .agent("uav0")
        .unwrap()
        .sensor_handle(SensorKind::RgbCamera)
        .unwrap();
    assert_eq!(handle.shape(), &[64, 32, 4]);
    assert_eq!(handle.byte_len(), 64 * 32 * 4);

    let err = env
        .set_sensor_shape(SensorKind::RgbCamera, &[16, 16, 4])
        .unwrap_err();
    assert!(matches!(
        err,
        EnvError::Registry(RegistryError::ConfigurationLocked { .. })
    ));
}

// ── Ticking ──────────────────────────────────────────────────────────

#[test]
fn uav_runs_a_thousand_ticks() {
    let (_dir, config, engine) = start("uav-1000", MockEngineConfig::default());
    let mut env = Environment::new(config, [uav("uav0")]).unwrap();
    env.act("uav0", [0.0, 0.0, 1.0, 10.0]).unwrap();

    for i in 1..=1000u64 {
        let snapshot = env.tick().unwrap();
        assert_eq!(snapshot.tick(), TickId(i));
        let observation = snapshot.get("uav0").unwrap();
        assert_eq!(observation.type_ids().collect::<Vec<_>>(), vec![1, 2, 4, 10]);
        let reward = snapshot
            .sensor("uav0", SensorKind::Reward)
            .and_then(|v| v.scalar_f32())
            .unwrap();
        assert_eq!(reward, i as f32);
    }

    let snapshot = env.snapshot().unwrap();
    assert_eq!(f32s(&snapshot, "uav0", SensorKind::Velocity), vec![0.0, 0.0, 1.0]);
    let camera = snapshot.sensor("uav0", SensorKind::RgbCamera).unwrap();
    assert_eq!(camera.shape(), &[256, 256, 4]);
    assert_eq!(camera.dtype(), Dtype::U8);
    let velocity = snapshot.sensor("uav0", SensorKind::Velocity).unwrap();
    assert_eq!((velocity.shape(), velocity.dtype()), (&[3][..], Dtype::F32));
    let fill = (1000 % 251) as u8;
    assert!(camera.as_u8().unwrap().iter().all(|&b| b == fill));
    assert_eq!(
        snapshot
            .sensor("uav0", SensorKind::Terminal)
            .and_then(|v| v.scalar_bool()),
        Some(false)
    );
    drop(snapshot);

    assert_eq!(env.tick_count(), 1000);
    assert_eq!(env.last_metrics().tick, TickId(1000));
    assert_eq!(env.last_metrics().engine_ticks, 1);
    assert_eq!(engine.world().engine_tick, 1000);
}

#[test]
fn step_reports_reward_and_terminal_for_default_agent() {
    let (_dir, mut config, _engine) = start("step", MockEngineConfig::default());
    config.default_agent = Some("b".to_string());
    let mut env = Environment::new(config, [light_uav("a"), light_uav("b")]).unwrap();

    let result = env.step([2.0, 0.0, 0.0, 0.0]).unwrap();
    assert_eq!(result.observation.agent(), "b");
    assert_eq!(result.reward, 1.0);
    assert!(!result.terminal);
    assert_eq!(result.info.tick, TickId(1));
    assert_eq!(result.info.agent, "b");
    let velocity = result
        .observation
        .get(SensorKind::Velocity)
        .and_then(|v| v.as_f32())
        .unwrap()
        .to_vec();
    assert_eq!(velocity, vec![2.0, 0.0, 0.0]);
}

#[test]
fn agents_never_alias() {
    let (_dir, config, _engine) = start("alias", MockEngineConfig::default());
    let mut env = Environment::new(config, [light_uav("a"), light_uav("b")]).unwrap();
    env.act("a", [1.0, 0.0, 0.0, 0.0]).unwrap();
    env.act("b", [0.0, 5.0, 0.0, 0.0]).unwrap();

    {
        let snapshot = env.tick().unwrap();
        assert_eq!(f32s(&snapshot, "a", SensorKind::Velocity), vec![1.0, 0.0, 0.0]);
        assert_eq!(f32s(&snapshot, "b", SensorKind::Velocity), vec![0.0, 5.0, 0.0]);
        assert_eq!(f32s(&snapshot, "a", SensorKind::Location), vec![1.0, 0.0, 0.0]);
        assert_eq!(f32s(&snapshot, "b", SensorKind::Location), vec![0.0, 5.0, 0.0]);
    }

    let a = env.agent("a").unwrap();
    let b = env.agent("b").unwrap();
    for kind in a.sensors() {
        let ha = a.sensor_handle(kind).unwrap();
        let hb = b.sensor_handle(kind).unwrap();
        assert!(!ha.same_region(hb), "{kind} shared between agents");
        assert_ne!(ha.as_ptr(), hb.as_ptr());
    }
    assert!(!a.command_handle().same_region(b.command_handle()));
}

#[test]
fn owned_snapshot_survives_later_ticks() {
    let (_dir, config, _engine) = start("owned", MockEngineConfig::default());
    let mut env = Environment::new(config, [light_uav("a")]).unwrap();
    env.act("a", [1.0, 0.0, 0.0, 0.0]).unwrap();

    let first = env.tick().unwrap().to_owned();
    env.tick().unwrap();

    let location = first.get("a", SensorKind::Location).unwrap().to_f32().unwrap();
    assert_eq!(location, vec![1.0, 0.0, 0.0]);
    let now = f32s(&env.snapshot().unwrap(), "a", SensorKind::Location);
    assert_eq!(now, vec![2.0, 0.0, 0.0]);
}

// ── World reset ──────────────────────────────────────────────────────

#[test]
fn reset_keeps_regions_and_costs_engine_ticks() {
    let opts = MockEngineConfig {
        reset_ticks: 3,
        ..MockEngineConfig::default()
    };
    let (_dir, config, engine) = start("reset", opts);
    let mut env = Environment::new(config, [light_uav("a")]).unwrap();
    env.act("a", [1.0, 1.0, 1.0, 0.0]).unwrap();
    env.tick().unwrap();

    let before = env
        .agent("a")
        .unwrap()
        .sensor_handle(SensorKind::Velocity)
        .unwrap()
        .clone();
    let before_addrs: Vec<_> = {
        let a = env.agent("a").unwrap();
        a.sensors()
            .map(|k| a.sensor_handle(k).unwrap().as_ptr())
            .chain([a.command_handle().as_ptr(), a.mailbox().handle().as_ptr()])
            .collect()
    };
    env.act("a", [9.0, 9.0, 9.0, 0.0]).unwrap();
    env.request_teleport("a", Some([4.0, 4.0, 4.0]), None).unwrap();

    {
        let snapshot = env.reset().unwrap();
        assert_eq!(snapshot.tick(), TickId(4));
        assert_eq!(f32s(&snapshot, "a", SensorKind::Velocity), vec![0.0; 3]);
        assert_eq!(f32s(&snapshot, "a", SensorKind::Location), vec![0.0; 3]);
    }
    let after = env.agent("a").unwrap();
    assert!(after.sensor_handle(SensorKind::Velocity).unwrap().same_region(&before));
    let after_addrs: Vec<_> = after
        .sensors()
        .map(|k| after.sensor_handle(k).unwrap().as_ptr())
        .chain([after.command_handle().as_ptr(), after.mailbox().handle().as_ptr()])
        .collect();
    assert_eq!(after_addrs, before_addrs);
    assert!(!after.mailbox().is_pending());
    assert_eq!(&after.command_handle().as_f32().unwrap()[..], &[0.0; 4]);

    // Staged commands died with the reset.
    let snapshot = env.tick().unwrap();
    assert_eq!(f32s(&snapshot, "a", SensorKind::Velocity), vec![0.0; 3]);
    drop(snapshot);
    assert_eq!(env.tick_count(), 5);
    assert_eq!(engine.world().resets, 1);
}

#[test]
fn reset_cost_has_a_configured_floor() {
    let (_dir, mut config, _engine) = start("reset-floor", MockEngineConfig::default());
    config.reset_min_ticks = 5;
    let mut env = Environment::new(config, [light_uav("a")]).unwrap();
    assert_eq!(env.reset().unwrap().tick(), TickId(5));
    assert_eq!(env.last_metrics().engine_ticks, 1);
}

// ── Teardown ─────────────────────────────────────────────────────────

#[test]
fn close_releases_everything_and_rejects_use() {
    let (dir, config, _engine) = start("close", MockEngineConfig::default());
    let mut env = Environment::new(config, [light_uav("a")]).unwrap();
    env.tick().unwrap();
    assert!(region_files(&dir) > 0);

    env.close();
    assert!(env.is_closed());
    assert_eq!(region_files(&dir), 0);
    assert!(matches!(env.tick(), Err(EnvError::Closed)));
    assert!(matches!(env.act("a", [0.0; 4]), Err(EnvError::Closed)));
    assert!(matches!(env.snapshot(), Err(EnvError::Closed)));
    assert!(matches!(env.agent("a"), Err(EnvError::Closed)));
    assert!(matches!(env.set_weather(Default::default()), Err(EnvError::Closed)));

    // Idempotent.
    env.close();
    assert_eq!(env.state(), EnvState::Closed);
}

#[test]
fn drop_closes_the_session() {
    let (dir, config, engine) = start("drop", MockEngineConfig::default());
    {
        let _env = Environment::new(config, [light_uav("a")]).unwrap();
        assert!(region_files(&dir) > 0);
    }
    assert_eq!(region_files(&dir), 0);
    assert!(engine.stop().is_ok());
}

#[test]
fn custom_agents_use_declared_action_dim() {
    let (_dir, config, _engine) = start("custom", MockEngineConfig::default());
    let arm = AgentDefinition::new(
        "arm",
        AgentKind::Custom { action_dim: 7 },
        vec![SensorKind::Velocity],
    );
    let mut env = Environment::new(config, [arm]).unwrap();
    assert_eq!(env.agent("arm").unwrap().action_dim(), 7);

    let err = env.act("arm", [0.0; 4]).unwrap_err();
    assert!(matches!(
        err,
        EnvError::InvalidCommandShape {
            expected: 7,
            got: 4,
            ..
        }
    ));
    env.act("arm", [0.5; 7]).unwrap();
    let snapshot = env.tick().unwrap();
    assert_eq!(f32s(&snapshot, "arm", SensorKind::Velocity), vec![0.5; 3]);
}
