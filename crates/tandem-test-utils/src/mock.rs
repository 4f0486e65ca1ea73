//! A simulation engine stand-in that speaks the shared-memory protocol.
//!
//! The mock attaches to a session like the real engine: it validates the
//! manifest against its own sensor table, then answers every round by
//! applying world commands, consuming control mailboxes, and writing
//! deterministic observations.
//!
//! Observation rules per round:
//! - `VelocitySensor` is the first three entries of the command vector.
//! - `LocationSensor` integrates velocity from the agent's origin.
//! - `RotationSensor` holds the last teleported rotation.
//! - `Reward` is the engine tick, `Terminal` is always false.
//! - Camera buffers are filled with `engine_tick % 251`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tandem_core::{AgentDefinition, ControlFlag, Dtype, SensorKind, Weather, WireCommand};
use tandem_shm::naming::{self, COMMAND_REGION, MANIFEST_REGION};
use tandem_shm::{
    BufferHandle, CommandChannel, ControlBlock, EngineEndpoint, Mailbox, Manifest, ManifestEntry,
    ShmArena, ShmConfig, ShmError,
};

/// How long a single wait for commands lasts before the loop re-checks
/// stop requests and the manifest.
const POLL: Duration = Duration::from_millis(5);

// ── Configuration ──────────────────────────────────────────────

/// Mock engine behaviour switches.
#[derive(Clone, Debug)]
pub struct MockEngineConfig {
    /// Reject every manifest regardless of content.
    pub reject_manifest: bool,
    /// Engine ticks reported for a world reset round.
    pub reset_ticks: u64,
    /// How long to wait for the control process to create the session.
    pub attach_timeout: Duration,
    /// Start without answering anything until [`MockEngine::resume`].
    pub start_stalled: bool,
}

impl Default for MockEngineConfig {
    fn default() -> Self {
        Self {
            reject_manifest: false,
            reset_ticks: 1,
            attach_timeout: Duration::from_secs(5),
            start_stalled: false,
        }
    }
}

// ── Observable state ───────────────────────────────────────────

/// What the mock did, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// A manifest generation was checked.
    ManifestChecked { generation: u64, accepted: bool },
    /// A normal round completed.
    Round {
        seq: u64,
        engine_tick: u64,
        commands: Vec<WireCommand>,
        /// Command vector read from each agent's buffer this round.
        actions: Vec<(String, Vec<f32>)>,
    },
    /// A spawn command arrived. Buffers are mapped when the manifest
    /// listing the agent arrives.
    Spawned { agent: String, location: [f32; 3] },
    /// A control mailbox was consumed.
    Control { agent: String, flag: ControlFlag },
    /// A world reset round completed.
    WorldReset { seq: u64 },
}

/// World properties the mock tracks from world commands.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorldState {
    pub weather: Weather,
    pub day_time: Option<u32>,
    pub day_cycle_minutes: Option<f32>,
    pub fog_density: f32,
    pub camera: Option<([f32; 3], [f32; 3])>,
    pub ocean: Option<[f32; 3]>,
    /// Every agent known to the engine, initial and spawned.
    pub agents: Vec<String>,
    pub engine_tick: u64,
    pub resets: u64,
}

impl WorldState {
    fn apply(&mut self, cmd: &WireCommand) {
        match cmd {
            WireCommand::SetDayTime { hour } => {
                self.day_time = Some(*hour);
                self.day_cycle_minutes = None;
            }
            WireCommand::StartDayCycle { minutes_per_cycle } => {
                self.day_cycle_minutes = Some(*minutes_per_cycle);
            }
            WireCommand::SetFogDensity { density } => self.fog_density = *density,
            WireCommand::SetWeather { kind } => self.weather = *kind,
            WireCommand::TeleportCamera { position, rotation } => {
                self.camera = Some((*position, *rotation));
            }
            WireCommand::SetOceanState {
                wave_intensity,
                wave_size,
                wave_direction,
            } => self.ocean = Some([*wave_intensity, *wave_size, *wave_direction]),
            WireCommand::SpawnAgent(req) => {
                if !self.agents.contains(&req.definition.name) {
                    self.agents.push(req.definition.name.clone());
                }
            }
        }
    }

    /// Defaults restored by a world reset. Agents and counters persist.
    fn reset(&mut self) {
        *self = Self {
            agents: std::mem::take(&mut self.agents),
            engine_tick: self.engine_tick,
            resets: self.resets + 1,
            ..Self::default()
        };
    }
}

// ── Handle ─────────────────────────────────────────────────────

/// A running mock engine thread.
pub struct MockEngine {
    world: Arc<Mutex<WorldState>>,
    events: Receiver<EngineEvent>,
    stall: Arc<AtomicBool>,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<Result<(), ShmError>>>,
}

impl MockEngine {
    /// Start a mock engine for `config` with default behaviour.
    pub fn spawn(config: ShmConfig) -> Self {
        Self::spawn_with(config, MockEngineConfig::default())
    }

    /// Start a mock engine for `config`.
    pub fn spawn_with(config: ShmConfig, opts: MockEngineConfig) -> Self {
        let world = Arc::new(Mutex::new(WorldState::default()));
        let stall = Arc::new(AtomicBool::new(opts.start_stalled));
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let thread = {
            let world = Arc::clone(&world);
            let stall = Arc::clone(&stall);
            std::thread::Builder::new()
                .name("tandem-mock-engine".into())
                .spawn(move || run(config, opts, world, event_tx, stall, stop_rx))
                .expect("failed to spawn mock engine thread")
        };
        Self {
            world,
            events: event_rx,
            stall,
            stop: Some(stop_tx),
            thread: Some(thread),
        }
    }

    /// Copy of the current world state.
    pub fn world(&self) -> WorldState {
        self.world.lock().clone()
    }

    /// Event stream.
    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events
    }

    /// Every event emitted so far and not yet received.
    pub fn drain_events(&self) -> Vec<EngineEvent> {
        self.events.try_iter().collect()
    }

    /// Stop answering rounds and manifests.
    pub fn stall(&self) {
        self.stall.store(true, Ordering::Release);
    }

    /// Resume answering.
    pub fn resume(&self) {
        self.stall.store(false, Ordering::Release);
    }

    /// Stop the thread and return its result.
    pub fn stop(mut self) -> Result<(), ShmError> {
        self.stop.take();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|_| panic!("mock engine thread panicked")),
            None => Ok(()),
        }
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ── Engine thread ──────────────────────────────────────────────

fn run(
    config: ShmConfig,
    opts: MockEngineConfig,
    world: Arc<Mutex<WorldState>>,
    events: Sender<EngineEvent>,
    stall: Arc<AtomicBool>,
    stop: Receiver<()>,
) -> Result<(), ShmError> {
    let mut arena = ShmArena::attach(config);
    let endpoint = ControlBlock::attach(&mut arena, opts.attach_timeout)?;
    let manifest = arena.allocate(
        MANIFEST_REGION,
        &[endpoint.block().manifest_bytes()],
        Dtype::U8,
    )?;
    let channel = CommandChannel::new(arena.allocate(
        COMMAND_REGION,
        &[endpoint.block().command_bytes()],
        Dtype::U8,
    )?);
    tracing::debug!(session = %arena.config().session, "mock engine attached");

    let mut sim = Sim {
        opts,
        arena,
        endpoint,
        manifest,
        channel,
        agents: IndexMap::new(),
        pending_spawns: IndexMap::new(),
        last_generation: 0,
        last_seq: 0,
        engine_tick: 0,
        world,
        events,
    };

    loop {
        if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) || sim.endpoint.is_shutdown() {
            break;
        }
        if stall.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }
        sim.check_manifest()?;
        match sim.endpoint.wait_commands_ready(sim.last_seq, POLL) {
            Ok(Some(seq)) => sim.round(seq)?,
            Ok(None) => break,
            Err(ShmError::Timeout { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
    tracing::debug!(rounds = sim.last_seq, "mock engine stopped");
    Ok(())
}

struct MockAgent {
    command: BufferHandle,
    mailbox: Mailbox,
    teleport: BufferHandle,
    sensors: Vec<(SensorKind, BufferHandle)>,
    origin: [f32; 3],
    location: [f32; 3],
    rotation: [f32; 3],
    velocity: [f32; 3],
}

impl MockAgent {
    fn apply_flag(&mut self, flag: ControlFlag) -> Result<(), ShmError> {
        let (loc, rot) = {
            let p = self.teleport.as_f32()?;
            ([p[0], p[1], p[2]], [p[3], p[4], p[5]])
        };
        match flag {
            ControlFlag::Idle => {}
            ControlFlag::TeleportLocation => self.location = loc,
            ControlFlag::TeleportRotation => self.rotation = rot,
            ControlFlag::TeleportBoth => {
                self.location = loc;
                self.rotation = rot;
            }
            ControlFlag::Reset => self.restore()?,
        }
        Ok(())
    }

    fn restore(&mut self) -> Result<(), ShmError> {
        self.location = self.origin;
        self.rotation = [0.0; 3];
        self.velocity = [0.0; 3];
        for (_, h) in &self.sensors {
            h.zero()?;
        }
        Ok(())
    }

    fn integrate(&mut self, action: &[f32]) {
        let mut v = [0.0; 3];
        for (dst, src) in v.iter_mut().zip(action) {
            *dst = *src;
        }
        self.velocity = v;
        for (l, d) in self.location.iter_mut().zip(v) {
            *l += d;
        }
    }

    fn write_sensors(&self, engine_tick: u64) -> Result<(), ShmError> {
        for (kind, h) in &self.sensors {
            match kind {
                SensorKind::Location => h.write_f32(&self.location)?,
                SensorKind::Velocity => h.write_f32(&self.velocity)?,
                SensorKind::Rotation => h.write_f32(&self.rotation)?,
                SensorKind::Reward => h.write_f32(&[engine_tick as f32])?,
                SensorKind::Terminal => h.write_bytes(&[0])?,
                SensorKind::RgbCamera | SensorKind::ViewportCapture => {
                    h.write_bytes(&vec![(engine_tick % 251) as u8; h.byte_len()])?
                }
                _ => {}
            }
        }
        Ok(())
    }
}

struct Sim {
    opts: MockEngineConfig,
    arena: ShmArena,
    endpoint: EngineEndpoint,
    manifest: BufferHandle,
    channel: CommandChannel,
    agents: IndexMap<String, MockAgent>,
    pending_spawns: IndexMap<String, [f32; 3]>,
    last_generation: u64,
    last_seq: u64,
    engine_tick: u64,
    world: Arc<Mutex<WorldState>>,
    events: Sender<EngineEvent>,
}

impl Sim {
    fn emit(&self, event: EngineEvent) {
        // The test may have stopped listening.
        let _ = self.events.send(event);
    }

    fn check_manifest(&mut self) -> Result<(), ShmError> {
        let generation = self.endpoint.block().manifest_generation();
        if generation <= self.last_generation {
            return Ok(());
        }
        let manifest = Manifest::read_from(&self.manifest)?;
        if manifest.generation < generation {
            return Ok(());
        }
        self.last_generation = manifest.generation;
        let verdict = if self.opts.reject_manifest {
            Err("configured to reject".to_string())
        } else {
            self.load(&manifest)
        };
        let accepted = verdict.is_ok();
        if let Err(reason) = &verdict {
            tracing::warn!(generation, %reason, "mock engine rejected manifest");
        }
        self.endpoint.ack_manifest(accepted);
        self.emit(EngineEvent::ManifestChecked {
            generation: manifest.generation,
            accepted,
        });
        Ok(())
    }

    /// Validate and map every agent the manifest lists that is not yet
    /// mapped.
    fn load(&mut self, manifest: &Manifest) -> Result<(), String> {
        for def in &manifest.agents {
            if self.agents.contains_key(&def.name) {
                continue;
            }
            check_agent(def, manifest)?;
            let owned = manifest
                .buffers
                .iter()
                .filter(|e| owned_by(&e.name, &def.name, manifest));
            for entry in owned {
                self.arena
                    .allocate(&entry.name, &entry.shape, entry.dtype)
                    .map_err(|e| e.to_string())?;
            }
            let agent = self.map_agent(def).map_err(|e| e.to_string())?;
            self.agents.insert(def.name.clone(), agent);
            let mut world = self.world.lock();
            if !world.agents.contains(&def.name) {
                world.agents.push(def.name.clone());
            }
        }
        Ok(())
    }

    fn map_agent(&mut self, def: &AgentDefinition) -> Result<MockAgent, ShmError> {
        let name = def.name.as_str();
        let get = |arena: &ShmArena, region: String| {
            arena.get(&region).ok_or(ShmError::InvalidName {
                name: region,
                reason: "listed agent buffer missing from manifest",
            })
        };
        let origin = self.pending_spawns.shift_remove(name).unwrap_or([0.0; 3]);
        let mut sensors = Vec::new();
        for kind in def.all_sensors() {
            sensors.push((kind, get(&self.arena, naming::sensor_buffer(name, kind))?));
        }
        let agent = MockAgent {
            command: get(&self.arena, naming::command_buffer(name))?,
            mailbox: Mailbox::new(get(&self.arena, naming::agent_flag(name))?)?,
            teleport: get(&self.arena, naming::teleport_payload(name))?,
            sensors,
            origin,
            location: origin,
            rotation: [0.0; 3],
            velocity: [0.0; 3],
        };
        agent.write_sensors(self.engine_tick)?;
        Ok(agent)
    }

    fn round(&mut self, seq: u64) -> Result<(), ShmError> {
        // The control side publishes a new manifest before signalling.
        self.check_manifest()?;
        let ticks = if self.endpoint.take_reset_request() {
            self.reset(seq)?;
            self.opts.reset_ticks
        } else {
            self.advance(seq)?;
            1
        };
        self.endpoint.signal_tick_complete(seq, ticks);
        self.last_seq = seq;
        Ok(())
    }

    fn reset(&mut self, seq: u64) -> Result<(), ShmError> {
        self.world.lock().reset();
        for agent in self.agents.values_mut() {
            agent.mailbox.take();
            agent.restore()?;
            agent.write_sensors(self.engine_tick)?;
        }
        tracing::debug!(seq, "mock engine world reset");
        self.emit(EngineEvent::WorldReset { seq });
        Ok(())
    }

    fn advance(&mut self, seq: u64) -> Result<(), ShmError> {
        let commands = self.channel.read()?;
        self.engine_tick += 1;
        {
            let mut world = self.world.lock();
            for cmd in &commands {
                world.apply(cmd);
            }
            world.engine_tick = self.engine_tick;
        }
        for cmd in &commands {
            if let WireCommand::SpawnAgent(req) = cmd {
                self.pending_spawns
                    .insert(req.definition.name.clone(), req.location);
                self.emit(EngineEvent::Spawned {
                    agent: req.definition.name.clone(),
                    location: req.location,
                });
            }
        }

        let mut actions = Vec::with_capacity(self.agents.len());
        let mut controls = Vec::new();
        for (name, agent) in self.agents.iter_mut() {
            if let Some(flag) = agent.mailbox.take() {
                agent.apply_flag(flag)?;
                controls.push(EngineEvent::Control {
                    agent: name.clone(),
                    flag,
                });
            }
            let action = agent.command.as_f32()?.to_vec();
            agent.integrate(&action);
            agent.write_sensors(self.engine_tick)?;
            actions.push((name.clone(), action));
        }
        for event in controls {
            self.emit(event);
        }
        self.emit(EngineEvent::Round {
            seq,
            engine_tick: self.engine_tick,
            commands,
            actions,
        });
        Ok(())
    }
}

/// Whether `region` is one of `agent`'s buffers, using the manifest's
/// layout for that agent.
fn owned_by(region: &str, agent: &str, manifest: &Manifest) -> bool {
    manifest
        .agents
        .iter()
        .find(|d| d.name == agent)
        .is_some_and(|def| {
            naming::command_buffer(agent) == region
                || naming::agent_flag(agent) == region
                || naming::teleport_payload(agent) == region
                || naming::control_scheme(agent) == region
                || def.all_sensors().into_iter().any(|k| {
                    naming::sensor_buffer(agent, k) == region
                        || naming::sensor_flag(agent, k) == region
                })
        })
}

/// Compare the manifest's entries for `def` against the engine's own
/// sensor table.
fn check_agent(def: &AgentDefinition, manifest: &Manifest) -> Result<(), String> {
    let find = |name: &str| -> Result<&ManifestEntry, String> {
        manifest
            .entry(name)
            .ok_or_else(|| format!("manifest lacks '{name}'"))
    };
    let cmd = find(&naming::command_buffer(&def.name))?;
    if cmd.shape != [def.kind.action_dim()] || cmd.dtype != Dtype::F32 {
        return Err(format!("command buffer of '{}' has wrong layout", def.name));
    }
    for kind in def.all_sensors() {
        let entry = find(&naming::sensor_buffer(&def.name, kind))?;
        if entry.dtype != kind.dtype() {
            return Err(format!(
                "{} is {}, engine expects {}",
                entry.name,
                entry.dtype,
                kind.dtype()
            ));
        }
        let shape_ok = if kind.is_resizable() {
            entry.shape.len() == 3 && entry.shape[2] == 4 && entry.shape[..2].iter().all(|&d| d > 0)
        } else {
            entry.shape == kind.default_shape()
        };
        if !shape_ok {
            return Err(format!("{} has shape {:?}, engine disagrees", entry.name, entry.shape));
        }
    }
    Ok(())
}
