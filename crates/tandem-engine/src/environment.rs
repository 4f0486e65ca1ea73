//! The control-process environment.
//!
//! [`Environment`] owns every region of a session and drives the engine
//! one round at a time. Each [`tick()`](Environment::tick) drains staged
//! commands into shared memory, signals the engine, blocks until the
//! engine reports completion or the deadline passes, then returns a
//! [`Snapshot`] that borrows the environment.
//!
//! # States
//!
//! ```text
//! new() ──► Running ──tick/reset──► Running
//!              │ engine timeout, manifest rejected,
//!              │ or failure after the engine's round
//!              ▼
//!           Disabled ──close()──► Closed
//!              Running ──close()──► Closed
//! ```
//!
//! A disabled session rejects everything except `close()` and read-only
//! accessors: once the engine and the control side may disagree about
//! what exists, there is no state a later tick could safely build on.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tandem_core::{
    AgentCommand, AgentDefinition, Command, CommandError, Dtype, RegistryError, SensorKind,
    SensorRegistry, SpawnRequest, TeleportRequest, TickId, Weather, WireCommand, WorldCommand,
};
use tandem_shm::naming::{COMMAND_REGION, MANIFEST_REGION};
use tandem_shm::{
    agent_layout, BufferHandle, CommandChannel, ControlBlock, ControlEndpoint, Manifest,
    ManifestStatus, ShmArena, ShmError,
};

use crate::agent::Agent;
use crate::config::{region_word, EnvConfig, MIN_COMMAND_BYTES, MIN_MANIFEST_BYTES};
use crate::error::EnvError;
use crate::ingress::CommandQueue;
use crate::metrics::StepMetrics;
use crate::snapshot::{AgentObservation, Snapshot};

// Compile-time assertion: Environment can move to another thread.
const _: () = {
    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send::<Environment>();
    }
};

/// Spawn requests closer than this to a known agent location are
/// rejected as occupied.
pub const OCCUPIED_RADIUS: f32 = 0.5;

// ── EnvState ───────────────────────────────────────────────────

/// Lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvState {
    /// Accepting every operation.
    Running,
    /// An engine failure invalidated the session.
    Disabled,
    /// Regions released.
    Closed,
}

// ── StepResult ─────────────────────────────────────────────────

/// Bookkeeping returned with every step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepInfo {
    /// Tick count after the step.
    pub tick: TickId,
    /// The agent that was stepped.
    pub agent: String,
    /// Timing for the step's tick.
    pub metrics: StepMetrics,
}

/// Result of [`Environment::step`].
#[derive(Debug)]
pub struct StepResult<'env> {
    /// The stepped agent's observation.
    pub observation: AgentObservation<'env>,
    /// The agent's `Reward` sensor.
    pub reward: f32,
    /// The agent's `Terminal` sensor.
    pub terminal: bool,
    /// Tick and timing.
    pub info: StepInfo,
}

// ── Environment ────────────────────────────────────────────────

/// One session with a simulation engine.
///
/// # Example
///
/// ```ignore
/// let mut env = Environment::new(EnvConfig::default(), [uav("uav0")])?;
/// env.act("uav0", [0.0, 0.0, 2.0, 10.0])?;
/// for _ in 0..1000 {
///     let snapshot = env.tick()?;
///     let velocity = snapshot.sensor("uav0", SensorKind::Velocity);
/// }
/// env.close();
/// ```
pub struct Environment {
    config: EnvConfig,
    registry: SensorRegistry,
    arena: ShmArena,
    control: ControlEndpoint,
    manifest_region: BufferHandle,
    manifest: Manifest,
    channel: CommandChannel,
    agents: IndexMap<String, Agent>,
    queue: CommandQueue,
    pending_spawns: Vec<SpawnRequest>,
    tick: TickId,
    state: EnvState,
    last_metrics: StepMetrics,
}

impl Environment {
    /// Create every region for `agents`, publish the manifest and, when
    /// configured, wait for the engine to accept it.
    ///
    /// # Errors
    ///
    /// Configuration, registry and allocation errors as they occur;
    /// [`EnvError::EngineTimeout`] if the engine never answers the
    /// manifest; [`EnvError::ManifestRejected`] if it disagrees with the
    /// layout. Every region created so far is released on error.
    pub fn new(
        config: EnvConfig,
        agents: impl IntoIterator<Item = AgentDefinition>,
    ) -> Result<Self, EnvError> {
        config.validate()?;
        let mut registry = config.registry()?;
        let mut arena = ShmArena::create(config.shm_config())?;

        let manifest_region =
            arena.allocate(MANIFEST_REGION, &[config.manifest_region_bytes], Dtype::U8)?;
        let channel = CommandChannel::new(arena.allocate(
            COMMAND_REGION,
            &[config.command_region_bytes],
            Dtype::U8,
        )?);

        let mut table = IndexMap::new();
        let mut manifest = Manifest::default();
        for def in agents {
            if table.contains_key(&def.name) {
                return Err(EnvError::DuplicateAgent(def.name));
            }
            let agent = Agent::allocate(def.clone(), &mut registry, &mut arena, None, TickId(0))?;
            manifest.buffers.extend(agent_layout(&def, &registry));
            manifest.agents.push(def);
            table.insert(agent.name().to_string(), agent);
        }

        let command_bytes = region_word(
            "command_region_bytes",
            config.command_region_bytes,
            MIN_COMMAND_BYTES,
        )?;
        let manifest_bytes = region_word(
            "manifest_region_bytes",
            config.manifest_region_bytes,
            MIN_MANIFEST_BYTES,
        )?;
        let control = ControlBlock::create(&mut arena, command_bytes, manifest_bytes)?;

        let mut env = Self {
            config,
            registry,
            arena,
            control,
            manifest_region,
            manifest,
            channel,
            agents: table,
            queue: CommandQueue::new(),
            pending_spawns: Vec::new(),
            tick: TickId(0),
            state: EnvState::Running,
            last_metrics: StepMetrics::default(),
        };
        env.publish_manifest()?;
        if env.config.require_manifest_ack {
            env.await_manifest()?;
        }
        tracing::info!(
            session = %env.config.session_id,
            root = %env.config.shm_root.display(),
            agents = env.agents.len(),
            regions = env.arena.len(),
            bytes = env.arena.total_bytes(),
            "environment ready"
        );
        Ok(env)
    }

    // ── Ticking ────────────────────────────────────────────────

    /// Run one round: write staged commands, signal the engine, wait for
    /// completion, and return every visible agent's observation.
    ///
    /// Agents spawned by this tick's spawn commands are registered after
    /// the round and appear from the next tick.
    pub fn tick(&mut self) -> Result<Snapshot<'_>, EnvError> {
        self.run_tick()?;
        Ok(self.snapshot_unchecked())
    }

    /// Stage `command` for the default agent, tick, and report that
    /// agent's observation, reward and terminal flag.
    pub fn step(&mut self, command: impl Into<Vec<f32>>) -> Result<StepResult<'_>, EnvError> {
        self.ensure_running()?;
        let agent = self.default_agent_name()?.to_string();
        self.act(&agent, command)?;
        self.run_tick()?;

        let info = StepInfo {
            tick: self.tick,
            agent: agent.clone(),
            metrics: self.last_metrics.clone(),
        };
        let observation = self
            .snapshot_unchecked()
            .into_agent(&agent)
            .ok_or_else(|| EnvError::UnknownAgent(agent.clone()))?;
        let missing = |sensor| EnvError::MissingSensor {
            agent: agent.clone(),
            sensor,
        };
        let reward = observation
            .get(SensorKind::Reward)
            .and_then(|v| v.scalar_f32())
            .ok_or_else(|| missing(SensorKind::Reward))?;
        let terminal = observation
            .get(SensorKind::Terminal)
            .and_then(|v| v.scalar_bool())
            .ok_or_else(|| missing(SensorKind::Terminal))?;
        Ok(StepResult {
            observation,
            reward,
            terminal,
            info,
        })
    }

    /// Ask the engine to restore world defaults.
    ///
    /// Drops every staged command and pending spawn, zeroes command
    /// buffers, clears control flags, and keeps every region in place.
    /// The tick count advances by the engine-reported reset cost, at
    /// least `reset_min_ticks`.
    pub fn reset(&mut self) -> Result<Snapshot<'_>, EnvError> {
        self.ensure_running()?;
        let start = Instant::now();
        let dropped = self.queue.len();
        self.queue.clear();
        if !self.pending_spawns.is_empty() {
            tracing::warn!(count = self.pending_spawns.len(), "reset discards pending spawns");
            self.pending_spawns.clear();
        }
        for agent in self.agents.values() {
            agent.clear_command()?;
            agent.clear_ephemeral()?;
        }
        self.channel.write(&[])?;
        self.control.request_reset();
        let command_write_us = micros(start.elapsed());

        let wait_start = Instant::now();
        let engine_ticks = self.round()?;
        let wait_us = micros(wait_start.elapsed());

        let cost = engine_ticks.max(self.config.reset_min_ticks);
        self.tick = self.tick.advance(cost);
        self.check_manifest_verdict()?;
        for agent in self.agents.values_mut() {
            agent.refresh_location();
        }
        self.last_metrics = StepMetrics {
            tick: self.tick,
            total_us: micros(start.elapsed()),
            command_write_us,
            wait_us,
            post_tick_us: 0,
            commands_written: 0,
            channel_bytes: 0,
            engine_ticks,
        };
        tracing::info!(tick = %self.tick, cost, dropped, "world reset");
        Ok(self.snapshot_unchecked())
    }

    fn run_tick(&mut self) -> Result<(), EnvError> {
        self.ensure_running()?;
        let start = Instant::now();

        let spawns = std::mem::take(&mut self.pending_spawns);
        let (commands_written, channel_bytes) = match self.write_staged(&spawns) {
            Ok(written) => written,
            Err(e) => {
                self.pending_spawns = spawns;
                return Err(e);
            }
        };
        let command_write_us = micros(start.elapsed());

        let wait_start = Instant::now();
        let engine_ticks = self.round()?;
        let wait_us = micros(wait_start.elapsed());
        // The engine has stepped, so the tick counts even if what follows
        // fails.
        self.tick = self.tick.next();

        let post_start = Instant::now();
        self.check_manifest_verdict()?;
        for agent in self.agents.values_mut() {
            agent.refresh_location();
        }
        if !spawns.is_empty() {
            if let Err(e) = self.register_spawns(spawns) {
                // The engine was told about spawns that now have no
                // buffers on this side.
                self.state = EnvState::Disabled;
                tracing::error!(
                    tick = %self.tick,
                    error = %e,
                    "spawn registration failed, session disabled"
                );
                return Err(e);
            }
        }

        self.last_metrics = StepMetrics {
            tick: self.tick,
            total_us: micros(start.elapsed()),
            command_write_us,
            wait_us,
            post_tick_us: micros(post_start.elapsed()),
            commands_written,
            channel_bytes,
            engine_ticks,
        };
        tracing::debug!(
            tick = %self.tick,
            commands = commands_written,
            wait_us,
            "tick complete"
        );
        Ok(())
    }

    /// Drain the queue into shared memory. Returns the number of entries
    /// written and the channel payload size.
    fn write_staged(&mut self, spawns: &[SpawnRequest]) -> Result<(usize, usize), EnvError> {
        let drained = self.queue.drain_for_tick();
        let wire: Vec<WireCommand> = drained
            .world_commands
            .iter()
            .cloned()
            .map(WireCommand::from)
            .chain(spawns.iter().cloned().map(WireCommand::from))
            .collect();
        let channel_bytes = match self.channel.write(&wire) {
            Ok(n) => n,
            Err(e) => {
                self.queue.restore(drained);
                return Err(e.into());
            }
        };

        for cmd in &drained.agent_commands {
            let Some(agent) = self.agents.get(&cmd.agent) else {
                continue;
            };
            if agent.reset_pending() {
                tracing::warn!(agent = %cmd.agent, "agent reset pending, staged command discarded");
                continue;
            }
            agent.write_command(&cmd.payload)?;
        }
        // A reset must not be followed by a stale actuation.
        for agent in self.agents.values().filter(|a| a.reset_pending()) {
            agent.clear_command()?;
        }
        for (name, scheme) in &drained.control_schemes {
            if let Some(agent) = self.agents.get(name) {
                agent.write_control_scheme(*scheme)?;
            }
        }
        Ok((drained.len() + spawns.len(), channel_bytes))
    }

    /// Signal the engine and wait for the round to complete. Any failure
    /// disables the session.
    fn round(&mut self) -> Result<u64, EnvError> {
        let seq = self.control.signal_commands_ready();
        match self.control.wait_tick_complete(seq, self.config.tick_timeout()) {
            Ok(engine_ticks) => Ok(engine_ticks),
            Err(ShmError::Timeout { waited, .. }) => {
                let tick = self.tick.next();
                self.state = EnvState::Disabled;
                tracing::error!(%tick, ?waited, "engine timed out, session disabled");
                Err(EnvError::EngineTimeout { tick, waited })
            }
            Err(e) => {
                self.state = EnvState::Disabled;
                tracing::error!(error = %e, "handshake failed, session disabled");
                Err(e.into())
            }
        }
    }

    /// Disable the session if the engine rejected the current manifest.
    fn check_manifest_verdict(&mut self) -> Result<(), EnvError> {
        if self.control.block().manifest_status() != ManifestStatus::Rejected {
            return Ok(());
        }
        self.state = EnvState::Disabled;
        tracing::error!(
            generation = self.manifest.generation,
            "engine rejected manifest, session disabled"
        );
        Err(EnvError::ManifestRejected {
            generation: self.manifest.generation,
        })
    }

    // ── Staging ────────────────────────────────────────────────

    /// Stage a command vector for `agent`, replacing any pending one.
    ///
    /// # Errors
    ///
    /// [`EnvError::InvalidCommandShape`] if the length does not match the
    /// agent's action space; nothing is staged.
    pub fn act(&mut self, agent: &str, command: impl Into<Vec<f32>>) -> Result<(), EnvError> {
        self.ensure_running()?;
        let payload = command.into();
        self.agent_ref(agent)?.validate_command(&payload)?;
        if self.queue.stage(Command::Agent(AgentCommand {
            agent: agent.to_string(),
            payload,
        })) {
            tracing::debug!(agent, "pending command overwritten");
        }
        Ok(())
    }

    /// Stage any command.
    pub fn stage(&mut self, command: Command) -> Result<(), EnvError> {
        match command {
            Command::Agent(AgentCommand { agent, payload }) => self.act(&agent, payload),
            Command::World(cmd) => self.stage_world(cmd),
        }
    }

    /// Stage a world command, replacing any pending one for the same
    /// property.
    pub fn stage_world(&mut self, command: WorldCommand) -> Result<(), EnvError> {
        self.ensure_running()?;
        command.validate()?;
        let property = command.property();
        if self.queue.stage(Command::World(command)) {
            tracing::debug!(?property, "pending world command overwritten");
        }
        Ok(())
    }

    /// Jump the sun to `hour` (0-23).
    pub fn set_day_time(&mut self, hour: u32) -> Result<(), EnvError> {
        self.stage_world(WorldCommand::SetDayTime { hour })
    }

    /// Rotate the sun continuously, one day per `minutes_per_cycle`.
    pub fn start_day_cycle(&mut self, minutes_per_cycle: f32) -> Result<(), EnvError> {
        self.stage_world(WorldCommand::StartDayCycle { minutes_per_cycle })
    }

    /// Set fog density in `[0, 1]`.
    pub fn set_fog_density(&mut self, density: f32) -> Result<(), EnvError> {
        self.stage_world(WorldCommand::SetFogDensity { density })
    }

    /// Set the weather.
    pub fn set_weather(&mut self, kind: Weather) -> Result<(), EnvError> {
        self.stage_world(WorldCommand::SetWeather { kind })
    }

    /// Move the observer camera.
    pub fn teleport_camera(
        &mut self,
        position: [f32; 3],
        rotation: [f32; 3],
    ) -> Result<(), EnvError> {
        self.stage_world(WorldCommand::TeleportCamera { position, rotation })
    }

    /// Set ocean wave parameters.
    pub fn set_ocean_state(
        &mut self,
        wave_intensity: f32,
        wave_size: f32,
        wave_direction: f32,
    ) -> Result<(), EnvError> {
        self.stage_world(WorldCommand::SetOceanState {
            wave_intensity,
            wave_size,
            wave_direction,
        })
    }

    /// Select `agent`'s control scheme from the next tick.
    pub fn set_control_scheme(&mut self, agent: &str, scheme: u8) -> Result<(), EnvError> {
        self.ensure_running()?;
        self.agent_ref(agent)?;
        if self.queue.stage_control_scheme(agent, scheme) {
            tracing::debug!(agent, scheme, "pending control scheme overwritten");
        }
        Ok(())
    }

    /// Post a teleport to `agent`'s mailbox.
    pub fn request_teleport(
        &mut self,
        agent: &str,
        location: Option<[f32; 3]>,
        rotation: Option<[f32; 3]>,
    ) -> Result<(), EnvError> {
        self.ensure_running()?;
        self.agent_ref(agent)?
            .request_teleport(TeleportRequest { location, rotation })?;
        tracing::debug!(agent, ?location, ?rotation, "teleport posted");
        Ok(())
    }

    /// Post an agent reset to `agent`'s mailbox. Takes precedence over a
    /// command staged for the same tick.
    pub fn request_agent_reset(&mut self, agent: &str) -> Result<(), EnvError> {
        self.ensure_running()?;
        self.agent_ref(agent)?.request_reset();
        tracing::debug!(agent, "agent reset posted");
        Ok(())
    }

    /// Queue an agent to be created at `location` by the next tick. It
    /// appears in snapshots from the tick after that.
    ///
    /// # Errors
    ///
    /// [`EnvError::DuplicateAgent`] if the name is taken or pending,
    /// [`EnvError::LocationOccupied`] if a known agent is within
    /// [`OCCUPIED_RADIUS`], and name collision or definition errors.
    pub fn spawn_agent(
        &mut self,
        definition: AgentDefinition,
        location: [f32; 3],
    ) -> Result<(), EnvError> {
        self.ensure_running()?;
        let name = definition.name.clone();
        if self.agents.contains_key(&name)
            || self.pending_spawns.iter().any(|s| s.definition.name == name)
        {
            return Err(EnvError::DuplicateAgent(name));
        }
        if location.iter().any(|v| !v.is_finite()) {
            return Err(CommandError::NonFiniteSpawnLocation(location).into());
        }
        if let Some(by) = self.occupant(location) {
            return Err(EnvError::LocationOccupied { location, by });
        }
        Agent::check_layout(&definition, &self.registry, &self.arena)?;
        self.check_pending_layouts(&definition)?;

        // Sensor shapes lock when the buffers are allocated after the next
        // tick; until then `set_sensor_shape` refuses sensors a pending
        // spawn carries.
        tracing::debug!(agent = %name, ?location, "spawn queued");
        self.pending_spawns.push(SpawnRequest {
            definition,
            location,
        });
        Ok(())
    }

    fn occupant(&self, location: [f32; 3]) -> Option<String> {
        let near = |other: [f32; 3]| {
            let d2: f32 = location
                .iter()
                .zip(other)
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            d2 < OCCUPIED_RADIUS * OCCUPIED_RADIUS
        };
        self.agents
            .values()
            .filter_map(|a| a.location().filter(|&l| near(l)).map(|_| a.name().to_string()))
            .chain(
                self.pending_spawns
                    .iter()
                    .filter(|s| near(s.location))
                    .map(|s| s.definition.name.clone()),
            )
            .next()
    }

    fn check_pending_layouts(&self, definition: &AgentDefinition) -> Result<(), EnvError> {
        let fresh = agent_layout(definition, &self.registry);
        for pending in &self.pending_spawns {
            for theirs in agent_layout(&pending.definition, &self.registry) {
                if let Some(ours) = fresh.iter().find(|e| e.name == theirs.name) {
                    return Err(EnvError::Shm(ShmError::NameCollision {
                        name: theirs.name,
                        existing_shape: theirs.shape,
                        existing_dtype: theirs.dtype,
                        requested_shape: ours.shape.clone(),
                        requested_dtype: ours.dtype,
                    }));
                }
            }
        }
        Ok(())
    }

    fn register_spawns(&mut self, spawns: Vec<SpawnRequest>) -> Result<(), EnvError> {
        let visible_from = self.tick.next();
        for SpawnRequest {
            definition,
            location,
        } in spawns
        {
            let layout = agent_layout(&definition, &self.registry);
            let agent = Agent::allocate(
                definition.clone(),
                &mut self.registry,
                &mut self.arena,
                Some(location),
                visible_from,
            )?;
            self.manifest.buffers.extend(layout);
            self.manifest.agents.push(definition);
            tracing::info!(agent = agent.name(), %visible_from, "spawned agent registered");
            self.agents.insert(agent.name().to_string(), agent);
        }
        self.publish_manifest()
    }

    // ── Manifest ───────────────────────────────────────────────

    fn publish_manifest(&mut self) -> Result<(), EnvError> {
        self.manifest.generation += 1;
        self.manifest.write_to(&self.manifest_region)?;
        self.control
            .publish_manifest_generation(self.manifest.generation);
        tracing::debug!(
            generation = self.manifest.generation,
            buffers = self.manifest.buffers.len(),
            "manifest published"
        );
        Ok(())
    }

    fn await_manifest(&mut self) -> Result<(), EnvError> {
        let generation = self.manifest.generation;
        match self.control.wait_manifest(self.config.manifest_timeout()) {
            Ok(ManifestStatus::Accepted) => {
                tracing::info!(generation, "engine accepted manifest");
                Ok(())
            }
            Ok(_) => {
                tracing::error!(generation, "engine rejected manifest");
                Err(EnvError::ManifestRejected { generation })
            }
            Err(ShmError::Timeout { waited, .. }) => {
                tracing::error!(?waited, "engine did not acknowledge manifest");
                Err(EnvError::EngineTimeout {
                    tick: self.tick,
                    waited,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Configuration ──────────────────────────────────────────

    /// Resize a camera sensor before any agent uses it.
    ///
    /// # Errors
    ///
    /// [`RegistryError::ConfigurationLocked`] once any agent, registered
    /// or pending, carries the sensor. A spawn discarded by
    /// [`reset`](Self::reset) no longer counts.
    pub fn set_sensor_shape(&mut self, kind: SensorKind, shape: &[usize]) -> Result<(), EnvError> {
        self.ensure_running()?;
        if self
            .pending_spawns
            .iter()
            .any(|s| s.definition.all_sensors().contains(&kind))
        {
            return Err(RegistryError::ConfigurationLocked { sensor: kind }.into());
        }
        self.registry.set_dynamic_shape(kind.id(), shape)?;
        Ok(())
    }

    // ── Teardown ───────────────────────────────────────────────

    /// Tell the engine to stop and release every region. Idempotent.
    pub fn close(&mut self) {
        if self.state == EnvState::Closed {
            return;
        }
        self.control.signal_shutdown();
        self.queue.clear();
        self.pending_spawns.clear();
        let released = self.arena.release();
        self.state = EnvState::Closed;
        tracing::info!(
            session = %self.config.session_id,
            tick = %self.tick,
            released,
            "environment closed"
        );
    }

    // ── Accessors ──────────────────────────────────────────────

    /// Observation of every visible agent at the current tick.
    pub fn snapshot(&self) -> Result<Snapshot<'_>, EnvError> {
        self.ensure_open()?;
        Ok(self.snapshot_unchecked())
    }

    fn snapshot_unchecked(&self) -> Snapshot<'_> {
        Snapshot::new(
            self.tick,
            self.agents
                .values()
                .filter(|a| a.visible_from() <= self.tick)
                .map(Agent::observation_view),
        )
    }

    /// Registered agent by name.
    pub fn agent(&self, name: &str) -> Result<&Agent, EnvError> {
        self.ensure_open()?;
        self.agent_ref(name)
    }

    fn agent_ref(&self, name: &str) -> Result<&Agent, EnvError> {
        self.agents
            .get(name)
            .ok_or_else(|| EnvError::UnknownAgent(name.to_string()))
    }

    /// Registered agent names, in registration order.
    pub fn agent_names(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    /// Spawns queued for the next tick.
    pub fn pending_spawns(&self) -> &[SpawnRequest] {
        &self.pending_spawns
    }

    /// Ticks completed since construction.
    pub fn tick_count(&self) -> u64 {
        self.tick.0
    }

    /// Current tick.
    pub fn current_tick(&self) -> TickId {
        self.tick
    }

    /// Lifecycle state.
    pub fn state(&self) -> EnvState {
        self.state
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.state == EnvState::Closed
    }

    /// Whether an engine failure disabled the session.
    pub fn is_tick_disabled(&self) -> bool {
        self.state == EnvState::Disabled
    }

    /// Session identifier shared with the engine.
    pub fn session(&self) -> &str {
        &self.config.session_id
    }

    /// The configuration in effect.
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// The session's sensor table.
    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    /// The most recently published manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Metrics from the most recent tick or reset.
    pub fn last_metrics(&self) -> &StepMetrics {
        &self.last_metrics
    }

    fn default_agent_name(&self) -> Result<&str, EnvError> {
        match &self.config.default_agent {
            Some(name) => Ok(self.agent_ref(name)?.name()),
            None => self
                .agents
                .keys()
                .next()
                .map(String::as_str)
                .ok_or(EnvError::NoDefaultAgent),
        }
    }

    fn ensure_running(&self) -> Result<(), EnvError> {
        match self.state {
            EnvState::Running => Ok(()),
            EnvState::Disabled => Err(EnvError::TickDisabled),
            EnvState::Closed => Err(EnvError::Closed),
        }
    }

    fn ensure_open(&self) -> Result<(), EnvError> {
        match self.state {
            EnvState::Closed => Err(EnvError::Closed),
            _ => Ok(()),
        }
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("session", &self.config.session_id)
            .field("state", &self.state)
            .field("tick", &self.tick)
            .field("agents", &self.agents.len())
            .field("pending_spawns", &self.pending_spawns.len())
            .finish()
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
