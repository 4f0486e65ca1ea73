//! Read-only observation views.
//!
//! A [`Snapshot`] borrows the environment, so the borrow checker rejects
//! any attempt to tick while a view is alive: a view can only be read in
//! the window between the end of one tick and the start of the next.
//! Slices handed out by a [`SensorView`] additionally hold the region's
//! read guard, so writes through a cloned handle fail while they live.
//! [`Snapshot::to_owned`] copies the data out for use across ticks.

use indexmap::IndexMap;
use tandem_core::{Dtype, SensorKind, TickId};
use tandem_shm::{BufferHandle, BufferRef};

// ── SensorView ─────────────────────────────────────────────────

/// Zero-copy view of one sensor buffer.
#[derive(Clone, Copy, Debug)]
pub struct SensorView<'a> {
    kind: SensorKind,
    handle: &'a BufferHandle,
}

impl<'a> SensorView<'a> {
    pub(crate) fn new(kind: SensorKind, handle: &'a BufferHandle) -> Self {
        Self { kind, handle }
    }

    /// Sensor kind.
    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Numeric sensor identifier.
    pub fn type_id(&self) -> u32 {
        self.kind.id()
    }

    /// Element shape.
    pub fn shape(&self) -> &'a [usize] {
        self.handle.shape()
    }

    /// Element dtype.
    pub fn dtype(&self) -> Dtype {
        self.handle.dtype()
    }

    /// Raw bytes. `None` if the region cannot be viewed.
    pub fn as_bytes(&self) -> Option<BufferRef<'a, u8>> {
        self.handle.as_bytes().ok()
    }

    /// Elements of a `float32` sensor.
    pub fn as_f32(&self) -> Option<BufferRef<'a, f32>> {
        self.handle.as_f32().ok()
    }

    /// Elements of a `uint8` sensor.
    pub fn as_u8(&self) -> Option<BufferRef<'a, u8>> {
        if self.dtype() == Dtype::U8 {
            self.as_bytes()
        } else {
            None
        }
    }

    /// Elements of a `bool` sensor, copied out.
    pub fn as_bool(&self) -> Option<Vec<bool>> {
        if self.dtype() != Dtype::Bool {
            return None;
        }
        self.as_bytes().map(|bytes| bytes.iter().map(|&b| b != 0).collect())
    }

    /// First element of a `float32` sensor.
    pub fn scalar_f32(&self) -> Option<f32> {
        self.as_f32().and_then(|v| v.first().copied())
    }

    /// First element of a `bool` sensor.
    pub fn scalar_bool(&self) -> Option<bool> {
        if self.dtype() != Dtype::Bool {
            return None;
        }
        self.as_bytes().and_then(|v| v.first().map(|&b| b != 0))
    }

    fn copy_out(self) -> OwnedSensor {
        OwnedSensor {
            kind: self.kind,
            shape: self.shape().to_vec(),
            dtype: self.dtype(),
            bytes: self.as_bytes().map(|b| b.to_vec()).unwrap_or_default(),
        }
    }
}

// ── AgentObservation ───────────────────────────────────────────

/// One agent's sensors, keyed by sensor type id.
#[derive(Clone, Debug)]
pub struct AgentObservation<'a> {
    agent: &'a str,
    sensors: IndexMap<u32, SensorView<'a>>,
}

impl<'a> AgentObservation<'a> {
    pub(crate) fn new(agent: &'a str, sensors: impl IntoIterator<Item = SensorView<'a>>) -> Self {
        Self {
            agent,
            sensors: sensors.into_iter().map(|v| (v.type_id(), v)).collect(),
        }
    }

    /// Owning agent.
    pub fn agent(&self) -> &'a str {
        self.agent
    }

    /// View of `kind`.
    pub fn get(&self, kind: SensorKind) -> Option<&SensorView<'a>> {
        self.sensors.get(&kind.id())
    }

    /// View by numeric sensor id.
    pub fn get_id(&self, type_id: u32) -> Option<&SensorView<'a>> {
        self.sensors.get(&type_id)
    }

    /// Whether `kind` is present.
    pub fn contains(&self, kind: SensorKind) -> bool {
        self.sensors.contains_key(&kind.id())
    }

    /// Sensor ids present, in declaration order.
    pub fn type_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.sensors.keys().copied()
    }

    /// Every view, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &SensorView<'a>> {
        self.sensors.values()
    }

    /// Number of sensors.
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// Whether the agent has no sensors.
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

// ── Snapshot ───────────────────────────────────────────────────

/// Every visible agent's observation after a tick.
#[derive(Clone, Debug)]
pub struct Snapshot<'env> {
    tick: TickId,
    agents: IndexMap<&'env str, AgentObservation<'env>>,
}

impl<'env> Snapshot<'env> {
    pub(crate) fn new(
        tick: TickId,
        agents: impl IntoIterator<Item = AgentObservation<'env>>,
    ) -> Self {
        Self {
            tick,
            agents: agents.into_iter().map(|a| (a.agent(), a)).collect(),
        }
    }

    /// Tick the snapshot was taken at.
    pub fn tick(&self) -> TickId {
        self.tick
    }

    /// One agent's observation.
    pub fn get(&self, agent: &str) -> Option<&AgentObservation<'env>> {
        self.agents.get(agent)
    }

    /// Shorthand for `get(agent)?.get(kind)`.
    pub fn sensor(&self, agent: &str, kind: SensorKind) -> Option<&SensorView<'env>> {
        self.get(agent)?.get(kind)
    }

    /// Whether `agent` is in the snapshot.
    pub fn contains(&self, agent: &str) -> bool {
        self.agents.contains_key(agent)
    }

    /// Agent names, in registration order.
    pub fn agent_names(&self) -> impl Iterator<Item = &'env str> + '_ {
        self.agents.keys().copied()
    }

    /// Every agent's observation, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentObservation<'env>> {
        self.agents.values()
    }

    /// Number of agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agents are visible.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Take one agent's observation out of the snapshot.
    pub fn into_agent(mut self, agent: &str) -> Option<AgentObservation<'env>> {
        self.agents.shift_remove(agent)
    }

    /// Copy every buffer out of shared memory.
    pub fn to_owned(&self) -> OwnedSnapshot {
        OwnedSnapshot {
            tick: self.tick,
            agents: self
                .agents
                .iter()
                .map(|(name, obs)| {
                    let sensors = obs.sensors.iter().map(|(&id, v)| (id, v.copy_out())).collect();
                    (name.to_string(), sensors)
                })
                .collect(),
        }
    }
}

// ── Owned copies ───────────────────────────────────────────────

/// A copied sensor buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedSensor {
    /// Sensor kind.
    pub kind: SensorKind,
    /// Element shape.
    pub shape: Vec<usize>,
    /// Element dtype.
    pub dtype: Dtype,
    /// Raw bytes, row-major.
    pub bytes: Vec<u8>,
}

impl OwnedSensor {
    /// Decode a `float32` buffer.
    pub fn to_f32(&self) -> Option<Vec<f32>> {
        (self.dtype == Dtype::F32).then(|| {
            self.bytes
                .chunks_exact(4)
                .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        })
    }

    /// Decode a `bool` buffer.
    pub fn to_bool(&self) -> Option<Vec<bool>> {
        (self.dtype == Dtype::Bool).then(|| self.bytes.iter().map(|&b| b != 0).collect())
    }
}

/// A snapshot copied out of shared memory. Independent of the
/// environment's lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedSnapshot {
    /// Tick the snapshot was taken at.
    pub tick: TickId,
    /// Agent name to sensor id to copied buffer.
    pub agents: IndexMap<String, IndexMap<u32, OwnedSensor>>,
}

impl OwnedSnapshot {
    /// One copied sensor.
    pub fn get(&self, agent: &str, kind: SensorKind) -> Option<&OwnedSensor> {
        self.agents.get(agent)?.get(&kind.id())
    }
}
