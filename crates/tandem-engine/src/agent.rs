//! Control-side view of one agent's regions.

use indexmap::IndexMap;
use tandem_core::{
    AgentDefinition, CommandError, ControlFlag, Dtype, SensorKind, SensorRegistry, TeleportRequest,
    TickId,
};
use tandem_shm::{agent_layout, naming, BufferHandle, Mailbox, ShmArena, ShmError};

use crate::error::EnvError;
use crate::snapshot::{AgentObservation, SensorView};

/// Observation buffer plus its companion flag.
#[derive(Clone, Debug)]
struct SensorBuffer {
    data: BufferHandle,
    flag: BufferHandle,
}

/// A registered agent.
///
/// The control process writes the command buffer, the control-flag
/// mailbox, the teleport payload and the control scheme. The engine
/// writes every sensor buffer and clears the mailbox after acting on it.
#[derive(Debug)]
pub struct Agent {
    definition: AgentDefinition,
    command: BufferHandle,
    mailbox: Mailbox,
    teleport: BufferHandle,
    control_scheme: BufferHandle,
    sensors: IndexMap<SensorKind, SensorBuffer>,
    location: Option<[f32; 3]>,
    visible_from: TickId,
}

impl Agent {
    /// Check that every region `def` needs can be allocated without a
    /// name collision. Maps nothing.
    pub(crate) fn check_layout(
        def: &AgentDefinition,
        registry: &SensorRegistry,
        arena: &ShmArena,
    ) -> Result<(), EnvError> {
        def.validate()?;
        for entry in agent_layout(def, registry) {
            arena.check_compatible(&entry.name, &entry.shape, entry.dtype)?;
            // A fresh agent must own every name it derives, even when an
            // existing region happens to have the same layout.
            if let Some(existing) = arena.get(&entry.name) {
                return Err(EnvError::Shm(ShmError::NameCollision {
                    name: entry.name,
                    existing_shape: existing.shape().to_vec(),
                    existing_dtype: existing.dtype(),
                    requested_shape: entry.shape,
                    requested_dtype: entry.dtype,
                }));
            }
        }
        Ok(())
    }

    /// Allocate every region of `def`, then lock its sensor shapes.
    pub(crate) fn allocate(
        def: AgentDefinition,
        registry: &mut SensorRegistry,
        arena: &mut ShmArena,
        location: Option<[f32; 3]>,
        visible_from: TickId,
    ) -> Result<Self, EnvError> {
        Self::check_layout(&def, registry, arena)?;
        let name = def.name.as_str();

        let command = arena.allocate(
            &naming::command_buffer(name),
            &[def.kind.action_dim()],
            Dtype::F32,
        )?;
        let mailbox = Mailbox::new(arena.allocate(&naming::agent_flag(name), &[1], Dtype::U8)?)?;
        let teleport = arena.allocate(&naming::teleport_payload(name), &[6], Dtype::F32)?;
        let control_scheme = arena.allocate(&naming::control_scheme(name), &[1], Dtype::U8)?;

        let mut sensors = IndexMap::new();
        for kind in def.all_sensors() {
            let desc = registry.descriptor(kind);
            let data =
                arena.allocate(&naming::sensor_buffer(name, kind), &desc.shape, desc.dtype)?;
            let flag = arena.allocate(&naming::sensor_flag(name, kind), &[1], Dtype::U8)?;
            sensors.insert(kind, SensorBuffer { data, flag });
        }
        for &kind in sensors.keys() {
            registry.lock(kind);
        }
        tracing::debug!(agent = name, sensors = sensors.len(), %visible_from, "agent allocated");

        Ok(Self {
            definition: def,
            command,
            mailbox,
            teleport,
            control_scheme,
            sensors,
            location,
            visible_from,
        })
    }

    /// Agent name.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// The definition the agent was created from.
    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    /// Length of the command vector.
    pub fn action_dim(&self) -> usize {
        self.definition.kind.action_dim()
    }

    /// Sensor kinds, Terminal and Reward first.
    pub fn sensors(&self) -> impl Iterator<Item = SensorKind> + '_ {
        self.sensors.keys().copied()
    }

    /// Observation buffer of `kind`.
    pub fn sensor_handle(&self, kind: SensorKind) -> Option<&BufferHandle> {
        self.sensors.get(&kind).map(|s| &s.data)
    }

    /// Companion flag buffer of `kind`.
    pub fn sensor_flag_handle(&self, kind: SensorKind) -> Option<&BufferHandle> {
        self.sensors.get(&kind).map(|s| &s.flag)
    }

    /// Command buffer.
    pub fn command_handle(&self) -> &BufferHandle {
        &self.command
    }

    /// Control-flag mailbox.
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// First tick whose snapshot includes this agent.
    pub fn visible_from(&self) -> TickId {
        self.visible_from
    }

    /// Last known location: the `LocationSensor` reading when the agent
    /// has one, else its spawn location.
    pub fn location(&self) -> Option<[f32; 3]> {
        self.location
    }

    /// Read-only views of every sensor, keyed by sensor type id.
    ///
    /// Only meaningful between the end of one tick and the start of the
    /// next; the environment enforces this through borrowing.
    pub fn observation_view(&self) -> AgentObservation<'_> {
        AgentObservation::new(
            self.name(),
            self.sensors
                .iter()
                .map(|(&kind, buf)| SensorView::new(kind, &buf.data)),
        )
    }

    /// Check `payload` against the action space.
    pub fn validate_command(&self, payload: &[f32]) -> Result<(), EnvError> {
        if payload.len() != self.action_dim() {
            return Err(EnvError::InvalidCommandShape {
                agent: self.name().to_string(),
                expected: self.action_dim(),
                got: payload.len(),
            });
        }
        Ok(())
    }

    /// Write a validated command vector.
    pub(crate) fn write_command(&self, payload: &[f32]) -> Result<(), EnvError> {
        self.validate_command(payload)?;
        self.command.write_f32(payload)?;
        Ok(())
    }

    /// Zero the command vector.
    pub(crate) fn clear_command(&self) -> Result<(), EnvError> {
        self.command.zero()?;
        Ok(())
    }

    /// Write the control scheme selector.
    pub(crate) fn write_control_scheme(&self, scheme: u8) -> Result<(), EnvError> {
        self.control_scheme.write_bytes(&[scheme])?;
        Ok(())
    }

    /// Current control scheme selector.
    pub fn control_scheme(&self) -> u8 {
        self.control_scheme
            .as_bytes()
            .ok()
            .and_then(|b| b.first().copied())
            .unwrap_or(0)
    }

    /// Post a teleport to the mailbox. The payload is written before the
    /// flag so the engine never sees the flag with a stale payload.
    pub fn request_teleport(&self, request: TeleportRequest) -> Result<(), EnvError> {
        let Some(flag) = request.flag() else {
            return Err(CommandError::EmptyTeleport {
                agent: self.name().to_string(),
            }
            .into());
        };
        let payload = request.payload();
        if payload.iter().any(|v| !v.is_finite()) {
            return Err(CommandError::NonFiniteTeleport {
                agent: self.name().to_string(),
            }
            .into());
        }
        self.teleport.write_f32(&payload)?;
        self.mailbox.post(flag);
        Ok(())
    }

    /// Post an agent reset to the mailbox. Replaces any pending teleport.
    pub fn request_reset(&self) {
        self.mailbox.post(ControlFlag::Reset);
    }

    /// Whether an agent reset is pending.
    pub fn reset_pending(&self) -> bool {
        self.mailbox.peek() == Some(ControlFlag::Reset)
    }

    /// Clear the mailbox, every sensor flag and the teleport payload.
    /// Used by a world reset, which supersedes pending intents.
    pub(crate) fn clear_ephemeral(&self) -> Result<(), EnvError> {
        self.mailbox.take();
        self.teleport.zero()?;
        for buf in self.sensors.values() {
            buf.flag.zero()?;
        }
        Ok(())
    }

    /// Refresh the known location from the `LocationSensor`, if present.
    pub(crate) fn refresh_location(&mut self) {
        if let Some(loc) = self
            .sensors
            .get(&SensorKind::Location)
            .and_then(|s| s.data.as_f32().ok())
            .and_then(|v| <[f32; 3]>::try_from(&v[..]).ok())
        {
            self.location = Some(loc);
        }
    }
}
