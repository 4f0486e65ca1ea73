//! Expected-layout manifest published to the engine at session start.

use serde::{Deserialize, Serialize};
use tandem_core::{AgentDefinition, Dtype, SensorRegistry};

use crate::error::ShmError;
use crate::frame;
use crate::handle::BufferHandle;
use crate::naming;

/// Default capacity of the `"__manifest"` region.
pub const DEFAULT_MANIFEST_BYTES: usize = 256 * 1024;

/// One expected buffer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Region name.
    pub name: String,
    /// Element shape.
    pub shape: Vec<usize>,
    /// Element dtype.
    pub dtype: Dtype,
}

impl ManifestEntry {
    /// Create an entry.
    pub fn new(name: impl Into<String>, shape: &[usize], dtype: Dtype) -> Self {
        Self {
            name: name.into(),
            shape: shape.to_vec(),
            dtype,
        }
    }
}

/// Every buffer the control process has allocated, by generation.
///
/// The engine compares each entry against its own sensor table and
/// accepts or rejects the whole manifest through the control block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Incremented on every republish.
    pub generation: u64,
    /// Agents the buffers belong to.
    #[serde(default)]
    pub agents: Vec<AgentDefinition>,
    /// Expected buffers in allocation order.
    pub buffers: Vec<ManifestEntry>,
}

impl Manifest {
    /// Entry for `name`, if listed.
    pub fn entry(&self, name: &str) -> Option<&ManifestEntry> {
        self.buffers.iter().find(|e| e.name == name)
    }

    /// Encode into the manifest region.
    pub fn write_to(&self, handle: &BufferHandle) -> Result<(), ShmError> {
        let json = serde_json::to_vec(self)?;
        frame::write_frame(handle, &json)
    }

    /// Decode from the manifest region.
    pub fn read_from(handle: &BufferHandle) -> Result<Self, ShmError> {
        let bytes = frame::read_frame(handle)?;
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Every region an agent owns, in allocation order: command buffer,
/// control flag, teleport payload, control scheme, then an observation
/// buffer and companion flag per sensor.
pub fn agent_layout(def: &AgentDefinition, registry: &SensorRegistry) -> Vec<ManifestEntry> {
    let name = def.name.as_str();
    let mut out = vec![
        ManifestEntry::new(naming::command_buffer(name), &[def.kind.action_dim()], Dtype::F32),
        ManifestEntry::new(naming::agent_flag(name), &[1], Dtype::U8),
        ManifestEntry::new(naming::teleport_payload(name), &[6], Dtype::F32),
        ManifestEntry::new(naming::control_scheme(name), &[1], Dtype::U8),
    ];
    for kind in def.all_sensors() {
        let desc = registry.descriptor(kind);
        out.push(ManifestEntry::new(
            naming::sensor_buffer(name, kind),
            &desc.shape,
            desc.dtype,
        ));
        out.push(ManifestEntry::new(naming::sensor_flag(name, kind), &[1], Dtype::U8));
    }
    out
}
