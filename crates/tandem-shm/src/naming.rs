//! Deterministic buffer names.
//!
//! Both processes derive every name from the agent name and the sensor's
//! wire name; these functions are the single source of that convention.

use tandem_core::SensorKind;

/// Session control block (handshake words).
pub const CONTROL_REGION: &str = "__control";
/// Expected-layout manifest.
pub const MANIFEST_REGION: &str = "__manifest";
/// Per-tick world command channel.
pub const COMMAND_REGION: &str = "__commands";

/// Observation buffer: `"{agent}_{sensor}"`.
pub fn sensor_buffer(agent: &str, sensor: SensorKind) -> String {
    format!("{agent}_{}", sensor.name())
}

/// Companion flag of a sensor buffer: `"{agent}_{sensor}_teleport_flag"`.
pub fn sensor_flag(agent: &str, sensor: SensorKind) -> String {
    format!("{agent}_{}_teleport_flag", sensor.name())
}

/// Agent command buffer: `"{agent}"`.
pub fn command_buffer(agent: &str) -> String {
    agent.to_string()
}

/// Agent control-flag mailbox: `"{agent}_teleport_flag"`.
pub fn agent_flag(agent: &str) -> String {
    format!("{agent}_teleport_flag")
}

/// Agent teleport payload: `"{agent}_teleport_command"`.
pub fn teleport_payload(agent: &str) -> String {
    format!("{agent}_teleport_command")
}

/// Agent control scheme selector: `"{agent}_control_scheme"`.
pub fn control_scheme(agent: &str) -> String {
    format!("{agent}_control_scheme")
}
