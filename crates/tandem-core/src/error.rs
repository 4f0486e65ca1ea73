//! Error types for the registry, agent definitions and commands.

use thiserror::Error;

use crate::sensor::SensorKind;

/// Errors from sensor registry lookups and configuration.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No sensor is registered under this numeric identifier.
    #[error("unknown sensor id {0}")]
    UnknownSensorId(u32),
    /// No sensor is registered under this name.
    #[error("unknown sensor name '{0}'")]
    UnknownSensorName(String),
    /// The sensor's shape cannot change because buffers were already
    /// allocated under it.
    #[error("sensor {sensor} is locked: buffers already allocated")]
    ConfigurationLocked {
        /// The locked sensor.
        sensor: SensorKind,
    },
    /// The sensor has a fixed shape.
    #[error("sensor {sensor} is not resizable")]
    NotResizable {
        /// The fixed-shape sensor.
        sensor: SensorKind,
    },
    /// The requested shape is malformed for this sensor.
    #[error("invalid shape {shape:?} for sensor {sensor}: {reason}")]
    InvalidShape {
        /// The sensor being resized.
        sensor: SensorKind,
        /// The rejected shape.
        shape: Vec<usize>,
        /// Why the shape was rejected.
        reason: &'static str,
    },
}

/// Why an [`AgentDefinition`](crate::AgentDefinition) cannot be used.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentDefinitionError {
    /// The name is empty.
    #[error("agent name is empty")]
    EmptyName,
    /// The name starts with `__`, which session regions use.
    #[error("agent name '{0}' uses the reserved '__' prefix")]
    ReservedName(String),
    /// The name contains a character outside `[A-Za-z0-9_-]`.
    #[error("agent name '{name}' contains invalid character {found:?}")]
    InvalidCharacter {
        /// The rejected name.
        name: String,
        /// First offending character.
        found: char,
    },
    /// The agent kind has no command values.
    #[error("agent '{0}' has an empty action space")]
    EmptyActionSpace(String),
}

/// A world command, teleport or spawn request with unusable parameters.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CommandError {
    /// Hour of day outside `0..=23`.
    #[error("hour must be in 0..=23, got {0}")]
    HourOutOfRange(u32),
    /// Day cycle length that is not finite and positive.
    #[error("minutes_per_cycle must be finite and positive, got {0}")]
    InvalidDayCycle(f32),
    /// Fog density outside `[0, 1]`.
    #[error("fog density must be in [0, 1], got {0}")]
    FogDensityOutOfRange(f32),
    /// Camera position or rotation is NaN or infinite.
    #[error("camera pose must be finite")]
    NonFiniteCameraPose,
    /// Ocean parameters are NaN or infinite.
    #[error("ocean parameters must be finite")]
    NonFiniteOceanState,
    /// Weather name that is none of clear, rain or cloudy.
    #[error("unknown weather '{0}', expected clear, rain or cloudy")]
    UnknownWeather(String),
    /// A teleport that moves nothing.
    #[error("teleport for '{agent}' names neither a location nor a rotation")]
    EmptyTeleport {
        /// Target agent.
        agent: String,
    },
    /// A teleport payload with NaN or infinite values.
    #[error("teleport for '{agent}' is not finite")]
    NonFiniteTeleport {
        /// Target agent.
        agent: String,
    },
    /// A spawn location with NaN or infinite values.
    #[error("spawn location {0:?} is not finite")]
    NonFiniteSpawnLocation([f32; 3]),
}
