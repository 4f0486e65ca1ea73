//! Environment error types.

use std::time::Duration;

use tandem_core::{AgentDefinitionError, CommandError, RegistryError, SensorKind, TickId};
use tandem_shm::ShmError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from environment operations.
///
/// [`EngineTimeout`](EnvError::EngineTimeout) and
/// [`ManifestRejected`](EnvError::ManifestRejected) always invalidate the
/// session, as does any error raised after the engine has completed a
/// round (registering spawned agents, republishing the manifest). Errors
/// raised before anything is signalled leave the environment usable.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Sensor lookup or shape configuration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Shared-memory allocation or protocol failure.
    #[error(transparent)]
    Shm(#[from] ShmError),
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A command vector does not match the agent's action space. The
    /// command was not staged.
    #[error("agent '{agent}' expects {expected} command values, got {got}")]
    InvalidCommandShape {
        /// Target agent.
        agent: String,
        /// The agent's action dimension.
        expected: usize,
        /// Length of the rejected payload.
        got: usize,
    },
    /// No agent with this name is registered.
    #[error("unknown agent '{0}'")]
    UnknownAgent(String),
    /// An agent with this name is registered or pending spawn.
    #[error("agent '{0}' already exists")]
    DuplicateAgent(String),
    /// An agent definition failed validation.
    #[error("invalid agent definition: {0}")]
    InvalidAgent(#[from] AgentDefinitionError),
    /// A spawn location is known to be occupied.
    #[error("spawn location {location:?} is occupied by '{by}'")]
    LocationOccupied {
        /// Requested location.
        location: [f32; 3],
        /// The agent already there.
        by: String,
    },
    /// A world command or teleport request has out-of-range parameters.
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] CommandError),
    /// The engine did not complete a round within the deadline. The
    /// session is disabled.
    #[error("engine did not complete tick {tick} within {waited:?}")]
    EngineTimeout {
        /// The tick that was in flight.
        tick: TickId,
        /// How long the control process waited.
        waited: Duration,
    },
    /// The session was disabled by an earlier engine failure; only
    /// `close()` is accepted.
    #[error("session disabled after engine failure, close and recreate the environment")]
    TickDisabled,
    /// The environment has been closed.
    #[error("environment is closed")]
    Closed,
    /// The engine rejected the buffer manifest.
    #[error("engine rejected manifest generation {generation}")]
    ManifestRejected {
        /// Rejected generation.
        generation: u64,
    },
    /// An agent lacks a sensor an operation needs.
    #[error("agent '{agent}' has no {sensor} sensor")]
    MissingSensor {
        /// The agent.
        agent: String,
        /// The missing sensor.
        sensor: SensorKind,
    },
    /// `step` was called with no agents and no default configured.
    #[error("no default agent: configure `default_agent` or construct with at least one agent")]
    NoDefaultAgent,
}
