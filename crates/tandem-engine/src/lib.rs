//! Control-process runtime for a tandem session.
//!
//! Provides [`Environment`], which owns the session's shared-memory
//! regions and drives the engine one round at a time: staged agent and
//! world commands go out, the engine runs, and sensor buffers come back
//! as a borrowed [`Snapshot`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod agent;
pub mod config;
pub mod environment;
pub mod error;
pub mod ingress;
pub mod metrics;
pub mod snapshot;

pub use agent::Agent;
pub use config::{
    ConfigError, EnvConfig, ENV_SHM_ROOT, ENV_TICK_TIMEOUT_MS, MIN_COMMAND_BYTES,
    MIN_MANIFEST_BYTES,
};
pub use environment::{EnvState, Environment, StepInfo, StepResult, OCCUPIED_RADIUS};
pub use error::EnvError;
pub use ingress::{CommandQueue, Drained};
pub use metrics::StepMetrics;
pub use snapshot::{AgentObservation, OwnedSensor, OwnedSnapshot, SensorView, Snapshot};
