//! Tandem: drive a simulation engine from a control process over shared
//! memory.
//!
//! This is the facade crate that re-exports the public API of the tandem
//! sub-crates. Most users only need this one dependency.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use tandem::prelude::*;
//!
//! # fn main() -> Result<(), EnvError> {
//! let uav = AgentDefinition::new("uav0", AgentKind::Uav, [SensorKind::Velocity]);
//! let mut env = Environment::new(EnvConfig::default(), [uav])?;
//! env.set_weather(Weather::Rain)?;
//! for _ in 0..100 {
//!     let result = env.step([0.0, 0.0, 1.0, 10.0])?;
//!     if result.terminal {
//!         break;
//!     }
//! }
//! env.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `tandem-core` | Sensor registry, dtypes, agent and command types |
//! | [`shm`] | `tandem-shm` | Named regions, control block, manifest, command channel |
//! | [`engine`] | `tandem-engine` | The control-process `Environment` |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Shared types (`tandem-core`).
///
/// Sensor kinds and the [`types::SensorRegistry`], agent definitions, and
/// the agent and world command vocabulary.
pub use tandem_core as types;

/// Shared-memory plumbing (`tandem-shm`).
///
/// [`shm::ShmArena`] and [`shm::BufferHandle`] for regions, plus the
/// protocol structures an engine implementation attaches to.
pub use tandem_shm as shm;

/// The control-process runtime (`tandem-engine`).
pub use tandem_engine as engine;

/// Common imports for typical usage.
///
/// ```rust
/// use tandem::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use tandem_core::{
        AgentDefinition, AgentKind, Command, ControlFlag, Dtype, SensorKind, SensorRegistry,
        TickId, Weather, WorldCommand,
    };

    // Errors
    pub use tandem_core::{AgentDefinitionError, CommandError, RegistryError};
    pub use tandem_engine::{ConfigError, EnvError};
    pub use tandem_shm::{BufferRef, ShmError};

    // Environment
    pub use tandem_engine::{
        AgentObservation, EnvConfig, EnvState, Environment, OwnedSnapshot, SensorView, Snapshot,
        StepMetrics, StepResult,
    };
}
