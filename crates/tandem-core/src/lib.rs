//! Core types shared by both sides of a tandem session.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! pieces the control process and the simulation engine must agree on
//! without negotiating them: element dtypes and shapes, the sensor
//! registry, agent definitions, tick ids, and the command vocabulary.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod agent;
pub mod command;
pub mod dtype;
pub mod error;
pub mod id;
pub mod sensor;

pub use agent::{AgentDefinition, AgentKind};
pub use command::{
    AgentCommand, Command, ControlFlag, SpawnRequest, TeleportRequest, Weather, WireCommand,
    WorldCommand, WorldProperty,
};
pub use dtype::{Dtype, Shape};
pub use error::{AgentDefinitionError, CommandError, RegistryError};
pub use id::TickId;
pub use sensor::{SensorDescriptor, SensorKind, SensorRegistry};
