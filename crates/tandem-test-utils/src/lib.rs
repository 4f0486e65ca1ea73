//! Test utilities for tandem development.
//!
//! Provides [`MockEngine`], an in-process stand-in for the simulation
//! engine that speaks the real shared-memory protocol on a background
//! thread, and small fixtures for building sessions in tests.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod mock;

pub use mock::{EngineEvent, MockEngine, MockEngineConfig, WorldState};

use tandem_core::{AgentDefinition, AgentKind, SensorKind};
use tandem_shm::ShmConfig;

/// A fresh session under a private temporary root.
///
/// The returned directory must outlive every arena using the config.
pub fn temp_session(session: &str) -> (tempfile::TempDir, ShmConfig) {
    let dir = tempfile::Builder::new()
        .prefix("tandem-test-")
        .tempdir()
        .unwrap_or_else(|e| panic!("failed to create temp dir: {e}"));
    let config = ShmConfig::new(dir.path(), session);
    (dir, config)
}

/// A UAV with a camera and velocity sensor.
pub fn uav(name: &str) -> AgentDefinition {
    AgentDefinition::new(
        name,
        AgentKind::Uav,
        vec![SensorKind::RgbCamera, SensorKind::Velocity],
    )
}

/// A UAV with location and velocity sensors only. Cheap to tick.
pub fn light_uav(name: &str) -> AgentDefinition {
    AgentDefinition::new(
        name,
        AgentKind::Uav,
        vec![SensorKind::Location, SensorKind::Velocity],
    )
}
