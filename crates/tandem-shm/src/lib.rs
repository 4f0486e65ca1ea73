//! Named shared-memory regions for tandem sessions.
//!
//! Every buffer the control process and the engine exchange is a
//! file-backed mapping named `tandem_{session}_{name}` under a shared root
//! (`/dev/shm` on Linux). This crate owns creating, mapping, viewing and
//! releasing those regions, plus the small protocol structures built on
//! top of them.
//!
//! # Architecture
//!
//! ```text
//! ShmArena (one per process per session)
//! ├── Region × N          (MmapRaw over a named file, Arc-shared by handles)
//! │   └── BufferHandle     (shape + dtype view of one region)
//! ├── ControlBlock         ("__control": handshake sequence words)
//! ├── Manifest             ("__manifest": expected name/shape/dtype triples)
//! └── CommandChannel       ("__commands": JSON world commands per tick)
//! ```
//!
//! The owning arena (the control process) unlinks every region it created
//! exactly once on [`ShmArena::release`]. An arena opened with
//! [`ShmArena::attach`] (the engine side) only unmaps.
//!
//! This crate is the only one in the workspace that contains `unsafe`
//! code, all of it in the private `raw` module.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod arena;
pub mod channel;
pub mod config;
pub mod control;
pub mod error;
mod frame;
pub mod handle;
pub mod mailbox;
pub mod manifest;
pub mod naming;
mod raw;
mod region;

pub use arena::{ArenaMode, ShmArena};
pub use channel::{CommandChannel, DEFAULT_COMMAND_BYTES};
pub use config::ShmConfig;
pub use control::{ControlBlock, ControlEndpoint, EngineEndpoint, ManifestStatus, CONTROL_BYTES};
pub use error::ShmError;
pub use handle::{BufferHandle, BufferRef};
pub use mailbox::Mailbox;
pub use manifest::{agent_layout, Manifest, ManifestEntry, DEFAULT_MANIFEST_BYTES};
