//! Shared-memory error types.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tandem_core::Dtype;
use thiserror::Error;

/// Errors from region allocation, mapping, and the protocol structures
/// stored in shared memory.
#[derive(Debug, Error)]
pub enum ShmError {
    /// A name already maps to a region of a different shape or dtype.
    #[error(
        "buffer '{name}' already allocated as {existing_dtype}{existing_shape:?}, \
         requested {requested_dtype}{requested_shape:?}"
    )]
    NameCollision {
        /// The colliding name.
        name: String,
        /// Shape of the existing region.
        existing_shape: Vec<usize>,
        /// Dtype of the existing region.
        existing_dtype: Dtype,
        /// Shape of the rejected request.
        requested_shape: Vec<usize>,
        /// Dtype of the rejected request.
        requested_dtype: Dtype,
    },
    /// The buffer name cannot be used as a file name.
    #[error("invalid buffer name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// The shape describes zero bytes, or overflows.
    #[error("buffer '{name}' has unusable shape {shape:?}")]
    InvalidShape {
        /// The buffer name.
        name: String,
        /// The rejected shape.
        shape: Vec<usize>,
    },
    /// A backing file exists with a different length than expected.
    #[error("buffer '{name}' is {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// The buffer name.
        name: String,
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },
    /// An owner arena found a backing file already on disk: a leftover
    /// from an earlier run, or another live session with the same id.
    #[error("buffer '{name}' already exists at {path}")]
    RegionExists {
        /// The buffer name.
        name: String,
        /// The existing backing file.
        path: PathBuf,
    },
    /// A plain write was attempted while a view of the region is alive.
    #[error("buffer '{name}' is borrowed by a live view")]
    Busy {
        /// The buffer name.
        name: String,
    },
    /// The region holds protocol words and is only reachable through
    /// atomics.
    #[error("buffer '{name}' is reserved for atomic access")]
    AtomicRegion {
        /// The buffer name.
        name: String,
    },
    /// Typed access with the wrong dtype or element count.
    #[error("buffer '{name}' holds {actual}, accessed as {expected}")]
    DtypeMismatch {
        /// The buffer name.
        name: String,
        /// Dtype the caller asked for.
        expected: Dtype,
        /// Dtype of the buffer.
        actual: Dtype,
    },
    /// The arena has already released its regions.
    #[error("shared memory arena already released")]
    Released,
    /// Opening, sizing, or mapping a backing file failed.
    #[error("shared memory i/o on {path}: {source}")]
    Io {
        /// The backing file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// The session control block is missing its header or has the wrong
    /// protocol version.
    #[error("bad control block: {reason}")]
    BadControlBlock {
        /// What was wrong.
        reason: String,
    },
    /// A length-prefixed frame does not fit its region or is corrupt.
    #[error("frame in '{name}': {reason}")]
    Frame {
        /// The region holding the frame.
        name: String,
        /// What was wrong.
        reason: String,
    },
    /// Manifest or command JSON could not be encoded or decoded.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The other side did not respond within the deadline.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout {
        /// What was being waited for.
        what: &'static str,
        /// How long the wait lasted.
        waited: Duration,
    },
}
