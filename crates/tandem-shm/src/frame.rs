//! Length-prefixed frames in a fixed-size region.
//!
//! Layout: `u32` little-endian payload length, then the payload. A length
//! of zero is an empty frame.

use crate::error::ShmError;
use crate::handle::BufferHandle;

const HEADER: usize = 4;

/// Largest payload `handle` can carry.
pub(crate) fn capacity(handle: &BufferHandle) -> usize {
    handle.byte_len().saturating_sub(HEADER)
}

/// Replace the frame in `handle` with `payload`.
pub(crate) fn write_frame(handle: &BufferHandle, payload: &[u8]) -> Result<(), ShmError> {
    let cap = capacity(handle);
    if payload.len() > cap || u32::try_from(payload.len()).is_err() {
        return Err(ShmError::Frame {
            name: handle.name().to_string(),
            reason: format!("payload of {} bytes exceeds capacity {cap}", payload.len()),
        });
    }
    handle.write_at(HEADER, payload)?;
    handle.write_at(0, &(payload.len() as u32).to_le_bytes())
}

/// Mark the frame in `handle` empty.
pub(crate) fn clear_frame(handle: &BufferHandle) -> Result<(), ShmError> {
    handle.write_at(0, &0u32.to_le_bytes())
}

/// Copy the current payload out of `handle`.
pub(crate) fn read_frame(handle: &BufferHandle) -> Result<Vec<u8>, ShmError> {
    let bytes = handle.as_bytes()?;
    let Some(header) = bytes.get(..HEADER) else {
        return Err(ShmError::Frame {
            name: handle.name().to_string(),
            reason: "region smaller than frame header".to_string(),
        });
    };
    let mut len = [0u8; HEADER];
    len.copy_from_slice(header);
    let len = u32::from_le_bytes(len) as usize;
    match bytes.get(HEADER..HEADER + len) {
        Some(payload) => Ok(payload.to_vec()),
        None => Err(ShmError::Frame {
            name: handle.name().to_string(),
            reason: format!("length {len} exceeds capacity {}", capacity(handle)),
        }),
    }
}
