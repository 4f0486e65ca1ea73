//! Pointer-level access to mapped regions.
//!
//! Every `unsafe` block in the workspace lives here. Each function takes a
//! `&MmapRaw` and bounds-checks before touching memory. Within a process,
//! `Region` serialises access: slices only under its read guard, plain
//! writes only under its write guard, and atomics only once the region is
//! claimed for them. Across processes the protocol rule applies:
//! engine-written bytes are read only after the engine signals tick
//! completion, and control-written bytes are written only before
//! commands-ready is signalled.

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8};

use memmap2::MmapRaw;

/// The whole mapping as bytes.
pub(crate) fn bytes(map: &MmapRaw) -> &[u8] {
    // SAFETY: the mapping is `map.len()` readable bytes and stays mapped for
    // the lifetime of `map`. Another process may write concurrently; the tick
    // handshake keeps those writes outside the window in which views are read.
    unsafe { std::slice::from_raw_parts(map.as_ptr(), map.len()) }
}

/// Copy `src` into the mapping at `offset`.
///
/// # Panics
///
/// Panics if the write would run past the end of the mapping.
pub(crate) fn copy_in(map: &MmapRaw, offset: usize, src: &[u8]) {
    let end = offset.checked_add(src.len()).expect("offset overflow");
    assert!(end <= map.len(), "write past end of mapping");
    // SAFETY: bounds checked above. `ptr::copy` permits `src` to overlap
    // the destination.
    unsafe {
        std::ptr::copy(src.as_ptr(), map.as_mut_ptr().add(offset), src.len());
    }
}

/// Fill `len` bytes at `offset` with `value`.
///
/// # Panics
///
/// Panics if the range runs past the end of the mapping.
pub(crate) fn fill(map: &MmapRaw, offset: usize, len: usize, value: u8) {
    let end = offset.checked_add(len).expect("offset overflow");
    assert!(end <= map.len(), "fill past end of mapping");
    // SAFETY: bounds checked above.
    unsafe {
        std::ptr::write_bytes(map.as_mut_ptr().add(offset), value, len);
    }
}

fn checked_ptr(map: &MmapRaw, offset: usize, size: usize) -> *mut u8 {
    assert!(offset % size == 0, "misaligned atomic offset {offset}");
    assert!(
        offset.checked_add(size).is_some_and(|end| end <= map.len()),
        "atomic past end of mapping"
    );
    // Mappings are page aligned, so an offset aligned to `size` yields an
    // address aligned to `size`.
    debug_assert_eq!(map.as_ptr() as usize % size, 0);
    // SAFETY: in bounds, checked above.
    unsafe { map.as_mut_ptr().add(offset) }
}

/// A 64-bit atomic word inside the mapping.
pub(crate) fn atomic_u64(map: &MmapRaw, offset: usize) -> &AtomicU64 {
    let ptr = checked_ptr(map, offset, 8);
    // SAFETY: aligned and in bounds; AtomicU64 has the same layout as u64 and
    // all cross-process access to this word goes through atomics.
    unsafe { AtomicU64::from_ptr(ptr.cast()) }
}

/// A 32-bit atomic word inside the mapping.
pub(crate) fn atomic_u32(map: &MmapRaw, offset: usize) -> &AtomicU32 {
    let ptr = checked_ptr(map, offset, 4);
    // SAFETY: as for `atomic_u64`.
    unsafe { AtomicU32::from_ptr(ptr.cast()) }
}

/// A single atomic byte inside the mapping.
pub(crate) fn atomic_u8(map: &MmapRaw, offset: usize) -> &AtomicU8 {
    let ptr = checked_ptr(map, offset, 1);
    // SAFETY: in bounds; bytes are always aligned.
    unsafe { AtomicU8::from_ptr(ptr) }
}
