//! Typed, zero-copy views over a mapped region.

use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLockReadGuard;
use tandem_core::{Dtype, Shape};

use crate::error::ShmError;
use crate::raw;
use crate::region::Region;

/// A shaped view of one shared region.
///
/// Handles are cheap to clone and every clone, and every handle returned
/// by a repeated [`ShmArena::allocate`](crate::ShmArena::allocate) of the
/// same name, refers to the same mapping: writes through one are visible
/// through all of them.
///
/// Views returned by the `as_*` accessors alias memory the other process
/// may write. They describe a completed observation only between the end
/// of one tick and the start of the next. Within this process a view
/// borrows the region: writes through any handle fail with
/// [`ShmError::Busy`] until every view is dropped.
#[derive(Clone)]
pub struct BufferHandle {
    region: Arc<Region>,
    shape: Shape,
    dtype: Dtype,
}

impl BufferHandle {
    pub(crate) fn new(region: Arc<Region>, shape: Shape, dtype: Dtype) -> Self {
        Self {
            region,
            shape,
            dtype,
        }
    }

    /// Region name, e.g. `"uav0_LocationSensor"`.
    pub fn name(&self) -> &str {
        self.region.name()
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        self.region.path()
    }

    /// Element shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element dtype.
    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Size in bytes.
    pub fn byte_len(&self) -> usize {
        self.region.len()
    }

    /// Number of elements.
    pub fn element_count(&self) -> usize {
        tandem_core::dtype::element_count(&self.shape)
    }

    /// Address of the first byte. Stable for the life of the mapping.
    pub fn as_ptr(&self) -> *const u8 {
        self.region.map().as_ptr()
    }

    /// Whether `other` views the same mapping.
    pub fn same_region(&self, other: &BufferHandle) -> bool {
        Arc::ptr_eq(&self.region, &other.region)
    }

    /// Raw bytes, row-major.
    ///
    /// Fails with [`ShmError::AtomicRegion`] on a region claimed by a
    /// mailbox or the control block.
    pub fn as_bytes(&self) -> Result<BufferRef<'_, u8>, ShmError> {
        let (guard, bytes) = self.region.read()?;
        Ok(BufferRef::new(guard, bytes))
    }

    /// Elements of a `float32` buffer.
    pub fn as_f32(&self) -> Result<BufferRef<'_, f32>, ShmError> {
        self.expect_dtype(Dtype::F32)?;
        let (guard, bytes) = self.region.read()?;
        let values =
            bytemuck::try_cast_slice(bytes).map_err(|_| self.size_mismatch(bytes.len()))?;
        Ok(BufferRef::new(guard, values))
    }

    /// Elements of a `uint8` or `bool` buffer.
    pub fn as_u8(&self) -> Result<BufferRef<'_, u8>, ShmError> {
        match self.dtype {
            Dtype::U8 | Dtype::Bool => self.as_bytes(),
            actual => Err(ShmError::DtypeMismatch {
                name: self.name().to_string(),
                expected: Dtype::U8,
                actual,
            }),
        }
    }

    /// Overwrite the whole buffer with `src`.
    ///
    /// Fails with [`ShmError::Busy`] while any view of the region is alive
    /// in this process.
    pub fn write_bytes(&self, src: &[u8]) -> Result<(), ShmError> {
        if src.len() != self.byte_len() {
            return Err(self.size_mismatch(src.len()));
        }
        let _guard = self.region.write()?;
        raw::copy_in(self.region.map(), 0, src);
        Ok(())
    }

    /// Overwrite a `float32` buffer. `values` must have exactly
    /// [`element_count`](Self::element_count) entries.
    pub fn write_f32(&self, values: &[f32]) -> Result<(), ShmError> {
        self.expect_dtype(Dtype::F32)?;
        self.write_bytes(bytemuck::cast_slice(values))
    }

    /// Write `src` at byte `offset`. Used by framed regions.
    pub(crate) fn write_at(&self, offset: usize, src: &[u8]) -> Result<(), ShmError> {
        match offset.checked_add(src.len()) {
            Some(end) if end <= self.byte_len() => {
                let _guard = self.region.write()?;
                raw::copy_in(self.region.map(), offset, src);
                Ok(())
            }
            _ => Err(ShmError::Frame {
                name: self.name().to_string(),
                reason: format!(
                    "{} bytes at offset {offset} exceed region of {} bytes",
                    src.len(),
                    self.byte_len()
                ),
            }),
        }
    }

    /// Zero every byte.
    pub fn zero(&self) -> Result<(), ShmError> {
        let _guard = self.region.write()?;
        raw::fill(self.region.map(), 0, self.byte_len(), 0);
        Ok(())
    }

    /// Give the region over to atomic protocol words. Afterwards slice
    /// views and plain writes fail with [`ShmError::AtomicRegion`].
    pub(crate) fn claim_atomic(&self) -> Result<(), ShmError> {
        self.region.claim_atomic()
    }

    pub(crate) fn region(&self) -> &Region {
        &self.region
    }

    fn expect_dtype(&self, expected: Dtype) -> Result<(), ShmError> {
        if self.dtype == expected {
            Ok(())
        } else {
            Err(ShmError::DtypeMismatch {
                name: self.name().to_string(),
                expected,
                actual: self.dtype,
            })
        }
    }

    fn size_mismatch(&self, actual: usize) -> ShmError {
        ShmError::SizeMismatch {
            name: self.name().to_string(),
            expected: self.byte_len(),
            actual,
        }
    }
}

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferHandle")
            .field("name", &self.name())
            .field("shape", &&self.shape[..])
            .field("dtype", &self.dtype)
            .finish()
    }
}

/// A borrowed slice of a region. Holds the region's read guard, so no
/// in-process write can change the elements while it is alive.
pub struct BufferRef<'a, T> {
    _guard: RwLockReadGuard<'a, ()>,
    data: &'a [T],
}

impl<'a, T> BufferRef<'a, T> {
    fn new(guard: RwLockReadGuard<'a, ()>, data: &'a [T]) -> Self {
        Self {
            _guard: guard,
            data,
        }
    }
}

impl<T> Deref for BufferRef<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data
    }
}

impl<T> AsRef<[T]> for BufferRef<'_, T> {
    fn as_ref(&self) -> &[T] {
        self.data
    }
}

impl<T: fmt::Debug> fmt::Debug for BufferRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.data, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ShmArena, ShmConfig};

    #[test]
    fn live_view_blocks_writers_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = ShmArena::create(ShmConfig::new(dir.path(), "h")).unwrap();
        let h = arena.allocate("v", &[2], Dtype::F32).unwrap();
        let alias = h.clone();

        let view = h.as_f32().unwrap();
        assert!(matches!(alias.write_f32(&[5.0, 5.0]), Err(ShmError::Busy { .. })));
        assert!(matches!(h.zero(), Err(ShmError::Busy { .. })));
        // Readers stack.
        let again = alias.as_f32().unwrap();
        assert_eq!(&view[..], &[0.0, 0.0]);
        assert_eq!(&again[..], &[0.0, 0.0]);
        drop(view);
        drop(again);

        alias.write_f32(&[5.0, 5.0]).unwrap();
        assert_eq!(&h.as_f32().unwrap()[..], &[5.0, 5.0]);
    }

    #[test]
    fn element_count_follows_shape() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = ShmArena::create(ShmConfig::new(dir.path(), "h")).unwrap();
        let img = arena.allocate("img", &[4, 3, 4], Dtype::U8).unwrap();
        assert_eq!(img.element_count(), 48);
        let v = arena.allocate("v", &[2, 3], Dtype::F32).unwrap();
        assert_eq!(v.element_count(), 6);
        assert_eq!(v.as_f32().unwrap().len(), v.element_count());
    }

    #[test]
    fn atomic_region_refuses_slices_and_plain_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = ShmArena::create(ShmConfig::new(dir.path(), "h")).unwrap();
        let h = arena.allocate("flag", &[1], Dtype::U8).unwrap();
        {
            let _view = h.as_u8().unwrap();
            assert!(matches!(h.claim_atomic(), Err(ShmError::Busy { .. })));
        }
        h.claim_atomic().unwrap();
        h.claim_atomic().unwrap();
        assert!(matches!(h.as_bytes(), Err(ShmError::AtomicRegion { .. })));
        assert!(matches!(h.write_bytes(&[1]), Err(ShmError::AtomicRegion { .. })));
        let again = arena.get("flag").unwrap();
        assert!(matches!(again.as_u8(), Err(ShmError::AtomicRegion { .. })));
    }
}
