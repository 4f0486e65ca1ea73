//! Session arena: the bookkeeping owner of every mapped region.

use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tandem_core::{Dtype, Shape};

use crate::config::ShmConfig;
use crate::error::ShmError;
use crate::handle::BufferHandle;
use crate::region::Region;

/// Longest accepted buffer name. Keeps full file names under common
/// `NAME_MAX` limits once the session prefix is added.
const MAX_NAME_LEN: usize = 200;

/// Whether an arena created the session's regions or joined them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArenaMode {
    /// Control-process side. Unlinks the backing files on release.
    Owner,
    /// Engine side. Only unmaps on release.
    Attached,
}

struct Entry {
    region: Arc<Region>,
    shape: Shape,
    dtype: Dtype,
}

impl Entry {
    fn check(&self, name: &str, shape: &[usize], dtype: Dtype) -> Result<(), ShmError> {
        if self.shape.as_slice() == shape && self.dtype == dtype {
            return Ok(());
        }
        Err(ShmError::NameCollision {
            name: name.to_string(),
            existing_shape: self.shape.to_vec(),
            existing_dtype: self.dtype,
            requested_shape: shape.to_vec(),
            requested_dtype: dtype,
        })
    }
}

/// Allocates named regions and tracks every one it has issued.
///
/// Allocation is idempotent per name: asking again for the same
/// `(shape, dtype)` returns a handle to the same mapping, asking for a
/// different one is a [`ShmError::NameCollision`]. The arena releases each
/// region exactly once, either through [`release`](Self::release) or on
/// drop.
pub struct ShmArena {
    config: ShmConfig,
    mode: ArenaMode,
    regions: IndexMap<String, Entry>,
    released: bool,
}

impl ShmArena {
    /// Arena that owns the session's regions, creating the root directory
    /// if needed.
    pub fn create(config: ShmConfig) -> Result<Self, ShmError> {
        std::fs::create_dir_all(&config.root).map_err(|source| ShmError::Io {
            path: config.root.clone(),
            source,
        })?;
        tracing::debug!(
            root = %config.root.display(),
            session = %config.session,
            "arena created"
        );
        Ok(Self::with_mode(config, ArenaMode::Owner))
    }

    /// Arena that maps regions another process owns.
    pub fn attach(config: ShmConfig) -> Self {
        tracing::debug!(
            root = %config.root.display(),
            session = %config.session,
            "arena attached"
        );
        Self::with_mode(config, ArenaMode::Attached)
    }

    fn with_mode(config: ShmConfig, mode: ArenaMode) -> Self {
        Self {
            config,
            mode,
            regions: IndexMap::new(),
            released: false,
        }
    }

    /// Location and session identity.
    pub fn config(&self) -> &ShmConfig {
        &self.config
    }

    /// Owner or attached.
    pub fn mode(&self) -> ArenaMode {
        self.mode
    }

    /// Map `name` as `shape` elements of `dtype`.
    ///
    /// An owner arena creates a fresh zero-initialised file and refuses to
    /// adopt one already on disk ([`ShmError::RegionExists`]). An attached
    /// arena maps the owner's file, which must exist with the exact size.
    pub fn allocate(
        &mut self,
        name: &str,
        shape: &[usize],
        dtype: Dtype,
    ) -> Result<BufferHandle, ShmError> {
        if self.released {
            return Err(ShmError::Released);
        }
        validate_name(name)?;

        if let Some(entry) = self.regions.get(name) {
            entry.check(name, shape, dtype)?;
            return Ok(BufferHandle::new(
                Arc::clone(&entry.region),
                entry.shape.clone(),
                entry.dtype,
            ));
        }

        let len = match dtype.byte_len(shape) {
            Some(len) if len > 0 && !shape.is_empty() => len,
            _ => {
                return Err(ShmError::InvalidShape {
                    name: name.to_string(),
                    shape: shape.to_vec(),
                })
            }
        };

        let path = self.config.region_path(name);
        let region = match self.mode {
            ArenaMode::Owner => Region::create(&path, name, len)?,
            ArenaMode::Attached => Region::open(&path, name, len)?,
        };
        let region = Arc::new(region);
        let shape: Shape = SmallVec::from_slice(shape);
        tracing::trace!(name, ?shape, %dtype, len, "region mapped");
        self.regions.insert(
            name.to_string(),
            Entry {
                region: Arc::clone(&region),
                shape: shape.clone(),
                dtype,
            },
        );
        Ok(BufferHandle::new(region, shape, dtype))
    }

    /// Check that allocating `name` as `shape` elements of `dtype` would
    /// not collide, without mapping anything.
    pub fn check_compatible(
        &self,
        name: &str,
        shape: &[usize],
        dtype: Dtype,
    ) -> Result<(), ShmError> {
        if self.released {
            return Err(ShmError::Released);
        }
        validate_name(name)?;
        match self.regions.get(name) {
            Some(entry) => entry.check(name, shape, dtype),
            None => Ok(()),
        }
    }

    /// Handle for an already allocated region.
    pub fn get(&self, name: &str) -> Option<BufferHandle> {
        self.regions
            .get(name)
            .map(|e| BufferHandle::new(Arc::clone(&e.region), e.shape.clone(), e.dtype))
    }

    /// Whether `name` has been allocated.
    pub fn contains(&self, name: &str) -> bool {
        self.regions.contains_key(name)
    }

    /// Allocated names in allocation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    /// Number of live regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether no regions are live.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sum of all region sizes in bytes.
    pub fn total_bytes(&self) -> usize {
        self.regions.values().map(|e| e.region.len()).sum()
    }

    /// Whether [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release every region. An owner arena also unlinks the backing files.
    ///
    /// Returns the number of regions released; a second call releases
    /// nothing and returns 0. Handles still held elsewhere keep their
    /// mapping alive until dropped but their files are gone.
    pub fn release(&mut self) -> usize {
        if self.released {
            return 0;
        }
        self.released = true;
        let count = self.regions.len();
        for (name, entry) in self.regions.drain(..) {
            if self.mode == ArenaMode::Owner {
                if let Err(error) = entry.region.unlink() {
                    tracing::warn!(name = %name, %error, "failed to unlink region");
                }
            }
        }
        tracing::debug!(count, mode = ?self.mode, "arena released");
        count
    }
}

impl Drop for ShmArena {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ShmArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmArena")
            .field("session", &self.config.session)
            .field("mode", &self.mode)
            .field("regions", &self.regions.len())
            .field("released", &self.released)
            .finish()
    }
}

fn validate_name(name: &str) -> Result<(), ShmError> {
    let reason = if name.is_empty() {
        "empty"
    } else if name.len() > MAX_NAME_LEN {
        "too long"
    } else if name.contains(['/', '\\', '\0']) {
        "contains a path separator or NUL"
    } else if name == "." || name == ".." {
        "reserved path component"
    } else {
        return Ok(());
    };
    Err(ShmError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(dir: &tempfile::TempDir) -> ShmArena {
        ShmArena::create(ShmConfig::new(dir.path(), "t")).unwrap()
    }

    #[test]
    fn allocate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = arena(&dir);
        let h1 = a.allocate("x", &[3], Dtype::F32).unwrap();
        let h2 = a.allocate("x", &[3], Dtype::F32).unwrap();
        assert!(h1.same_region(&h2));
        assert_eq!(h1.as_ptr(), h2.as_ptr());
        h1.write_f32(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(&h2.as_f32().unwrap()[..], &[1.0, 2.0, 3.0]);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn conflicting_shape_collides() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = arena(&dir);
        a.allocate("x", &[3], Dtype::F32).unwrap();
        let err = a.allocate("x", &[4], Dtype::F32).unwrap_err();
        assert!(matches!(err, ShmError::NameCollision { .. }));
        let err = a.allocate("x", &[3], Dtype::U8).unwrap_err();
        assert!(matches!(err, ShmError::NameCollision { .. }));
        // The original mapping is untouched.
        assert_eq!(a.get("x").unwrap().shape(), &[3]);
        assert!(a.check_compatible("x", &[3], Dtype::F32).is_ok());
        assert!(a.check_compatible("x", &[2], Dtype::F32).is_err());
        assert!(a.check_compatible("fresh", &[2], Dtype::F32).is_ok());
    }

    #[test]
    fn new_regions_are_zeroed() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = arena(&dir);
        let h = a.allocate("img", &[4, 4, 4], Dtype::U8).unwrap();
        assert_eq!(h.byte_len(), 64);
        assert!(h.as_bytes().unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_bad_names_and_empty_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = arena(&dir);
        assert!(matches!(
            a.allocate("a/b", &[1], Dtype::U8),
            Err(ShmError::InvalidName { .. })
        ));
        assert!(matches!(
            a.allocate("", &[1], Dtype::U8),
            Err(ShmError::InvalidName { .. })
        ));
        assert!(matches!(
            a.allocate("z", &[0, 3], Dtype::F32),
            Err(ShmError::InvalidShape { .. })
        ));
        assert!(matches!(
            a.allocate("z", &[], Dtype::F32),
            Err(ShmError::InvalidShape { .. })
        ));
    }

    #[test]
    fn release_unlinks_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = arena(&dir);
        let h = a.allocate("x", &[2], Dtype::F32).unwrap();
        let path = h.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(a.release(), 1);
        assert!(!path.exists());
        assert_eq!(a.release(), 0);
        assert!(matches!(
            a.allocate("y", &[1], Dtype::U8),
            Err(ShmError::Released)
        ));
        // Outstanding handles keep their mapping.
        assert_eq!(&h.as_f32().unwrap()[..], &[0.0, 0.0]);
    }

    #[test]
    fn attached_release_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut owner = arena(&dir);
        let h = owner.allocate("x", &[2], Dtype::F32).unwrap();
        h.write_f32(&[5.0, 6.0]).unwrap();

        let mut engine = ShmArena::attach(ShmConfig::new(dir.path(), "t"));
        let seen = engine.allocate("x", &[2], Dtype::F32).unwrap();
        assert_eq!(&seen.as_f32().unwrap()[..], &[5.0, 6.0]);
        assert_eq!(engine.release(), 1);
        assert!(h.path().exists());
    }

    #[test]
    fn attach_with_wrong_size_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut owner = arena(&dir);
        owner.allocate("x", &[2], Dtype::F32).unwrap();
        let mut engine = ShmArena::attach(ShmConfig::new(dir.path(), "t"));
        assert!(matches!(
            engine.allocate("x", &[3], Dtype::F32),
            Err(ShmError::SizeMismatch { expected: 12, actual: 8, .. })
        ));
    }

    #[test]
    fn attach_to_missing_region_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = ShmArena::attach(ShmConfig::new(dir.path(), "t"));
        let err = engine.allocate("x", &[2], Dtype::F32).unwrap_err();
        assert!(matches!(err, ShmError::Io { .. }));
        assert!(!dir.path().join("tandem_t_x").exists());
    }

    #[test]
    fn owner_refuses_a_file_already_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = arena(&dir);
        let path = a.config().region_path("x");
        std::fs::write(&path, [0xAA; 8]).unwrap();
        let err = a.allocate("x", &[2], Dtype::F32).unwrap_err();
        assert!(matches!(err, ShmError::RegionExists { ref name, .. } if name == "x"));
        assert!(a.is_empty());
        // Releasing must not remove a file the arena never created.
        a.release();
        assert!(path.exists());
    }

    #[test]
    fn drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut a = arena(&dir);
            a.allocate("x", &[1], Dtype::U8).unwrap().path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
