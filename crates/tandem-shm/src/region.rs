//! One named, file-backed mapping.

use std::fs::{File, OpenOptions};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use memmap2::{MmapOptions, MmapRaw};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::ShmError;
use crate::raw;

/// A mapped region. Shared between handles via `Arc`; unmapped when the
/// last reference drops.
///
/// In-process access is arbitrated by `borrows`: every slice view holds a
/// shared guard and every plain write needs the exclusive one. Once a
/// protocol structure claims the region for atomics, slice views and plain
/// writes are refused for good.
pub(crate) struct Region {
    name: String,
    path: PathBuf,
    map: MmapRaw,
    borrows: RwLock<()>,
    atomic: AtomicBool,
}

impl Region {
    /// Create the backing file at `path` and map `len` zeroed bytes.
    ///
    /// The file must not exist yet. A leftover from a crashed session, or
    /// a second live owner with the same session id, is
    /// [`ShmError::RegionExists`].
    pub(crate) fn create(path: &Path, name: &str, len: usize) -> Result<Self, ShmError> {
        let file = match open_rw(path, true) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ShmError::RegionExists {
                    name: name.to_string(),
                    path: path.to_path_buf(),
                });
            }
            Err(source) => return Err(io_error(path, source)),
        };
        // set_len zero-fills.
        file.set_len(len as u64).map_err(|e| io_error(path, e))?;
        Self::map_file(file, path, name, len)
    }

    /// Map the existing backing file at `path`, which must be exactly
    /// `len` bytes: any other size means the owner sized it from a
    /// different layout.
    pub(crate) fn open(path: &Path, name: &str, len: usize) -> Result<Self, ShmError> {
        let file = open_rw(path, false).map_err(|e| io_error(path, e))?;
        let actual = file.metadata().map_err(|e| io_error(path, e))?.len() as usize;
        if actual != len {
            return Err(ShmError::SizeMismatch {
                name: name.to_string(),
                expected: len,
                actual,
            });
        }
        Self::map_file(file, path, name, len)
    }

    fn map_file(file: File, path: &Path, name: &str, len: usize) -> Result<Self, ShmError> {
        let map = MmapOptions::new()
            .len(len)
            .map_raw(&file)
            .map_err(|e| io_error(path, e))?;
        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            map,
            borrows: RwLock::new(()),
            atomic: AtomicBool::new(false),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn map(&self) -> &MmapRaw {
        &self.map
    }

    /// Whether the region has been claimed for atomic access.
    pub(crate) fn is_atomic(&self) -> bool {
        self.atomic.load(Ordering::Acquire)
    }

    /// Borrow the whole mapping as bytes. The guard keeps in-process
    /// writers out until it drops.
    pub(crate) fn read(&self) -> Result<(RwLockReadGuard<'_, ()>, &[u8]), ShmError> {
        let guard = self.borrows.read_recursive();
        if self.is_atomic() {
            return Err(ShmError::AtomicRegion {
                name: self.name.clone(),
            });
        }
        Ok((guard, raw::bytes(&self.map)))
    }

    /// Exclusive access for a plain write. Fails instead of blocking while
    /// any view is alive, so a thread holding a view cannot deadlock on its
    /// own write.
    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, ()>, ShmError> {
        let guard = self.borrows.try_write().ok_or_else(|| ShmError::Busy {
            name: self.name.clone(),
        })?;
        if self.is_atomic() {
            return Err(ShmError::AtomicRegion {
                name: self.name.clone(),
            });
        }
        Ok(guard)
    }

    /// Hand the region over to atomic access. Idempotent; fails while a
    /// view is alive.
    pub(crate) fn claim_atomic(&self) -> Result<(), ShmError> {
        if self.is_atomic() {
            return Ok(());
        }
        let _guard = self.borrows.try_write().ok_or_else(|| ShmError::Busy {
            name: self.name.clone(),
        })?;
        self.atomic.store(true, Ordering::Release);
        Ok(())
    }

    /// Remove the backing file. The mapping stays valid until dropped.
    pub(crate) fn unlink(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

fn open_rw(path: &Path, create: bool) -> std::io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create_new(create);
    #[cfg(unix)]
    opts.mode(0o600);
    opts.open(path)
}

fn io_error(path: &Path, source: std::io::Error) -> ShmError {
    ShmError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("len", &self.map.len())
            .field("atomic", &self.is_atomic())
            .finish()
    }
}
