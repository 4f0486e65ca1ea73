//! Where a session's regions live and how they are named on disk.

use std::path::{Path, PathBuf};

/// Location and identity of one session's shared memory.
///
/// Both processes must be given the same `root` and `session` to see the
/// same regions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShmConfig {
    /// Directory holding the backing files.
    pub root: PathBuf,
    /// Session identifier, usually a UUID, embedded in every file name.
    pub session: String,
}

impl ShmConfig {
    /// Create a config for `session` under `root`.
    pub fn new(root: impl Into<PathBuf>, session: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            session: session.into(),
        }
    }

    /// `/dev/shm` where it exists, otherwise the OS temp directory.
    pub fn default_root() -> PathBuf {
        let dev_shm = Path::new("/dev/shm");
        if dev_shm.is_dir() {
            dev_shm.to_path_buf()
        } else {
            std::env::temp_dir()
        }
    }

    /// Backing file for the region called `name`.
    pub fn region_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("tandem_{}_{}", self.session, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_path_embeds_session_and_name() {
        let cfg = ShmConfig::new("/tmp/x", "abc");
        assert_eq!(
            cfg.region_path("uav0_LocationSensor"),
            PathBuf::from("/tmp/x/tandem_abc_uav0_LocationSensor")
        );
    }
}
