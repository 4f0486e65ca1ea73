//! Environment configuration, loadable from TOML with environment
//! variable overrides.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_core::{RegistryError, SensorKind, SensorRegistry};
use tandem_shm::{ShmConfig, DEFAULT_COMMAND_BYTES, DEFAULT_MANIFEST_BYTES};
use thiserror::Error;

/// Overrides [`EnvConfig::shm_root`].
pub const ENV_SHM_ROOT: &str = "TANDEM_SHM_ROOT";
/// Overrides [`EnvConfig::tick_timeout_ms`].
pub const ENV_TICK_TIMEOUT_MS: &str = "TANDEM_TICK_TIMEOUT_MS";

/// Smallest accepted command region: a frame header plus an empty batch.
pub const MIN_COMMAND_BYTES: usize = 64;
/// Smallest accepted manifest region: a frame header plus a manifest with
/// room for roughly one agent.
pub const MIN_MANIFEST_BYTES: usize = 1024;

// ── ConfigError ────────────────────────────────────────────────

/// Why an [`EnvConfig`] could not be loaded or used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("reading {path}: {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The TOML is malformed or has unknown keys.
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    /// An environment variable override could not be parsed.
    #[error("{var}={value:?} is not valid: {reason}")]
    InvalidOverride {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// What was wrong.
        reason: String,
    },
    /// A timeout is zero.
    #[error("{field} must be at least 1 ms")]
    ZeroTimeout {
        /// The offending field.
        field: &'static str,
    },
    /// A session region is too small for its frame, or its size does
    /// not fit the control block's `u32` word.
    #[error("{field} {bytes} is outside {min}..=u32::MAX")]
    RegionSize {
        /// The offending field.
        field: &'static str,
        /// The configured size.
        bytes: usize,
        /// Smallest accepted size.
        min: usize,
    },
    /// The session id cannot be embedded in a region name.
    #[error("invalid session id {session:?}: {reason}")]
    InvalidSession {
        /// The session id.
        session: String,
        /// What was wrong.
        reason: &'static str,
    },
    /// A camera shape override is invalid.
    #[error("invalid camera shape: {0}")]
    CameraShape(#[from] RegistryError),
    /// `reset_min_ticks` is zero.
    #[error("reset_min_ticks must be at least 1")]
    ZeroResetTicks,
}

// ── EnvConfig ──────────────────────────────────────────────────

/// Everything an [`Environment`](crate::Environment) needs besides its
/// agent definitions.
///
/// Every field has a default, so a TOML file only lists what it changes:
///
/// ```toml
/// tick_timeout_ms = 2000
/// camera_shape = [128, 128, 4]
/// default_agent = "uav0"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvConfig {
    /// Directory holding the region files. Default: `/dev/shm` where it
    /// exists, else the OS temp directory.
    pub shm_root: PathBuf,
    /// Session identifier shared with the engine. Default: a fresh UUID v4.
    pub session_id: String,
    /// Deadline for one engine round. Default: 5000.
    pub tick_timeout_ms: u64,
    /// Deadline for the engine's manifest verdict. Default: 5000.
    pub manifest_timeout_ms: u64,
    /// Wait for the engine to accept the manifest before returning from
    /// construction. Default: true.
    pub require_manifest_ack: bool,
    /// `[h, w, 4]` for `ViewportCapture`. Default: registry shape.
    pub viewport_shape: Option<[usize; 3]>,
    /// `[h, w, 4]` for `RGBCamera`. Default: registry shape.
    pub camera_shape: Option<[usize; 3]>,
    /// Agent targeted by `step`. Default: the first agent.
    pub default_agent: Option<String>,
    /// Lower bound on the ticks a world reset costs. Default: 1.
    pub reset_min_ticks: u64,
    /// Capacity of the world command channel. Default: 1 MiB.
    pub command_region_bytes: usize,
    /// Capacity of the manifest region. Every spawn republishes the whole
    /// manifest, so sessions with many agents need more. Default: 256 KiB.
    pub manifest_region_bytes: usize,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            shm_root: ShmConfig::default_root(),
            session_id: uuid::Uuid::new_v4().to_string(),
            tick_timeout_ms: 5000,
            manifest_timeout_ms: 5000,
            require_manifest_ack: true,
            viewport_shape: None,
            camera_shape: None,
            default_agent: None,
            reset_min_ticks: 1,
            command_region_bytes: DEFAULT_COMMAND_BYTES,
            manifest_region_bytes: DEFAULT_MANIFEST_BYTES,
        }
    }
}

impl EnvConfig {
    /// Parse from TOML. Environment variables are not consulted.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read `path`, parse it, then apply environment variable overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `TANDEM_SHM_ROOT` and `TANDEM_TICK_TIMEOUT_MS` from the
    /// process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(root) = lookup(ENV_SHM_ROOT) {
            self.shm_root = PathBuf::from(root);
        }
        if let Some(value) = lookup(ENV_TICK_TIMEOUT_MS) {
            self.tick_timeout_ms =
                value
                    .trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidOverride {
                        var: ENV_TICK_TIMEOUT_MS,
                        value: value.clone(),
                        reason: e.to_string(),
                    })?;
        }
        Ok(())
    }

    /// Check every invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "tick_timeout_ms",
            });
        }
        if self.manifest_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "manifest_timeout_ms",
            });
        }
        if self.reset_min_ticks == 0 {
            return Err(ConfigError::ZeroResetTicks);
        }
        region_word("command_region_bytes", self.command_region_bytes, MIN_COMMAND_BYTES)?;
        region_word("manifest_region_bytes", self.manifest_region_bytes, MIN_MANIFEST_BYTES)?;
        validate_session(&self.session_id)?;
        self.registry()?;
        Ok(())
    }

    /// Deadline for one round.
    pub fn tick_timeout(&self) -> Duration {
        Duration::from_millis(self.tick_timeout_ms)
    }

    /// Deadline for the manifest verdict.
    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_millis(self.manifest_timeout_ms)
    }

    /// Where and under which session the regions live.
    pub fn shm_config(&self) -> ShmConfig {
        ShmConfig::new(&self.shm_root, &self.session_id)
    }

    /// A sensor registry with the configured camera shapes applied.
    pub fn registry(&self) -> Result<SensorRegistry, RegistryError> {
        let mut registry = SensorRegistry::new();
        for (kind, shape) in [
            (SensorKind::ViewportCapture, self.viewport_shape),
            (SensorKind::RgbCamera, self.camera_shape),
        ] {
            if let Some(shape) = shape {
                registry.set_dynamic_shape(kind.id(), &shape)?;
            }
        }
        Ok(registry)
    }
}

impl fmt::Display for EnvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session {} under {} (tick timeout {} ms)",
            self.session_id,
            self.shm_root.display(),
            self.tick_timeout_ms
        )
    }
}

/// `bytes` as the `u32` the control block records, if it is at least `min`.
pub(crate) fn region_word(
    field: &'static str,
    bytes: usize,
    min: usize,
) -> Result<u32, ConfigError> {
    match u32::try_from(bytes) {
        Ok(word) if bytes >= min => Ok(word),
        _ => Err(ConfigError::RegionSize { field, bytes, min }),
    }
}

fn validate_session(session: &str) -> Result<(), ConfigError> {
    let reason = if session.is_empty() {
        "empty"
    } else if session.len() > 64 {
        "longer than 64 characters"
    } else if !session
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        "only ASCII alphanumerics, '-' and '_' are allowed"
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidSession {
        session: session.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let c = EnvConfig::default();
        c.validate().unwrap();
        assert_eq!(c.tick_timeout(), Duration::from_secs(5));
        assert!(c.require_manifest_ack);
        assert_eq!(c.session_id.len(), 36);
    }

    #[test]
    fn sessions_are_unique() {
        assert_ne!(EnvConfig::default().session_id, EnvConfig::default().session_id);
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let c = EnvConfig::from_toml_str(
            r#"
            session_id = "run-7"
            tick_timeout_ms = 250
            camera_shape = [64, 32, 4]
            default_agent = "uav0"
            manifest_region_bytes = 1048576
            "#,
        )
        .unwrap();
        assert_eq!(c.session_id, "run-7");
        assert_eq!(c.tick_timeout_ms, 250);
        assert_eq!(c.manifest_timeout_ms, 5000);
        assert_eq!(c.default_agent.as_deref(), Some("uav0"));
        assert_eq!(c.manifest_region_bytes, 1 << 20);
        assert_eq!(c.command_region_bytes, DEFAULT_COMMAND_BYTES);
        let reg = c.registry().unwrap();
        assert_eq!(reg.shape(SensorKind::RgbCamera), &[64, 32, 4]);
        assert_eq!(reg.shape(SensorKind::ViewportCapture), &[512, 512, 4]);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(matches!(
            EnvConfig::from_toml_str("tick_timeout = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn overrides_apply_from_lookup() {
        let mut c = EnvConfig::default();
        c.apply_overrides(|var| match var {
            ENV_SHM_ROOT => Some("/tmp/elsewhere".into()),
            ENV_TICK_TIMEOUT_MS => Some(" 42 ".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(c.shm_root, PathBuf::from("/tmp/elsewhere"));
        assert_eq!(c.tick_timeout_ms, 42);

        let err = c
            .apply_overrides(|var| (var == ENV_TICK_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    fn region_sizes_must_fit_a_control_word() {
        assert_eq!(region_word("command_region_bytes", 1024, 64).unwrap(), 1024);
        assert!(matches!(
            region_word("manifest_region_bytes", u32::MAX as usize + 1, 1024),
            Err(ConfigError::RegionSize { field: "manifest_region_bytes", .. })
        ));
        assert!(matches!(
            region_word("manifest_region_bytes", 100, 1024),
            Err(ConfigError::RegionSize { min: 1024, .. })
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.toml");
        std::fs::write(&path, "reset_min_ticks = 3\n").unwrap();
        let c = EnvConfig::load(&path).unwrap();
        assert_eq!(c.reset_min_ticks, 3);
        assert!(matches!(
            EnvConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn validation_catches_each_invariant() {
        let bad = [
            EnvConfig { tick_timeout_ms: 0, ..Default::default() },
            EnvConfig { manifest_timeout_ms: 0, ..Default::default() },
            EnvConfig { reset_min_ticks: 0, ..Default::default() },
            EnvConfig { command_region_bytes: 8, ..Default::default() },
            EnvConfig { manifest_region_bytes: 512, ..Default::default() },
            EnvConfig { manifest_region_bytes: u32::MAX as usize + 1, ..Default::default() },
            EnvConfig { session_id: "a/b".into(), ..Default::default() },
            EnvConfig { session_id: String::new(), ..Default::default() },
            EnvConfig { camera_shape: Some([64, 64, 3]), ..Default::default() },
        ];
        for c in bad {
            assert!(c.validate().is_err(), "{c:?} should be invalid");
        }
    }
}
