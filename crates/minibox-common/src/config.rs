//! Runtime configuration model.
//!
//! Every field has a documented default, so an empty JSON object (or no
//! file at all) yields the stock policy: cgroups under `/sys/fs/cgroup`,
//! namespace root mapped to host ID 100000 over a 65536-wide range.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{MiniboxError, Result};
use crate::types::{CpuMax, IdMapping, RunId};

/// Root configuration for the minibox runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Resource-control filesystem root.
    pub cgroup_root: PathBuf,
    /// Prefix of per-run resource group names.
    pub cgroup_prefix: String,
    /// UID/GID mapping applied to every container.
    pub id_mapping: IdMapping,
    /// Hostname set inside the UTS namespace.
    pub hostname: String,
    /// Jail path where the box directory is bound.
    pub box_mount_point: PathBuf,
    /// CPU bandwidth written when limiting is enabled without CPU flags.
    pub default_cpu_max: CpuMax,
    /// Bound on waiting for a killed container to be reaped, in milliseconds.
    pub kill_grace_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cgroup_root: PathBuf::from(constants::CGROUP_V2_PATH),
            cgroup_prefix: constants::DEFAULT_CGROUP_PREFIX.to_string(),
            id_mapping: IdMapping::default(),
            hostname: constants::DEFAULT_HOSTNAME.to_string(),
            box_mount_point: PathBuf::from(constants::DEFAULT_BOX_MOUNT_POINT),
            default_cpu_max: CpuMax {
                quota_us: constants::DEFAULT_CPU_QUOTA_US,
                period_us: constants::DEFAULT_CPU_PERIOD_US,
            },
            kill_grace_ms: constants::DEFAULT_KILL_GRACE_MS,
        }
    }
}

impl RuntimeConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or
    /// fails [`RuntimeConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| MiniboxError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from `path` when given, else from `$MINIBOX_CONFIG`, else
    /// returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a named configuration file cannot be loaded.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match std::env::var_os(constants::CONFIG_ENV) {
            Some(env_path) if !env_path.is_empty() => Self::load(Path::new(&env_path)),
            _ => Ok(Self::default()),
        }
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns a [`MiniboxError::Config`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.id_mapping.size == 0 {
            return Err(MiniboxError::Config {
                message: "id_mapping.size must be non-zero".into(),
            });
        }
        if self
            .id_mapping
            .host_base
            .checked_add(self.id_mapping.size)
            .is_none()
        {
            return Err(MiniboxError::Config {
                message: "id_mapping range overflows the ID space".into(),
            });
        }
        if self.hostname.is_empty() {
            return Err(MiniboxError::Config {
                message: "hostname must not be empty".into(),
            });
        }
        if !self.box_mount_point.is_absolute() {
            return Err(MiniboxError::Config {
                message: format!(
                    "box_mount_point must be absolute: {}",
                    self.box_mount_point.display()
                ),
            });
        }
        if self.cgroup_prefix.is_empty() || self.cgroup_prefix.contains('/') {
            return Err(MiniboxError::Config {
                message: format!("invalid cgroup_prefix: {:?}", self.cgroup_prefix),
            });
        }
        Ok(())
    }

    /// Path of the resource group owned by `run_id`.
    #[must_use]
    pub fn cgroup_path(&self, run_id: &RunId) -> PathBuf {
        self.cgroup_root
            .join(format!("{}-{}", self.cgroup_prefix, run_id))
    }
}
