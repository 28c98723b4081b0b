//! Domain primitive types used across the minibox workspace.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_HOST_ID_BASE, DEFAULT_ID_RANGE};
use crate::error::{MiniboxError, Result};

/// Unique identifier for one container run.
///
/// Resource groups are named after it so that overlapping runs never
/// share accounting state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Creates a run ID from a caller-supplied value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty or contains characters that
    /// are not valid in a cgroup directory name.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && id != "."
            && id != "..";
        if !valid {
            return Err(MiniboxError::Config {
                message: format!("invalid run id: {id:?}"),
            });
        }
        Ok(Self(id))
    }

    /// Generates a random run ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CPU bandwidth: `quota_us` of CPU time allowed per `period_us` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuMax {
    /// Allotted CPU time per period, in microseconds.
    pub quota_us: u64,
    /// Period length, in microseconds.
    pub period_us: u64,
}

impl CpuMax {
    /// Returns whether both halves of the pair are set.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.quota_us > 0 && self.period_us > 0
    }
}

impl fmt::Display for CpuMax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.quota_us, self.period_us)
    }
}

/// Resource limits for a container. Zero means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory ceiling in bytes.
    pub memory_bytes: u64,
    /// CPU bandwidth pair.
    pub cpu: Option<CpuMax>,
    /// Maximum number of live processes and threads.
    pub pid_limit: u64,
}

impl ResourceLimits {
    /// Returns whether no limit at all is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory_bytes == 0 && self.pid_limit == 0 && !self.cpu.is_some_and(|c| c.is_set())
    }
}

/// Contiguous ID range mapping the namespace root (ID 0) onto the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdMapping {
    /// Host-side ID that ID 0 inside the namespace maps to.
    pub host_base: u32,
    /// Number of IDs in the range.
    pub size: u32,
}

impl IdMapping {
    /// Renders the mapping in `/proc/<pid>/uid_map` line format.
    #[must_use]
    pub fn map_line(&self) -> String {
        format!("0 {} {}", self.host_base, self.size)
    }
}

impl Default for IdMapping {
    fn default() -> Self {
        Self {
            host_base: DEFAULT_HOST_ID_BASE,
            size: DEFAULT_ID_RANGE,
        }
    }
}

/// Immutable descriptor of one container invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    run_id: RunId,
    rootfs: PathBuf,
    box_dir: Option<PathBuf>,
    limits: Option<ResourceLimits>,
    time_limit: Duration,
    command: Vec<String>,
}

impl LaunchRequest {
    /// Creates a request to run `command` (program followed by its
    /// arguments) inside `rootfs`, with no limits and no time bound.
    #[must_use]
    pub fn new(rootfs: impl Into<PathBuf>, command: Vec<String>) -> Self {
        Self {
            run_id: RunId::generate(),
            rootfs: rootfs.into(),
            box_dir: None,
            limits: None,
            time_limit: Duration::ZERO,
            command,
        }
    }

    /// Binds `dir` into the jail as the working directory.
    #[must_use]
    pub fn with_box(mut self, dir: impl Into<PathBuf>) -> Self {
        self.box_dir = Some(dir.into());
        self
    }

    /// Enables resource limiting with the given limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Sets the wall-clock time limit. Zero waits without bound.
    #[must_use]
    pub const fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    /// Replaces the generated run ID with a caller-supplied one.
    #[must_use]
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    /// Checks that the request can be launched.
    ///
    /// # Errors
    ///
    /// Returns a [`MiniboxError::Config`] if the rootfs is empty or not a
    /// directory, the box directory does not exist, or the command is empty.
    pub fn validate(&self) -> Result<()> {
        if self.rootfs.as_os_str().is_empty() {
            return Err(MiniboxError::Config {
                message: "rootfs is required".into(),
            });
        }
        if !self.rootfs.is_dir() {
            return Err(MiniboxError::Config {
                message: format!("rootfs {} is not a directory", self.rootfs.display()),
            });
        }
        if let Some(dir) = &self.box_dir {
            if !dir.is_dir() {
                return Err(MiniboxError::Config {
                    message: format!("box directory {} is not a directory", dir.display()),
                });
            }
        }
        match self.command.first() {
            Some(program) if !program.is_empty() => Ok(()),
            _ => Err(MiniboxError::Config {
                message: "command is required".into(),
            }),
        }
    }

    /// Identifier of this run.
    #[must_use]
    pub const fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Root filesystem directory.
    #[must_use]
    pub fn rootfs(&self) -> &Path {
        &self.rootfs
    }

    /// Auxiliary directory bound into the jail, if any.
    #[must_use]
    pub fn box_dir(&self) -> Option<&Path> {
        self.box_dir.as_deref()
    }

    /// Resource limits, when limiting is requested.
    #[must_use]
    pub const fn limits(&self) -> Option<&ResourceLimits> {
        self.limits.as_ref()
    }

    /// Wall-clock time limit; zero means unbounded.
    #[must_use]
    pub const fn time_limit(&self) -> Duration {
        self.time_limit
    }

    /// Program followed by its arguments.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_run_ids_are_unique_and_valid() {
        let a = RunId::generate();
        let b = RunId::generate();
        assert_ne!(a, b);
        assert!(RunId::new(a.as_str()).is_ok());
    }

    #[test]
    fn run_id_rejects_path_separators() {
        assert!(RunId::new("../escape").is_err());
        assert!(RunId::new("").is_err());
        assert!(RunId::new("..").is_err());
        assert!(RunId::new("job-42_a.b").is_ok());
    }

    #[test]
    fn cpu_max_renders_as_quota_and_period() {
        let cpu = CpuMax {
            quota_us: 50_000,
            period_us: 100_000,
        };
        assert_eq!(cpu.to_string(), "50000 100000");
        assert!(cpu.is_set());
        assert!(!CpuMax { quota_us: 0, period_us: 100_000 }.is_set());
    }

    #[test]
    fn default_limits_are_empty() {
        assert!(ResourceLimits::default().is_empty());
        let limits = ResourceLimits {
            pid_limit: 16,
            ..ResourceLimits::default()
        };
        assert!(!limits.is_empty());
    }

    #[test]
    fn id_mapping_default_line() {
        assert_eq!(IdMapping::default().map_line(), "0 100000 65536");
    }

    #[test]
    fn validate_accepts_existing_rootfs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let req = LaunchRequest::new(dir.path(), vec!["/bin/true".into()]);
        assert!(req.validate().is_ok());
        assert_eq!(req.time_limit(), Duration::ZERO);
        assert!(req.limits().is_none());
    }

    #[test]
    fn validate_rejects_empty_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let req = LaunchRequest::new(dir.path(), Vec::new());
        assert!(matches!(req.validate(), Err(MiniboxError::Config { .. })));
        let req = LaunchRequest::new(dir.path(), vec![String::new()]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_rootfs_and_box() {
        let req = LaunchRequest::new("", vec!["/bin/true".into()]);
        assert!(req.validate().is_err());

        let req = LaunchRequest::new("/nonexistent/minibox/rootfs", vec!["/bin/true".into()]);
        assert!(req.validate().is_err());

        let dir = tempfile::tempdir().expect("tempdir");
        let req = LaunchRequest::new(dir.path(), vec!["/bin/true".into()])
            .with_box(dir.path().join("missing"));
        assert!(req.validate().is_err());
    }
}
