//! System-wide constants and default values.

/// Cgroups v2 unified hierarchy mount point.
pub const CGROUP_V2_PATH: &str = "/sys/fs/cgroup";

/// Default prefix for resource group names (`<prefix>-<run id>`).
pub const DEFAULT_CGROUP_PREFIX: &str = "minibox";

/// Host UID/GID that the namespace root user maps to by default.
pub const DEFAULT_HOST_ID_BASE: u32 = 100_000;

/// Default number of contiguous IDs in the mapped range.
pub const DEFAULT_ID_RANGE: u32 = 65_536;

/// Hostname set inside the UTS namespace.
pub const DEFAULT_HOSTNAME: &str = "container";

/// Path inside the jail where the auxiliary box directory appears.
pub const DEFAULT_BOX_MOUNT_POINT: &str = "/box";

/// CPU quota applied when limiting is enabled without explicit CPU flags.
pub const DEFAULT_CPU_QUOTA_US: u64 = 100_000;

/// CPU period paired with [`DEFAULT_CPU_QUOTA_US`].
pub const DEFAULT_CPU_PERIOD_US: u64 = 100_000;

/// Upper bound on waiting for a killed container to be reaped.
pub const DEFAULT_KILL_GRACE_MS: u64 = 2_000;

/// Path the launcher re-executes to reach the container entry point.
pub const SELF_EXE: &str = "/proc/self/exe";

/// Name of the internal entry-point subcommand.
pub const INIT_SUBCOMMAND: &str = "init";

/// Environment variable naming a JSON runtime configuration file.
pub const CONFIG_ENV: &str = "MINIBOX_CONFIG";

/// Application name used in CLI output.
pub const APP_NAME: &str = "minibox";
