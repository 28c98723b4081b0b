//! Process-count control via cgroups v2.

use std::path::Path;

use minibox_common::error::Result;

/// Maximum live processes and threads in the group.
pub const MAX_FILE: &str = "pids.max";

/// Sets the process-count ceiling for a cgroup.
///
/// # Errors
///
/// Returns an error if writing to `pids.max` fails.
pub fn set_pids_max(cgroup_path: &Path, max: u64) -> Result<()> {
    super::write_control(cgroup_path, MAX_FILE, &max.to_string())?;
    tracing::debug!(max, "pids max set");
    Ok(())
}
