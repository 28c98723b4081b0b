//! CPU resource control via cgroups v2.
//!
//! Manages `cpu.max` and parses `cpu.stat`.

use std::path::Path;

use minibox_common::error::Result;
use minibox_common::types::CpuMax;

/// CPU bandwidth control file (`quota period`).
pub const MAX_FILE: &str = "cpu.max";

/// CPU accounting statistics.
pub const STAT_FILE: &str = "cpu.stat";

/// Sets the CPU bandwidth limit (max microseconds per period).
///
/// Writes `quota_us period_us` to `cpu.max`, where `quota_us` is the
/// maximum CPU time allowed per `period_us` window.
///
/// # Errors
///
/// Returns an error if writing to `cpu.max` fails.
pub fn set_cpu_max(cgroup_path: &Path, cpu_max: CpuMax) -> Result<()> {
    super::write_control(cgroup_path, MAX_FILE, &cpu_max.to_string())?;
    tracing::debug!(
        quota_us = cpu_max.quota_us,
        period_us = cpu_max.period_us,
        "CPU max quota set"
    );
    Ok(())
}

/// Extracts a single `key value` entry from `cpu.stat` text.
#[must_use]
pub fn stat_field(stat: &str, key: &str) -> Option<u64> {
    stat.lines().find_map(|line| {
        let (name, value) = line.split_once(' ')?;
        (name == key).then(|| value.trim().parse().ok()).flatten()
    })
}
