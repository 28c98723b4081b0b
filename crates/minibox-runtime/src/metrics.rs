//! Resource usage of a finished run.
//!
//! Parses the counters read from the run's resource group just before it
//! is removed.

use std::collections::BTreeMap;

use minibox_core::cgroup::{cpu, memory};
use serde::Serialize;

/// Parsed resource usage. A field is `None` when its counter was missing
/// or unparsable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    /// Memory charged to the group when it was read, in bytes.
    pub memory_current_bytes: Option<u64>,
    /// Peak memory charged to the group, in bytes.
    pub memory_peak_bytes: Option<u64>,
    /// Total CPU time, in microseconds.
    pub cpu_usage_usec: Option<u64>,
    /// User-mode CPU time, in microseconds.
    pub cpu_user_usec: Option<u64>,
    /// Kernel-mode CPU time, in microseconds.
    pub cpu_system_usec: Option<u64>,
}

impl UsageSnapshot {
    /// Builds a snapshot from raw counter text keyed by control file name.
    #[must_use]
    pub fn from_stats(stats: &BTreeMap<String, String>) -> Self {
        let counter = |file: &str| stats.get(file).and_then(|v| v.trim().parse().ok());
        let cpu_field = |key: &str| {
            stats
                .get(cpu::STAT_FILE)
                .and_then(|stat| cpu::stat_field(stat, key))
        };
        Self {
            memory_current_bytes: counter(memory::CURRENT_FILE),
            memory_peak_bytes: counter(memory::PEAK_FILE),
            cpu_usage_usec: cpu_field("usage_usec"),
            cpu_user_usec: cpu_field("user_usec"),
            cpu_system_usec: cpu_field("system_usec"),
        }
    }
}
