//! Memory resource control via cgroups v2.
//!
//! Manages `memory.max`; the `memory.current` and `memory.peak` counters
//! are read through [`super::ResourceGroup::read_stats`].

use std::path::Path;

use minibox_common::error::Result;

/// Hard memory ceiling, in bytes.
pub const MAX_FILE: &str = "memory.max";

/// Current memory usage counter.
pub const CURRENT_FILE: &str = "memory.current";

/// Peak memory usage counter.
pub const PEAK_FILE: &str = "memory.peak";

/// Sets the hard memory limit for a cgroup.
///
/// Allocations past the ceiling trigger the kernel OOM killer inside the
/// group.
///
/// # Errors
///
/// Returns an error if writing to `memory.max` fails.
pub fn set_memory_max(cgroup_path: &Path, bytes: u64) -> Result<()> {
    super::write_control(cgroup_path, MAX_FILE, &bytes.to_string())?;
    tracing::debug!(bytes, "memory max set");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_max_round_trips_as_decimal() {
        let dir = tempfile::tempdir().expect("tempdir");
        set_memory_max(dir.path(), 268_435_456).expect("write");
        assert_eq!(
            std::fs::read_to_string(dir.path().join(MAX_FILE)).unwrap(),
            "268435456"
        );
    }
}
