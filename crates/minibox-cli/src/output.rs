//! Formatted output helpers for CLI commands.
//!
//! Human-readable byte and CPU-time formatting for run summaries.

/// Formats a byte count into a human-readable string (e.g., "128 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats a CPU time in microseconds (e.g., "1.250s", "12.3ms").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_usec(usec: u64) -> String {
    if usec >= 1_000_000 {
        format!("{:.3}s", usec as f64 / 1e6)
    } else if usec >= 1_000 {
        format!("{:.1}ms", usec as f64 / 1e3)
    } else {
        format!("{usec}µs")
    }
}
