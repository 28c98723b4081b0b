//! Ownership hand-off of host directories to the mapped root user.
//!
//! Root inside the container is `host_base` on the host; the directories
//! it chroots into and works in must belong to that identity.

use std::path::Path;

use minibox_common::error::{MiniboxError, Result};
use minibox_common::types::IdMapping;

/// Changes the owner of `path` to the host identity of namespace root.
///
/// Only `path` itself is changed, not its contents.
///
/// # Errors
///
/// Returns a [`MiniboxError::Setup`] if `chown(2)` fails.
#[cfg(target_os = "linux")]
pub fn hand_over(path: &Path, mapping: &IdMapping) -> Result<()> {
    use nix::unistd::{Gid, Uid, chown};

    chown(
        path,
        Some(Uid::from_raw(mapping.host_base)),
        Some(Gid::from_raw(mapping.host_base)),
    )
    .map_err(|e| MiniboxError::Setup {
        step: "chown",
        message: format!("{}: {e}", path.display()),
    })?;
    tracing::debug!(path = %path.display(), owner = mapping.host_base, "ownership handed over");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: the mapped root only exists on Linux.
#[cfg(not(target_os = "linux"))]
pub fn hand_over(_path: &Path, _mapping: &IdMapping) -> Result<()> {
    Err(MiniboxError::Config {
        message: "Linux required for native container operations".into(),
    })
}
