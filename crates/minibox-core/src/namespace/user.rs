//! User namespace ID mapping.
//!
//! Maps container UIDs/GIDs onto an unprivileged host range. Until the maps
//! are written, the kernel denies every privileged operation inside the
//! namespace, so the launcher writes them before releasing the child.

use std::path::Path;

use minibox_common::error::{MiniboxError, Result};
use minibox_common::types::IdMapping;

/// Writes the UID/GID maps for the user namespace of `pid`.
///
/// `setgroups` is denied first, as required before an unprivileged
/// `gid_map` write.
///
/// # Errors
///
/// Returns an error if writing to `/proc/<pid>/setgroups`,
/// `/proc/<pid>/uid_map`, or `/proc/<pid>/gid_map` fails.
#[cfg(target_os = "linux")]
pub fn write_id_maps(pid: u32, uid_map: &IdMapping, gid_map: &IdMapping) -> Result<()> {
    let proc_dir = Path::new("/proc").join(pid.to_string());
    write_id_maps_in(&proc_dir, uid_map, gid_map)?;
    tracing::debug!(
        pid,
        uid_map = %uid_map.map_line(),
        gid_map = %gid_map.map_line(),
        "wrote UID/GID map"
    );
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: user namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn write_id_maps(_pid: u32, _uid_map: &IdMapping, _gid_map: &IdMapping) -> Result<()> {
    Err(MiniboxError::Config {
        message: "Linux required for native container operations".into(),
    })
}

/// Writes the map files inside an explicit `/proc/<pid>` directory.
///
/// # Errors
///
/// Returns a setup error naming the file that could not be written.
pub fn write_id_maps_in(proc_dir: &Path, uid_map: &IdMapping, gid_map: &IdMapping) -> Result<()> {
    let setgroups = proc_dir.join("setgroups");
    if setgroups.exists() {
        write_map_file(&setgroups, "deny")?;
    }
    write_map_file(&proc_dir.join("uid_map"), &uid_map.map_line())?;
    write_map_file(&proc_dir.join("gid_map"), &gid_map.map_line())?;
    Ok(())
}

fn write_map_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|e| MiniboxError::Setup {
        step: "write id map",
        message: format!("{}: {e}", path.display()),
    })
}
