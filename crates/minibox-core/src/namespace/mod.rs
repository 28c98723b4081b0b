//! Linux namespace management for container isolation.
//!
//! The container is cloned straight into its namespaces; this module
//! describes which ones and how the new user namespace maps IDs.

pub mod user;
pub mod uts;

use minibox_common::config::RuntimeConfig;
use minibox_common::error::{MiniboxError, Result};
use minibox_common::types::IdMapping;
#[cfg(target_os = "linux")]
use nix::sched::CloneFlags;

/// Which namespaces a container gets.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceSet {
    /// Isolate hostname and domain name.
    pub uts: bool,
    /// Isolate the process ID space; the container init becomes PID 1.
    pub pid: bool,
    /// Isolate the mount table.
    pub mount: bool,
    /// Isolate the network stack.
    pub network: bool,
    /// Isolate System V IPC and POSIX message queues.
    pub ipc: bool,
    /// Isolate user and group IDs.
    pub user: bool,
    /// Isolate the cgroup root view.
    pub cgroup: bool,
    /// Isolate boot and monotonic clocks.
    pub time: bool,
}

impl Default for NamespaceSet {
    fn default() -> Self {
        Self {
            uts: true,
            pid: true,
            mount: true,
            network: true,
            ipc: true,
            user: true,
            cgroup: true,
            time: true,
        }
    }
}

impl NamespaceSet {
    /// Flags passed to `clone(2)`.
    ///
    /// `CLONE_NEWTIME` is excluded: its bit overlaps the exit-signal byte
    /// of `clone(2)`, so the time namespace is entered separately with
    /// [`enter_time_namespace`].
    #[cfg(target_os = "linux")]
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();
        flags.set(CloneFlags::CLONE_NEWUTS, self.uts);
        flags.set(CloneFlags::CLONE_NEWPID, self.pid);
        flags.set(CloneFlags::CLONE_NEWNS, self.mount);
        flags.set(CloneFlags::CLONE_NEWNET, self.network);
        flags.set(CloneFlags::CLONE_NEWIPC, self.ipc);
        flags.set(CloneFlags::CLONE_NEWUSER, self.user);
        flags.set(CloneFlags::CLONE_NEWCGROUP, self.cgroup);
        flags
    }
}

/// Namespaces plus the UID/GID mapping of the user namespace.
///
/// Built from runtime configuration; not per-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolationSpec {
    /// Namespaces to create.
    pub namespaces: NamespaceSet,
    /// UID range; ID 0 inside maps to `host_base`.
    pub uid_map: IdMapping,
    /// GID range; ID 0 inside maps to `host_base`.
    pub gid_map: IdMapping,
}

impl IsolationSpec {
    /// Full namespace set with the configured ID mapping for both UIDs and GIDs.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            namespaces: NamespaceSet::default(),
            uid_map: config.id_mapping,
            gid_map: config.id_mapping,
        }
    }
}

/// Moves the caller's future children, and the caller itself after its
/// next `execve(2)`, into a new time namespace.
///
/// # Errors
///
/// Returns an error if `unshare(CLONE_NEWTIME)` fails.
#[cfg(target_os = "linux")]
pub fn enter_time_namespace() -> Result<()> {
    nix::sched::unshare(CloneFlags::from_bits_retain(libc::CLONE_NEWTIME)).map_err(|e| {
        MiniboxError::Setup {
            step: "unshare time namespace",
            message: e.to_string(),
        }
    })
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: time namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn enter_time_namespace() -> Result<()> {
    Err(MiniboxError::Config {
        message: "Linux required for native container operations".into(),
    })
}
