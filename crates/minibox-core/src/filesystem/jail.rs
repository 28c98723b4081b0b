//! Chroot jail construction inside the container's mount namespace.
//!
//! The steps run strictly in order; each one's result is the next one's
//! precondition. A failed step aborts the sequence without unwinding
//! earlier mounts: they belong to the private mount namespace and are
//! reclaimed by the kernel when the container exits.

use std::fmt;
use std::path::{Path, PathBuf};

use minibox_common::error::{MiniboxError, Result};
#[cfg(target_os = "linux")]
use nix::mount::{MsFlags, mount};

/// One step of jail construction, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JailStep {
    /// Make `/` private and recursive so mounts never propagate to the host.
    PrivatePropagation,
    /// Bind the box directory into the rootfs.
    BoxBindMount,
    /// Change the process root to the rootfs.
    Chroot,
    /// Enter the jail's working directory.
    Chdir,
    /// Mount a fresh `proc` at `/proc`.
    MountProc,
    /// Mount a read-only `sysfs` at `/sys`.
    MountSys,
    /// Mount a `tmpfs` at `/dev`.
    MountDev,
}

impl JailStep {
    /// All steps in execution order.
    pub const ALL: [Self; 7] = [
        Self::PrivatePropagation,
        Self::BoxBindMount,
        Self::Chroot,
        Self::Chdir,
        Self::MountProc,
        Self::MountSys,
        Self::MountDev,
    ];

    /// Short name used in errors and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PrivatePropagation => "private propagation",
            Self::BoxBindMount => "box bind mount",
            Self::Chroot => "chroot",
            Self::Chdir => "chdir",
            Self::MountProc => "mount /proc",
            Self::MountSys => "mount /sys",
            Self::MountDev => "mount /dev",
        }
    }

    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    fn fail(self, err: impl fmt::Display) -> MiniboxError {
        MiniboxError::Jail {
            step: self.name(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for JailStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Description of the jail to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jail {
    rootfs: PathBuf,
    box_dir: Option<PathBuf>,
    box_mount_point: PathBuf,
}

impl Jail {
    /// Creates a jail rooted at `rootfs`, optionally binding `box_dir` at
    /// `box_mount_point` (an absolute path inside the jail).
    #[must_use]
    pub fn new(
        rootfs: impl Into<PathBuf>,
        box_dir: Option<PathBuf>,
        box_mount_point: impl Into<PathBuf>,
    ) -> Self {
        Self {
            rootfs: rootfs.into(),
            box_dir,
            box_mount_point: box_mount_point.into(),
        }
    }

    /// Host-side path where the box directory is bound.
    #[must_use]
    pub fn box_target(&self) -> PathBuf {
        let relative = self
            .box_mount_point
            .strip_prefix("/")
            .unwrap_or(&self.box_mount_point);
        self.rootfs.join(relative)
    }

    /// Working directory inside the jail once it is built.
    #[must_use]
    pub fn entry_dir(&self) -> &Path {
        if self.box_dir.is_some() {
            &self.box_mount_point
        } else {
            Path::new("/")
        }
    }

    /// Builds the jail in the calling process.
    ///
    /// Must run inside a fresh mount namespace, as a user that is root in
    /// its user namespace.
    ///
    /// # Errors
    ///
    /// Returns a [`MiniboxError::Jail`] naming the first step that failed.
    #[cfg(target_os = "linux")]
    pub fn build(&self) -> Result<()> {
        for step in JailStep::ALL {
            self.run_step(step)?;
        }
        tracing::info!(rootfs = %self.rootfs.display(), "jail built");
        Ok(())
    }

    /// Stub for non-Linux platforms.
    ///
    /// # Errors
    ///
    /// Always returns an error: mount namespaces require Linux.
    #[cfg(not(target_os = "linux"))]
    pub fn build(&self) -> Result<()> {
        Err(MiniboxError::Config {
            message: "Linux required for native container operations".into(),
        })
    }

    #[cfg(target_os = "linux")]
    fn run_step(&self, step: JailStep) -> Result<()> {
        tracing::debug!(%step, "jail step");
        match step {
            JailStep::PrivatePropagation => mount(
                None::<&str>,
                "/",
                None::<&str>,
                MsFlags::MS_PRIVATE | MsFlags::MS_REC,
                None::<&str>,
            )
            .map_err(|e| step.fail(e)),
            JailStep::BoxBindMount => {
                let Some(box_dir) = &self.box_dir else {
                    return Ok(());
                };
                let target = self.box_target();
                std::fs::create_dir_all(&target)
                    .map_err(|e| step.fail(format!("{}: {e}", target.display())))?;
                mount(
                    Some(box_dir.as_path()),
                    &target,
                    None::<&str>,
                    MsFlags::MS_BIND | MsFlags::MS_REC,
                    None::<&str>,
                )
                .map_err(|e| step.fail(e))
            }
            JailStep::Chroot => nix::unistd::chroot(&self.rootfs)
                .map_err(|e| step.fail(format!("{}: {e}", self.rootfs.display()))),
            JailStep::Chdir => nix::unistd::chdir(self.entry_dir())
                .map_err(|e| step.fail(format!("{}: {e}", self.entry_dir().display()))),
            JailStep::MountProc => {
                mount_pseudo(step, "proc", "/proc", "proc", MsFlags::empty(), None)
            }
            JailStep::MountSys => mount_pseudo(
                step,
                "sysfs",
                "/sys",
                "sysfs",
                MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC | MsFlags::MS_NODEV | MsFlags::MS_RDONLY,
                None,
            ),
            JailStep::MountDev => mount_pseudo(
                step,
                "tmpfs",
                "/dev",
                "tmpfs",
                MsFlags::MS_NOSUID
                    | MsFlags::MS_STRICTATIME
                    | MsFlags::MS_NOEXEC
                    | MsFlags::MS_NODEV,
                Some("mode=755"),
            ),
        }
    }
}

/// Mounts a pseudo-filesystem, creating the mount point if the rootfs
/// lacks it.
#[cfg(target_os = "linux")]
fn mount_pseudo(
    step: JailStep,
    source: &str,
    target: &str,
    fstype: &str,
    flags: MsFlags,
    data: Option<&str>,
) -> Result<()> {
    std::fs::create_dir_all(target).map_err(|e| step.fail(format!("{target}: {e}")))?;
    mount(Some(source), target, Some(fstype), flags, data).map_err(|e| step.fail(e))
}
