//! Cgroups v2 resource management.
//!
//! A [`ResourceGroup`] is one directory in the unified hierarchy, owned by
//! exactly one container run. Limits are written as decimal text into its
//! control files, the container's init process is attached through
//! `cgroup.procs`, and usage counters are read back before removal.
//!
//! Limits are applied after the container process already exists (its PID
//! is only known after spawn), so a short unthrottled window at startup is
//! expected.

pub mod cpu;
pub mod memory;
pub mod pids;

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use minibox_common::error::{MiniboxError, Result};
use minibox_common::types::ResourceLimits;

/// Process-membership control file.
pub const PROCS_FILE: &str = "cgroup.procs";

/// Controller enablement file of the parent group.
pub const SUBTREE_CONTROL_FILE: &str = "cgroup.subtree_control";

const REMOVE_ATTEMPTS: u32 = 50;
const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Handle to the resource group of a single container run.
#[derive(Debug)]
pub struct ResourceGroup {
    path: PathBuf,
    written: Vec<&'static str>,
    pid: Option<u32>,
}

impl ResourceGroup {
    /// Creates the group directory at `path`.
    ///
    /// A pre-existing directory is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    #[cfg(target_os = "linux")]
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path)
            .map_err(|e| MiniboxError::resource_control("create", &path, e))?;
        tracing::info!(path = %path.display(), "resource group created");
        Ok(Self {
            path,
            written: Vec::new(),
            pid: None,
        })
    }

    /// Stub for non-Linux platforms.
    ///
    /// # Errors
    ///
    /// Always returns an error: cgroups require Linux.
    #[cfg(not(target_os = "linux"))]
    pub fn create(_path: impl Into<PathBuf>) -> Result<Self> {
        Err(MiniboxError::Config {
            message: "Linux required for native container operations".into(),
        })
    }

    /// Creates the group, writes every non-zero limit, and attaches `pid`.
    ///
    /// The first failing write aborts the remaining steps. The directory is
    /// not rolled back; the caller owns removal of `path`.
    ///
    /// # Errors
    ///
    /// Returns an error naming the control file that could not be written.
    pub fn create_and_apply(
        path: impl Into<PathBuf>,
        pid: u32,
        limits: &ResourceLimits,
    ) -> Result<Self> {
        let mut group = Self::create(path)?;
        group.apply_limits(limits)?;
        group.attach(pid)?;
        Ok(group)
    }

    /// Writes every set field of `limits` into its control file.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first control file that failed.
    pub fn apply_limits(&mut self, limits: &ResourceLimits) -> Result<()> {
        self.enable_controllers(limits);

        if limits.memory_bytes > 0 {
            memory::set_memory_max(&self.path, limits.memory_bytes)?;
            self.written.push(memory::MAX_FILE);
        }
        if let Some(cpu_max) = limits.cpu.filter(|c| c.is_set()) {
            cpu::set_cpu_max(&self.path, cpu_max)?;
            self.written.push(cpu::MAX_FILE);
        }
        if limits.pid_limit > 0 {
            pids::set_pids_max(&self.path, limits.pid_limit)?;
            self.written.push(pids::MAX_FILE);
        }
        Ok(())
    }

    /// Moves `pid` into this group.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `cgroup.procs` fails.
    pub fn attach(&mut self, pid: u32) -> Result<()> {
        write_control(&self.path, PROCS_FILE, &pid.to_string())?;
        self.pid = Some(pid);
        tracing::debug!(pid, path = %self.path.display(), "attached process to resource group");
        Ok(())
    }

    /// Reads current memory, peak memory, and CPU accounting counters.
    ///
    /// Keys are the control file names; values are the file contents with
    /// trailing whitespace removed.
    ///
    /// # Errors
    ///
    /// Returns an error if any counter file is unreadable, for instance
    /// because the group was already removed.
    pub fn read_stats(&self) -> Result<BTreeMap<String, String>> {
        let mut stats = BTreeMap::new();
        for file in [memory::CURRENT_FILE, memory::PEAK_FILE, cpu::STAT_FILE] {
            let value = read_control(&self.path, file)?;
            let _ = stats.insert(file.to_string(), value);
        }
        Ok(stats)
    }

    /// Deletes the group directory.
    ///
    /// cgroupfs only supports `rmdir`; the kernel may report the group as
    /// busy for a moment after its last process exits, so busy errors are
    /// retried. cgroupfs never reports a group as non-empty: that only
    /// happens for a group kept on an ordinary filesystem, such as a test
    /// fixture. Its regular files are then deleted once and `rmdir` is
    /// retried; nested directories are never removed.
    ///
    /// # Errors
    ///
    /// Returns [`MiniboxError::NotFound`] if the group does not exist, or a
    /// resource-control error if removal fails.
    pub fn remove(&self) -> Result<()> {
        if !self.path.exists() {
            return Err(MiniboxError::NotFound {
                kind: "resource group",
                id: self.path.display().to_string(),
            });
        }

        let mut attempt = 0;
        let mut cleared = false;
        loop {
            attempt += 1;
            match std::fs::remove_dir(&self.path) {
                Ok(()) => break,
                Err(e) if e.kind() == ErrorKind::ResourceBusy && attempt < REMOVE_ATTEMPTS => {
                    std::thread::sleep(REMOVE_RETRY_DELAY);
                }
                Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty && !cleared => {
                    clear_regular_files(&self.path)?;
                    cleared = true;
                }
                Err(e) => return Err(MiniboxError::resource_control("remove", &self.path, e)),
            }
        }
        tracing::info!(path = %self.path.display(), "resource group removed");
        Ok(())
    }

    /// Directory of this group.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Control files written by [`ResourceGroup::apply_limits`].
    #[must_use]
    pub fn written(&self) -> &[&'static str] {
        &self.written
    }

    /// Process attached to this group, if any.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Enables the controllers the limits need in the parent group.
    ///
    /// Failures are only logged: the controllers are usually enabled
    /// already, and a missing one surfaces as a failed limit write.
    fn enable_controllers(&self, limits: &ResourceLimits) {
        let Some(parent) = self.path.parent() else {
            return;
        };
        let control = parent.join(SUBTREE_CONTROL_FILE);
        if !control.exists() {
            return;
        }

        let mut wanted = Vec::new();
        if limits.memory_bytes > 0 {
            wanted.push("+memory");
        }
        if limits.cpu.is_some_and(|c| c.is_set()) {
            wanted.push("+cpu");
        }
        if limits.pid_limit > 0 {
            wanted.push("+pids");
        }
        for controller in wanted {
            if let Err(e) = std::fs::write(&control, controller) {
                tracing::debug!(controller, error = %e, "could not enable controller");
            }
        }
    }
}

/// Deletes the regular files directly inside `dir`.
fn clear_regular_files(dir: &Path) -> Result<()> {
    let failed = |e| MiniboxError::resource_control("remove", dir, e);
    for entry in std::fs::read_dir(dir).map_err(failed)? {
        let entry = entry.map_err(failed)?;
        if entry.file_type().map_err(failed)?.is_file() {
            std::fs::remove_file(entry.path()).map_err(failed)?;
        }
    }
    Ok(())
}

/// Writes `value` to the control file `file` inside `dir`.
///
/// # Errors
///
/// Returns a resource-control error naming `file`.
pub fn write_control(dir: &Path, file: &str, value: &str) -> Result<()> {
    let path = dir.join(file);
    std::fs::write(&path, value).map_err(|e| MiniboxError::resource_control(file, &path, e))?;
    tracing::debug!(file, value, "control file written");
    Ok(())
}

/// Reads the control file `file` inside `dir`, trimming trailing whitespace.
///
/// # Errors
///
/// Returns a resource-control error naming `file`.
pub fn read_control(dir: &Path, file: &str) -> Result<String> {
    let path = dir.join(file);
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| MiniboxError::resource_control(file, &path, e))?;
    Ok(raw.trim_end().to_string())
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use minibox_common::types::CpuMax;

    use super::*;

    fn limits() -> ResourceLimits {
        ResourceLimits {
            memory_bytes: 1_048_576,
            cpu: Some(CpuMax {
                quota_us: 50_000,
                period_us: 100_000,
            }),
            pid_limit: 32,
        }
    }

    fn seed_counters(dir: &Path) {
        std::fs::write(dir.join(memory::CURRENT_FILE), "4096\n").unwrap();
        std::fs::write(dir.join(memory::PEAK_FILE), "8192\n").unwrap();
        std::fs::write(
            dir.join(cpu::STAT_FILE),
            "usage_usec 1200\nuser_usec 1000\nsystem_usec 200\n",
        )
        .unwrap();
    }

    #[test]
    fn create_and_apply_writes_limits_and_pid() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = root.path().join("minibox-run1");

        let group = ResourceGroup::create_and_apply(&path, 4242, &limits()).expect("apply");

        assert_eq!(read_control(&path, memory::MAX_FILE).unwrap(), "1048576");
        assert_eq!(read_control(&path, cpu::MAX_FILE).unwrap(), "50000 100000");
        assert_eq!(read_control(&path, pids::MAX_FILE).unwrap(), "32");
        assert_eq!(read_control(&path, PROCS_FILE).unwrap(), "4242");
        assert_eq!(group.pid(), Some(4242));
        assert_eq!(
            group.written(),
            &[memory::MAX_FILE, cpu::MAX_FILE, pids::MAX_FILE]
        );
    }

    #[test]
    fn create_and_apply_is_idempotent_on_existing_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = root.path().join("minibox-run2");

        let _first = ResourceGroup::create_and_apply(&path, 1, &limits()).expect("first");
        let second = ResourceGroup::create_and_apply(&path, 2, &limits()).expect("second");
        assert_eq!(second.pid(), Some(2));
    }

    #[test]
    fn zero_limits_are_not_written() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = root.path().join("minibox-run3");

        let group =
            ResourceGroup::create_and_apply(&path, 7, &ResourceLimits::default()).expect("apply");
        assert!(group.written().is_empty());
        assert!(!path.join(memory::MAX_FILE).exists());
        assert!(!path.join(cpu::MAX_FILE).exists());
        assert!(!path.join(pids::MAX_FILE).exists());
        assert!(path.join(PROCS_FILE).exists());
    }

    #[test]
    fn failed_write_names_the_limit_and_keeps_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = root.path().join("minibox-run4");
        std::fs::create_dir_all(path.join(memory::MAX_FILE)).unwrap();

        let err = ResourceGroup::create_and_apply(&path, 9, &limits()).unwrap_err();
        assert!(matches!(
            err,
            MiniboxError::ResourceControl { ref control, .. } if control == memory::MAX_FILE
        ));
        assert!(path.exists());
        assert!(!path.join(PROCS_FILE).exists());
    }

    #[test]
    fn read_stats_returns_labeled_counters() {
        let root = tempfile::tempdir().expect("tempdir");
        let group = ResourceGroup::create(root.path().join("minibox-run5")).expect("create");
        seed_counters(group.path());

        let stats = group.read_stats().expect("stats");
        assert_eq!(stats.get("memory.current").map(String::as_str), Some("4096"));
        assert_eq!(stats.get("memory.peak").map(String::as_str), Some("8192"));
        assert!(stats["cpu.stat"].starts_with("usage_usec 1200"));
    }

    #[test]
    fn read_stats_fails_after_remove() {
        let root = tempfile::tempdir().expect("tempdir");
        let group = ResourceGroup::create_and_apply(root.path().join("minibox-run6"), 3, &limits())
            .expect("apply");
        seed_counters(group.path());

        group.remove().expect("remove");
        assert!(!group.path().exists());
        assert!(group.read_stats().is_err());
    }

    #[test]
    fn remove_missing_group_is_not_found() {
        let root = tempfile::tempdir().expect("tempdir");
        let group = ResourceGroup::create(root.path().join("minibox-run7")).expect("create");
        group.remove().expect("first remove");
        assert!(matches!(group.remove(), Err(MiniboxError::NotFound { .. })));
    }

    #[test]
    fn remove_keeps_nested_directories() {
        let root = tempfile::tempdir().expect("tempdir");
        let group = ResourceGroup::create(root.path().join("minibox-run9")).expect("create");
        seed_counters(group.path());
        let nested = group.path().join("child");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("data"), "keep").unwrap();

        let err = group.remove().unwrap_err();
        assert!(matches!(err, MiniboxError::ResourceControl { .. }));
        assert!(!group.path().join(memory::PEAK_FILE).exists());
        assert_eq!(std::fs::read_to_string(nested.join("data")).unwrap(), "keep");
    }

    #[test]
    fn controllers_enabled_in_parent_when_present() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::write(root.path().join(SUBTREE_CONTROL_FILE), "").unwrap();
        let mut group = ResourceGroup::create(root.path().join("minibox-run8")).expect("create");

        group
            .apply_limits(&ResourceLimits {
                pid_limit: 4,
                ..ResourceLimits::default()
            })
            .expect("apply");
        assert_eq!(
            std::fs::read_to_string(root.path().join(SUBTREE_CONTROL_FILE)).unwrap(),
            "+pids"
        );
    }
}
