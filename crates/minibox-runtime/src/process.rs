//! Container process creation and reaping.
//!
//! The container is a re-execution of the current binary, cloned directly
//! into its namespaces. The clone blocks on a pipe until the launcher has
//! written its UID/GID maps, then becomes root of the new user namespace
//! and executes the hidden `init` entry point.

#[cfg(target_os = "linux")]
use std::ffi::{CString, OsString};

use minibox_common::error::{MiniboxError, Result};
use minibox_core::namespace::IsolationSpec;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;

use crate::init::InitRequest;
use crate::state::WorkloadExit;

#[cfg(target_os = "linux")]
const CHILD_STACK_SIZE: usize = 128 * 1024;

/// Exit status of a clone that failed before reaching `execve(2)`.
pub const CHILD_SETUP_FAILED: i32 = 125;

/// Clones the container process and releases it once its ID maps exist.
///
/// Returns the container's PID as seen from the launcher.
///
/// # Errors
///
/// Returns a setup error if the clone fails, the ID maps cannot be
/// written, or the child cannot be released. In the latter two cases the
/// half-started child is killed and reaped before returning.
#[cfg(target_os = "linux")]
pub fn spawn_container(init: &InitRequest, isolation: &IsolationSpec) -> Result<Pid> {
    use std::os::fd::AsRawFd;

    use minibox_common::constants;
    use minibox_core::namespace;
    use nix::fcntl::OFlag;
    use nix::unistd::{Gid, Uid};

    let exe = to_cstring(constants::SELF_EXE.into())?;
    let mut argv = vec![to_cstring(constants::APP_NAME.into())?];
    for arg in init.to_args() {
        argv.push(to_cstring(arg)?);
    }
    let enter_time = isolation.namespaces.time;

    let (sync_read, sync_write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| {
        MiniboxError::Setup {
            step: "sync pipe",
            message: e.to_string(),
        }
    })?;
    let sync_read_raw = sync_read.as_raw_fd();
    let sync_write_raw = sync_write.as_raw_fd();

    let child = Box::new(move || -> isize {
        // SAFETY: the child owns copies of both pipe ends after clone; the
        // buffer outlives the read.
        let released = unsafe {
            let _ = libc::close(sync_write_raw);
            let mut buf = [0u8; 1];
            libc::read(sync_read_raw, buf.as_mut_ptr().cast::<libc::c_void>(), 1) == 1
        };
        if !released {
            return CHILD_SETUP_FAILED as isize;
        }
        if enter_time && namespace::enter_time_namespace().is_err() {
            return CHILD_SETUP_FAILED as isize;
        }
        if nix::unistd::setgid(Gid::from_raw(0)).is_err()
            || nix::unistd::setuid(Uid::from_raw(0)).is_err()
        {
            return CHILD_SETUP_FAILED as isize;
        }
        let _ = nix::unistd::execv(&exe, &argv);
        CHILD_SETUP_FAILED as isize
    });

    let mut stack = vec![0u8; CHILD_STACK_SIZE];
    // SAFETY: the child only performs async-signal-safe calls on memory it
    // owns after the clone before replacing its image with execv.
    let pid = unsafe {
        nix::sched::clone(
            child,
            &mut stack,
            isolation.namespaces.clone_flags(),
            Some(Signal::SIGCHLD as i32),
        )
    }
    .map_err(|e| MiniboxError::Setup {
        step: "clone",
        message: e.to_string(),
    })?;
    drop(sync_read);
    tracing::debug!(pid = pid.as_raw(), "container process cloned");

    if let Err(e) = write_maps(pid, isolation) {
        drop(sync_write);
        abort_child(pid);
        return Err(e);
    }

    if let Err(e) = nix::unistd::write(&sync_write, &[1]) {
        drop(sync_write);
        abort_child(pid);
        return Err(MiniboxError::Setup {
            step: "release container",
            message: e.to_string(),
        });
    }
    Ok(pid)
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: containers require Linux namespaces.
#[cfg(not(target_os = "linux"))]
pub fn spawn_container(_init: &InitRequest, _isolation: &IsolationSpec) -> Result<Pid> {
    Err(MiniboxError::Config {
        message: "Linux required for native container operations".into(),
    })
}

/// Kills and reaps a child that will never be handed to the supervisor.
#[cfg(target_os = "linux")]
fn abort_child(pid: Pid) {
    let _ = signal::kill(pid, Signal::SIGKILL);
    if let Err(e) = wait_for_exit(pid) {
        tracing::warn!(pid = pid.as_raw(), error = %e, "reaping aborted container failed");
    }
}

#[cfg(target_os = "linux")]
fn write_maps(pid: Pid, isolation: &IsolationSpec) -> Result<()> {
    use minibox_core::namespace::user;

    let raw = u32::try_from(pid.as_raw()).map_err(|_| MiniboxError::Setup {
        step: "write id map",
        message: format!("invalid pid {pid}"),
    })?;
    user::write_id_maps(raw, &isolation.uid_map, &isolation.gid_map)
}

#[cfg(target_os = "linux")]
fn to_cstring(arg: OsString) -> Result<CString> {
    use std::os::unix::ffi::OsStringExt;

    CString::new(arg.into_vec()).map_err(|e| MiniboxError::Setup {
        step: "prepare arguments",
        message: e.to_string(),
    })
}

/// Blocks until `pid` exits and reaps it.
///
/// # Errors
///
/// Returns a supervision error if `waitpid(2)` fails, for instance because
/// the process was already reaped.
pub fn wait_for_exit(pid: Pid) -> Result<WorkloadExit> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(WorkloadExit::Exited { code }),
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                return Ok(WorkloadExit::Signaled { signal: sig as i32 });
            }
            Ok(_) | Err(Errno::EINTR) => {}
            Err(e) => {
                return Err(MiniboxError::Supervision {
                    message: format!("waitpid {pid}: {e}"),
                });
            }
        }
    }
}

/// Sends `SIGKILL` to `pid`.
///
/// # Errors
///
/// Returns a supervision error if the signal cannot be delivered, which
/// includes the process having already exited.
pub fn kill_container(pid: Pid) -> Result<()> {
    signal::kill(pid, Signal::SIGKILL).map_err(|e| MiniboxError::Supervision {
        message: match e {
            Errno::ESRCH => format!("process {pid} already exited"),
            other => format!("kill {pid}: {other}"),
        },
    })
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use super::*;

    fn spawn(program: &str, args: &[&str]) -> Pid {
        let child = Command::new(program).args(args).spawn().expect("spawn");
        Pid::from_raw(i32::try_from(child.id()).expect("pid"))
    }

    #[test]
    fn exit_status_is_reported() {
        let pid = spawn("sh", &["-c", "exit 3"]);
        assert_eq!(
            wait_for_exit(pid).expect("wait"),
            WorkloadExit::Exited { code: 3 }
        );
    }

    #[test]
    fn killed_process_reports_sigkill() {
        let pid = spawn("sleep", &["30"]);
        kill_container(pid).expect("kill");
        assert_eq!(
            wait_for_exit(pid).expect("wait"),
            WorkloadExit::Signaled {
                signal: Signal::SIGKILL as i32
            }
        );
    }

    #[test]
    fn reaped_process_cannot_be_waited_again() {
        let pid = spawn("true", &[]);
        let _ = wait_for_exit(pid).expect("wait");
        let err = wait_for_exit(pid).unwrap_err();
        assert!(matches!(err, MiniboxError::Supervision { .. }));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn aborted_child_is_killed_and_reaped() {
        let pid = spawn("sleep", &["30"]);
        abort_child(pid);
        assert!(kill_container(pid).is_err());
        assert!(wait_for_exit(pid).is_err());
    }
}
