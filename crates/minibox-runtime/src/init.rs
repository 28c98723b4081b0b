//! Container entry point.
//!
//! Runs as the first process of the new namespaces: names the host, builds
//! the jail, and replaces itself with the requested command. Nothing here
//! returns on success.

use std::convert::Infallible;
use std::ffi::{CString, OsString};
use std::path::PathBuf;

use minibox_common::config::RuntimeConfig;
use minibox_common::constants;
use minibox_common::error::{MiniboxError, Result};
use minibox_common::types::LaunchRequest;
use minibox_core::filesystem::jail::Jail;
use minibox_core::namespace::uts;

/// Everything the entry point needs, passed on its command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitRequest {
    /// Directory that becomes `/`.
    pub rootfs: PathBuf,
    /// Host directory bound into the jail, if any.
    pub box_dir: Option<PathBuf>,
    /// Jail path of the box directory.
    pub box_mount_point: PathBuf,
    /// Hostname inside the UTS namespace.
    pub hostname: String,
    /// Command and arguments to execute.
    pub command: Vec<String>,
}

impl InitRequest {
    /// Derives the entry-point request for a launch.
    #[must_use]
    pub fn from_launch(request: &LaunchRequest, config: &RuntimeConfig) -> Self {
        Self {
            rootfs: request.rootfs().to_path_buf(),
            box_dir: request.box_dir().map(std::path::Path::to_path_buf),
            box_mount_point: config.box_mount_point.clone(),
            hostname: config.hostname.clone(),
            command: request.command().to_vec(),
        }
    }

    /// Arguments for the re-executed binary, starting with the hidden
    /// subcommand name. The command follows `--` so its own flags are
    /// never parsed.
    #[must_use]
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            constants::INIT_SUBCOMMAND.into(),
            "--hostname".into(),
            self.hostname.clone().into(),
            "--box-mount-point".into(),
            self.box_mount_point.clone().into(),
        ];
        if let Some(box_dir) = &self.box_dir {
            args.push("--box".into());
            args.push(box_dir.clone().into());
        }
        args.push(self.rootfs.clone().into());
        args.push("--".into());
        args.extend(self.command.iter().map(OsString::from));
        args
    }
}

/// Sets the hostname, builds the jail, and executes the command.
///
/// # Errors
///
/// Returns the first failure. On success the process image is replaced
/// and this function never returns.
pub fn run_init(request: &InitRequest) -> Result<Infallible> {
    let Some(program) = request.command.first() else {
        return Err(MiniboxError::Setup {
            step: "exec",
            message: "no command given".into(),
        });
    };
    let argv = request
        .command
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| MiniboxError::Setup {
            step: "exec",
            message: e.to_string(),
        })?;

    uts::set_hostname(&request.hostname)?;
    Jail::new(
        &request.rootfs,
        request.box_dir.clone(),
        &request.box_mount_point,
    )
    .build()?;

    tracing::debug!(program, "executing workload");
    let path = &argv[0];
    nix::unistd::execvp(path, &argv).map_err(|e| MiniboxError::Setup {
        step: "exec",
        message: format!("{program}: {e}"),
    })
}
