//! `minibox init` — container entry point.
//!
//! Never typed by hand: `minibox run` re-executes the binary with these
//! arguments inside the new namespaces.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Args;
use minibox_common::constants;
use minibox_runtime::init::{InitRequest, run_init};

/// Arguments for the hidden `init` command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Hostname inside the UTS namespace.
    #[arg(long, default_value = constants::DEFAULT_HOSTNAME)]
    pub hostname: String,

    /// Jail path where the box directory is bound.
    #[arg(long, default_value = constants::DEFAULT_BOX_MOUNT_POINT)]
    pub box_mount_point: PathBuf,

    /// Host directory to bind into the jail.
    #[arg(long = "box", value_name = "DIR")]
    pub box_dir: Option<PathBuf>,

    /// Directory that becomes the container's root.
    pub rootfs: PathBuf,

    /// Command and arguments to execute.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl InitArgs {
    /// Converts the parsed arguments into an entry-point request.
    pub fn into_request(self) -> InitRequest {
        InitRequest {
            rootfs: self.rootfs,
            box_dir: self.box_dir,
            box_mount_point: self.box_mount_point,
            hostname: self.hostname,
            command: self.command,
        }
    }
}

/// Executes the `init` command.
///
/// # Errors
///
/// Returns the first setup failure; on success the process image is
/// replaced and this never returns.
pub fn execute(args: InitArgs) -> anyhow::Result<ExitCode> {
    let request = args.into_request();
    let never = run_init(&request).context("container entry point")?;
    match never {}
}
