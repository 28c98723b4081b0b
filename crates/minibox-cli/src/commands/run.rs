//! `minibox run` — Run a command inside a new container.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use minibox_common::config::RuntimeConfig;
use minibox_common::types::{CpuMax, LaunchRequest, ResourceLimits, RunId};
use minibox_runtime::launcher::Launcher;
use minibox_runtime::state::RunOutcome;

use crate::output::{format_bytes, format_usec};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory that becomes the container's root.
    #[arg(long, value_name = "DIR")]
    pub rootfs: PathBuf,

    /// Host directory bound into the jail and used as working directory.
    #[arg(long = "box", value_name = "DIR")]
    pub box_dir: Option<PathBuf>,

    /// Place the container in its own cgroup and apply limits.
    #[arg(long)]
    pub cgroup: bool,

    /// Memory ceiling in bytes (0 = unlimited). Needs `--cgroup`.
    #[arg(long, default_value_t = 0, value_name = "BYTES")]
    pub mem_limit: u64,

    /// CPU quota per period, in microseconds. Needs `--cgroup`.
    #[arg(long, value_name = "USEC")]
    pub cpu_quota: Option<u64>,

    /// CPU period, in microseconds. Needs `--cgroup`.
    #[arg(long, value_name = "USEC")]
    pub cpu_period: Option<u64>,

    /// Maximum number of processes (0 = unlimited). Needs `--cgroup`.
    #[arg(long, default_value_t = 0, value_name = "N")]
    pub pid_limit: u64,

    /// Wall-clock limit in microseconds (0 = none).
    #[arg(long, default_value_t = 0, value_name = "USEC")]
    pub time_limit: u64,

    /// Run identifier; generated when omitted.
    #[arg(long, value_name = "ID")]
    pub run_id: Option<String>,

    /// Exit with the container's status (128 + signal if killed).
    #[arg(long)]
    pub propagate_exit: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Command and arguments to run inside the container.
    #[arg(required = true, trailing_var_arg = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl RunArgs {
    /// Limits to apply, or `None` without `--cgroup`.
    fn limits(&self, config: &RuntimeConfig) -> Option<ResourceLimits> {
        if !self.cgroup {
            if self.mem_limit != 0
                || self.pid_limit != 0
                || self.cpu_quota.is_some()
                || self.cpu_period.is_some()
            {
                tracing::warn!("resource limits ignored without --cgroup");
            }
            return None;
        }
        Some(ResourceLimits {
            memory_bytes: self.mem_limit,
            cpu: Some(CpuMax {
                quota_us: self.cpu_quota.unwrap_or(config.default_cpu_max.quota_us),
                period_us: self.cpu_period.unwrap_or(config.default_cpu_max.period_us),
            }),
            pid_limit: self.pid_limit,
        })
    }

    /// Builds the launch request.
    fn to_request(&self, config: &RuntimeConfig) -> anyhow::Result<LaunchRequest> {
        let mut request = LaunchRequest::new(&self.rootfs, self.command.clone())
            .with_time_limit(Duration::from_micros(self.time_limit));
        if let Some(box_dir) = &self.box_dir {
            request = request.with_box(box_dir);
        }
        if let Some(limits) = self.limits(config) {
            request = request.with_limits(limits);
        }
        if let Some(id) = &self.run_id {
            request = request.with_run_id(RunId::new(id.clone())?);
        }
        Ok(request)
    }
}

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if the configuration or request is invalid, or the
/// container cannot be started.
pub fn execute(args: RunArgs, config_path: Option<&Path>) -> anyhow::Result<ExitCode> {
    let config = RuntimeConfig::resolve(config_path).context("loading runtime configuration")?;
    let request = args.to_request(&config)?;
    let launcher = Launcher::new(config).context("loading runtime configuration")?;

    let outcome = launcher
        .launch(&request)
        .with_context(|| format!("launching run {}", request.run_id()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_summary(&outcome);
    }

    if !args.propagate_exit {
        return Ok(ExitCode::SUCCESS);
    }
    let code = outcome.exit.map_or(1, |exit| exit.code());
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX)))
}

fn print_summary(outcome: &RunOutcome) {
    let status = match (outcome.timed_out, outcome.interrupted, outcome.exit) {
        (true, _, _) => format!("{YELLOW}time limit reached{RESET}"),
        (_, true, _) => format!("{YELLOW}interrupted{RESET}"),
        (_, _, Some(exit)) if exit.success() => format!("{GREEN}{exit}{RESET}"),
        (_, _, Some(exit)) => format!("{RED}{exit}{RESET}"),
        (_, _, None) => format!("{RED}exit status unknown{RESET}"),
    };
    eprintln!();
    eprintln!(
        "  {BOLD}{}{RESET} {status} {DIM}after {:.3}s{RESET}",
        outcome.run_id,
        Duration::from_millis(outcome.elapsed_ms).as_secs_f64()
    );

    if let Some(usage) = outcome.usage {
        if let Some(peak) = usage.memory_peak_bytes {
            eprintln!("    memory peak  {}", format_bytes(peak));
        }
        if let Some(cpu) = usage.cpu_usage_usec {
            eprintln!(
                "    cpu time     {} {DIM}(user {}, system {}){RESET}",
                format_usec(cpu),
                usage.cpu_user_usec.map_or_else(|| "-".into(), format_usec),
                usage.cpu_system_usec.map_or_else(|| "-".into(), format_usec),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::commands::{Cli, Command};

    fn parse(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["minibox", "run", "--rootfs=/tmp/r1"];
        argv.extend_from_slice(extra);
        argv.push("/bin/true");
        match Cli::try_parse_from(argv).expect("parse").command {
            Command::Run(args) => args,
            Command::Init(_) => unreachable!("expected run"),
        }
    }

    #[test]
    fn limits_need_cgroup_flag() {
        let args = parse(&["--mem-limit=1048576"]);
        assert_eq!(args.limits(&RuntimeConfig::default()), None);
    }

    #[test]
    fn cgroup_without_cpu_flags_uses_configured_default() {
        let args = parse(&["--cgroup", "--pid-limit=16"]);
        let limits = args.limits(&RuntimeConfig::default()).expect("limits");
        assert_eq!(
            limits.cpu,
            Some(CpuMax {
                quota_us: 100_000,
                period_us: 100_000
            })
        );
        assert_eq!(limits.pid_limit, 16);
        assert_eq!(limits.memory_bytes, 0);
    }

    #[test]
    fn cpu_flags_override_default() {
        let args = parse(&["--cgroup", "--cpu-quota=50000", "--cpu-period=200000"]);
        let limits = args.limits(&RuntimeConfig::default()).expect("limits");
        assert_eq!(
            limits.cpu,
            Some(CpuMax {
                quota_us: 50_000,
                period_us: 200_000
            })
        );
    }

    #[test]
    fn request_carries_time_limit_and_run_id() {
        let args = parse(&["--time-limit=500000", "--run-id=job-7"]);
        let request = args.to_request(&RuntimeConfig::default()).expect("request");
        assert_eq!(request.time_limit(), Duration::from_millis(500));
        assert_eq!(request.run_id().as_str(), "job-7");
        assert!(request.limits().is_none());
    }

    #[test]
    fn invalid_run_id_is_rejected() {
        let args = parse(&["--run-id=../escape"]);
        assert!(args.to_request(&RuntimeConfig::default()).is_err());
    }
}
