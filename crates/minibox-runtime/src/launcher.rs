//! Launch and supervision of a single container run.
//!
//! The launcher hands the rootfs to the mapped root user, clones the
//! container, places it under resource control, and then races its exit
//! against the wall-clock limit and a terminal interrupt. Whatever wins,
//! the container is killed and reaped and its resource group removed.
//! Failures after the spawn are logged and never abort the cleanup.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use minibox_common::config::RuntimeConfig;
use minibox_common::error::{MiniboxError, Result};
use minibox_common::types::{LaunchRequest, ResourceLimits};
use minibox_core::cgroup::ResourceGroup;
use minibox_core::filesystem::ownership;
use minibox_core::namespace::IsolationSpec;
use nix::unistd::Pid;
use tokio::task::JoinHandle;

use crate::init::InitRequest;
use crate::metrics::UsageSnapshot;
use crate::process;
use crate::state::{RunOutcome, RunPhase, WorkloadExit};

/// Which branch of the supervision race fired first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceEnd {
    /// The process exited and was reaped.
    Completed(WorkloadExit),
    /// The reaper failed; the process state is unknown.
    WaitFailed,
    /// The wall-clock limit elapsed.
    TimedOut,
    /// The launcher received an interrupt.
    Interrupted,
}

impl RaceEnd {
    const fn phase(self) -> RunPhase {
        match self {
            Self::Completed(_) | Self::WaitFailed => RunPhase::Completed,
            Self::TimedOut => RunPhase::TimedOut,
            Self::Interrupted => RunPhase::Interrupted,
        }
    }
}

/// A spawned container process under supervision.
#[derive(Debug)]
pub struct ContainerHandle {
    pid: Pid,
    waiter: Option<JoinHandle<Result<WorkloadExit>>>,
    exit: Option<WorkloadExit>,
    reaped: bool,
}

impl ContainerHandle {
    /// Supervises the already-spawned process `pid`.
    #[must_use]
    pub const fn new(pid: Pid) -> Self {
        Self {
            pid,
            waiter: None,
            exit: None,
            reaped: false,
        }
    }

    /// PID of the container process.
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    /// Exit status, once reaped.
    #[must_use]
    pub const fn exit(&self) -> Option<WorkloadExit> {
        self.exit
    }

    /// Waits for the first of: process exit, `limit` elapsing, or Ctrl+C.
    ///
    /// A zero `limit` disables the timer. Must run inside a Tokio runtime.
    pub async fn race(&mut self, limit: Duration) -> RaceEnd {
        let pid = self.pid;
        let waiter = self
            .waiter
            .get_or_insert_with(|| tokio::task::spawn_blocking(move || process::wait_for_exit(pid)));

        let deadline = async {
            if limit.is_zero() {
                std::future::pending::<()>().await;
            } else {
                tokio::time::sleep(limit).await;
            }
        };
        let interrupt = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            joined = waiter => {
                self.waiter = None;
                match flatten(joined) {
                    Ok(exit) => {
                        self.reaped = true;
                        self.exit = Some(exit);
                        RaceEnd::Completed(exit)
                    }
                    Err(e) => {
                        tracing::warn!(pid = pid.as_raw(), error = %e, "waiting for container failed");
                        RaceEnd::WaitFailed
                    }
                }
            }
            () = deadline => RaceEnd::TimedOut,
            () = interrupt => RaceEnd::Interrupted,
        }
    }

    /// Kills the container process.
    ///
    /// A process that was already reaped is never signalled again, since
    /// its PID may have been reused. A process whose wait failed is still
    /// signalled.
    ///
    /// # Errors
    ///
    /// Returns a supervision error if the process already exited.
    pub fn terminate(&self) -> Result<()> {
        if self.reaped {
            return Err(MiniboxError::Supervision {
                message: format!("process {} already exited", self.pid),
            });
        }
        process::kill_container(self.pid)?;
        tracing::debug!(pid = self.pid.as_raw(), "container killed");
        Ok(())
    }

    /// Waits up to `grace` for the process to be reaped.
    ///
    /// Returns the exit status if it is known.
    pub async fn reap(&mut self, grace: Duration) -> Option<WorkloadExit> {
        if self.reaped {
            return self.exit;
        }
        let Some(waiter) = self.waiter.as_mut() else {
            return None;
        };
        match tokio::time::timeout(grace, waiter).await {
            Ok(joined) => {
                self.waiter = None;
                match flatten(joined) {
                    Ok(exit) => {
                        self.reaped = true;
                        self.exit = Some(exit);
                    }
                    Err(e) => {
                        tracing::warn!(pid = self.pid.as_raw(), error = %e, "reaping container failed");
                    }
                }
            }
            Err(_) => {
                tracing::warn!(
                    pid = self.pid.as_raw(),
                    grace = ?grace,
                    "container not reaped within grace period"
                );
            }
        }
        self.exit
    }
}

fn flatten(
    joined: std::result::Result<Result<WorkloadExit>, tokio::task::JoinError>,
) -> Result<WorkloadExit> {
    joined.map_err(|e| MiniboxError::Supervision {
        message: format!("reaper task: {e}"),
    })?
}

/// Runs containers according to a fixed runtime configuration.
#[derive(Debug, Clone)]
pub struct Launcher {
    config: RuntimeConfig,
    isolation: IsolationSpec,
}

impl Launcher {
    /// Creates a launcher.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let isolation = IsolationSpec::from_config(&config);
        Ok(Self { config, isolation })
    }

    /// Runtime configuration in use.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Runs one container to completion and cleans up after it.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures before the container exists:
    /// an invalid request, a failed ownership change, or a failed spawn.
    /// Everything later is logged and reflected in the outcome.
    pub fn launch(&self, request: &LaunchRequest) -> Result<RunOutcome> {
        let mut phase = RunPhase::Created;
        request.validate()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| MiniboxError::Setup {
                step: "supervisor runtime",
                message: e.to_string(),
            })?;

        ownership::hand_over(request.rootfs(), &self.config.id_mapping)?;
        if let Some(box_dir) = request.box_dir() {
            ownership::hand_over(box_dir, &self.config.id_mapping)?;
        }

        let started_at = chrono::Utc::now().to_rfc3339();
        let start = Instant::now();
        let init = InitRequest::from_launch(request, &self.config);
        let pid = process::spawn_container(&init, &self.isolation)?;
        phase.advance(RunPhase::Spawned)?;
        tracing::info!(
            run_id = %request.run_id(),
            pid = pid.as_raw(),
            command = ?request.command(),
            "container started"
        );

        let group = request
            .limits()
            .and_then(|limits| self.engage_limits(request, pid, limits));

        let mut handle = ContainerHandle::new(pid);
        phase.advance(RunPhase::Racing)?;
        let end = runtime.block_on(handle.race(request.time_limit()));
        phase.advance(end.phase())?;
        match end {
            RaceEnd::Completed(exit) => {
                tracing::info!(run_id = %request.run_id(), %exit, "container exited");
            }
            RaceEnd::WaitFailed => {}
            RaceEnd::TimedOut => tracing::info!(
                run_id = %request.run_id(),
                limit = ?request.time_limit(),
                "time limit reached"
            ),
            RaceEnd::Interrupted => {
                tracing::info!(run_id = %request.run_id(), "interrupted");
            }
        }

        phase.advance(RunPhase::Terminating)?;
        if let Err(e) = handle.terminate() {
            if handle.reaped {
                tracing::debug!(error = %e, "kill skipped");
            } else {
                tracing::warn!(error = %e, "killing container failed");
            }
        }
        let grace = Duration::from_millis(self.config.kill_grace_ms);
        let exit = runtime.block_on(handle.reap(grace));
        let elapsed = start.elapsed();
        runtime.shutdown_background();

        let stats = group
            .as_ref()
            .and_then(|group| Self::release_group(group, &mut phase));
        phase.advance(RunPhase::Done)?;

        Ok(RunOutcome {
            run_id: request.run_id().clone(),
            started_at,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            phase,
            exit,
            timed_out: end == RaceEnd::TimedOut,
            interrupted: end == RaceEnd::Interrupted,
            usage: stats.as_ref().map(UsageSnapshot::from_stats),
            stats,
        })
    }

    /// Creates the run's resource group, writes its limits, and attaches
    /// the container.
    ///
    /// Returns the group whenever its directory was created, so that it is
    /// removed even if a limit could not be applied.
    fn engage_limits(
        &self,
        request: &LaunchRequest,
        pid: Pid,
        limits: &ResourceLimits,
    ) -> Option<ResourceGroup> {
        let path = self.config.cgroup_path(request.run_id());
        let mut group = match ResourceGroup::create(&path) {
            Ok(group) => group,
            Err(e) => {
                tracing::warn!(error = %e, "resource control disabled for this run");
                return None;
            }
        };
        let raw_pid = u32::try_from(pid.as_raw()).unwrap_or_default();
        let applied = group
            .apply_limits(limits)
            .and_then(|()| group.attach(raw_pid));
        if let Err(e) = applied {
            tracing::warn!(error = %e, "resource limits not fully applied");
        }
        Some(group)
    }

    /// Reads the group's counters, then removes it. Failures are logged.
    fn release_group(
        group: &ResourceGroup,
        phase: &mut RunPhase,
    ) -> Option<BTreeMap<String, String>> {
        let stats = match group.read_stats() {
            Ok(stats) => {
                let _ = phase.advance(RunPhase::StatsCollected);
                Some(stats)
            }
            Err(e) => {
                tracing::warn!(error = %e, "reading resource usage failed");
                None
            }
        };
        match group.remove() {
            Ok(()) => {
                let _ = phase.advance(RunPhase::GroupRemoved);
            }
            Err(e) => tracing::warn!(error = %e, "removing resource group failed"),
        }
        stats
    }
}
