//! Run lifecycle state.
//!
//! A run moves through a fixed sequence of phases. Every path out of the
//! supervision race passes through [`RunPhase::Terminating`], so the kill
//! and cleanup steps can never be skipped.

use std::fmt;

use minibox_common::error::{MiniboxError, Result};
use minibox_common::types::RunId;
use serde::Serialize;

use crate::metrics::UsageSnapshot;

/// Phase of a single container run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Request validated; nothing spawned yet.
    Created,
    /// Container process exists in its namespaces.
    Spawned,
    /// Waiting for process exit, the time limit, or an interrupt.
    Racing,
    /// The wall-clock limit fired first.
    TimedOut,
    /// The container process exited on its own.
    Completed,
    /// The launcher was interrupted from the terminal.
    Interrupted,
    /// The container is being killed and reaped.
    Terminating,
    /// Resource counters were read.
    StatsCollected,
    /// The resource group was deleted.
    GroupRemoved,
    /// Terminal state.
    Done,
}

impl RunPhase {
    /// Returns `true` if the run may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Spawned)
                | (Self::Spawned, Self::Racing)
                | (
                    Self::Racing,
                    Self::TimedOut | Self::Completed | Self::Interrupted
                )
                | (
                    Self::TimedOut | Self::Completed | Self::Interrupted,
                    Self::Terminating
                )
                | (
                    Self::Terminating,
                    Self::StatsCollected | Self::GroupRemoved | Self::Done
                )
                | (Self::StatsCollected, Self::GroupRemoved | Self::Done)
                | (Self::GroupRemoved, Self::Done)
        )
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns a supervision error if the transition is not allowed.
    pub fn advance(&mut self, next: Self) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(MiniboxError::Supervision {
                message: format!("illegal run transition {self} -> {next}"),
            });
        }
        tracing::trace!(from = %self, to = %next, "run phase");
        *self = next;
        Ok(())
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Spawned => "spawned",
            Self::Racing => "racing",
            Self::TimedOut => "timed_out",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Terminating => "terminating",
            Self::StatsCollected => "stats_collected",
            Self::GroupRemoved => "group_removed",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// How the container process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkloadExit {
    /// Normal exit with a status code.
    Exited {
        /// Exit status.
        code: i32,
    },
    /// Terminated by a signal.
    Signaled {
        /// Signal number.
        signal: i32,
    },
}

impl WorkloadExit {
    /// Shell-style exit code: the status itself, or 128 plus the signal.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Exited { code } => code,
            Self::Signaled { signal } => 128 + signal,
        }
    }

    /// Returns `true` for a zero exit status.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }
}

impl fmt::Display for WorkloadExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code } => write!(f, "exited with status {code}"),
            Self::Signaled { signal } => {
                match nix::sys::signal::Signal::try_from(*signal) {
                    Ok(sig) => write!(f, "killed by {sig}"),
                    Err(_) => write!(f, "killed by signal {signal}"),
                }
            }
        }
    }
}

/// Result of one container run, as reported to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Identifier of the run.
    pub run_id: RunId,
    /// RFC 3339 timestamp of the launch.
    pub started_at: String,
    /// Wall-clock time from spawn to reap, in milliseconds.
    pub elapsed_ms: u64,
    /// Final phase reached.
    pub phase: RunPhase,
    /// How the process ended, if it was reaped.
    pub exit: Option<WorkloadExit>,
    /// The time limit fired before the process exited.
    pub timed_out: bool,
    /// The launcher was interrupted before the process exited.
    pub interrupted: bool,
    /// Raw resource counters, when resource control was enabled and
    /// readable.
    pub stats: Option<std::collections::BTreeMap<String, String>>,
    /// Parsed view of `stats`.
    pub usage: Option<UsageSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(path: &[RunPhase]) -> Result<RunPhase> {
        let mut phase = RunPhase::Created;
        for next in path {
            phase.advance(*next)?;
        }
        Ok(phase)
    }

    #[test]
    fn full_run_with_resource_control() {
        let end = walk(&[
            RunPhase::Spawned,
            RunPhase::Racing,
            RunPhase::TimedOut,
            RunPhase::Terminating,
            RunPhase::StatsCollected,
            RunPhase::GroupRemoved,
            RunPhase::Done,
        ])
        .expect("legal path");
        assert_eq!(end, RunPhase::Done);
    }

    #[test]
    fn run_without_resource_control_skips_stats() {
        let end = walk(&[
            RunPhase::Spawned,
            RunPhase::Racing,
            RunPhase::Completed,
            RunPhase::Terminating,
            RunPhase::Done,
        ])
        .expect("legal path");
        assert_eq!(end, RunPhase::Done);
    }

    #[test]
    fn race_cannot_skip_termination() {
        let err = walk(&[
            RunPhase::Spawned,
            RunPhase::Racing,
            RunPhase::Completed,
            RunPhase::Done,
        ])
        .unwrap_err();
        assert!(matches!(err, MiniboxError::Supervision { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn failed_advance_keeps_phase() {
        let mut phase = RunPhase::Spawned;
        assert!(phase.advance(RunPhase::Terminating).is_err());
        assert_eq!(phase, RunPhase::Spawned);
    }

    #[test]
    fn exit_codes_follow_shell_convention() {
        assert_eq!(WorkloadExit::Exited { code: 3 }.code(), 3);
        assert_eq!(WorkloadExit::Signaled { signal: 9 }.code(), 137);
        assert!(WorkloadExit::Exited { code: 0 }.success());
        assert!(!WorkloadExit::Signaled { signal: 9 }.success());
    }

    #[test]
    fn signaled_exit_names_the_signal() {
        let exit = WorkloadExit::Signaled { signal: 9 };
        assert_eq!(exit.to_string(), "killed by SIGKILL");
    }
}
