//! Container run lifecycle for the minibox runtime.
//!
//! The [`launcher::Launcher`] clones a re-execution of the current binary
//! into a fresh namespace set, where [`init::run_init`] builds the jail and
//! becomes the workload. The launcher supervises that process against a
//! wall-clock limit and tears down its resource group afterward.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod init;
pub mod launcher;
pub mod metrics;
pub mod process;
pub mod state;
