//! # minibox-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the minibox workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and defines the launch request, resource limits, and
//! identity mapping that the isolation and runtime crates consume.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
