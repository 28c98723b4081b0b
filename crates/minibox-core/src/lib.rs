//! # minibox-core
//!
//! Low-level Linux isolation primitives for the minibox runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: the fixed namespace set a container is cloned into,
//!   and the UID/GID map written for its user namespace.
//! - **Cgroups v2**: per-run resource groups with memory, CPU, and
//!   process-count ceilings, plus usage counters.
//! - **Filesystem**: the chroot jail built inside the new mount namespace,
//!   and ownership hand-off of the rootfs to the mapped root user.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod filesystem;
pub mod namespace;
