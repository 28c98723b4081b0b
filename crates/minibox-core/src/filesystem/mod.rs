//! Filesystem management for container isolation.
//!
//! Provides the chroot jail built inside the container and the ownership
//! hand-off that lets the mapped root user enter the rootfs.

pub mod jail;
pub mod ownership;
