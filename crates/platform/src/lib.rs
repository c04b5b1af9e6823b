#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Platform abstraction layer for modsmith build operations.
//!
//! This crate provides a unified interface for the host operations a build
//! depends on:
//! - Filesystem operations (idempotent mkdir, recursive delete and chown)
//! - Identity resolution for dropping privileges
//! - Package-manager process launching, one strategy per host family
//!
//! Every operation reports through the modsmith event system and returns
//! `PlatformError` on failure.

pub mod core;
pub mod filesystem;
pub mod identity;
pub mod implementations;
pub mod process;

pub use core::{Platform, PlatformContext};
pub use implementations::host::HostFilesystemOperations;
#[cfg(unix)]
pub use implementations::host::UnixIdentityOperations;

/// Re-export commonly used types
pub use filesystem::FilesystemOperations;
pub use identity::{Identity, IdentityOperations, NoPrivilegeDrop};
pub use process::{
    launcher_for_host, LaunchRequest, PosixLauncher, ProcessLauncher, SpawnedProcess,
    WindowsLauncher,
};
