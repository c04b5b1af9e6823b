//! Operations backed by the running host

pub mod filesystem;
#[cfg(unix)]
pub mod identity;

pub use filesystem::HostFilesystemOperations;
#[cfg(unix)]
pub use identity::UnixIdentityOperations;
