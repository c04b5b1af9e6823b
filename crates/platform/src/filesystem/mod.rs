//! Filesystem operations a build needs from the host

use async_trait::async_trait;
use modsmith_errors::PlatformError;
use std::path::Path;

use crate::core::PlatformContext;

/// Trait for filesystem operations used by the build pipeline
#[async_trait]
pub trait FilesystemOperations: Send + Sync {
    /// Create directory and all parent directories; existing is not an error
    async fn ensure_dir(&self, ctx: &PlatformContext, path: &Path) -> Result<(), PlatformError>;

    /// Remove directory and all contents; a missing path is not an error
    async fn remove_tree(&self, ctx: &PlatformContext, path: &Path) -> Result<(), PlatformError>;

    /// Recursively change ownership of `path`, without following symlinks
    async fn chown_tree(
        &self,
        ctx: &PlatformContext,
        path: &Path,
        uid: u32,
        gid: u32,
    ) -> Result<(), PlatformError>;

    /// Entry names of a directory, sorted; a missing directory lists empty
    async fn list_dir(&self, ctx: &PlatformContext, path: &Path)
        -> Result<Vec<String>, PlatformError>;

    /// Recursively copy `src` into `dst`, creating `dst`
    async fn copy_tree(
        &self,
        ctx: &PlatformContext,
        src: &Path,
        dst: &Path,
    ) -> Result<(), PlatformError>;
}
