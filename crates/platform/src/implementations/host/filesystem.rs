//! Host filesystem operations
//!
//! Thin wrappers over `tokio::fs` and blocking tree walks, adding event
//! emission and uniform `PlatformError` reporting.

use async_trait::async_trait;
use modsmith_errors::PlatformError;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;

use crate::core::PlatformContext;
use crate::filesystem::FilesystemOperations;

/// Host implementation of filesystem operations
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFilesystemOperations;

impl HostFilesystemOperations {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn fs_error(operation: &str, path: &Path, message: impl ToString) -> PlatformError {
    PlatformError::FilesystemOperationFailed {
        operation: operation.to_string(),
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

async fn run_blocking<F>(operation: &'static str, path: &Path, f: F) -> Result<(), PlatformError>
where
    F: FnOnce() -> Result<(), PlatformError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| fs_error(operation, path, format!("task failed: {e}")))?
}

#[cfg(unix)]
fn chown_walk(root: &Path, uid: u32, gid: u32) -> Result<(), PlatformError> {
    use nix::unistd::{Gid, Uid};

    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| fs_error("chown_tree", root, e))?;
        let path = entry.path();
        if entry.path_is_symlink() {
            std::os::unix::fs::lchown(path, Some(uid), Some(gid))
                .map_err(|e| fs_error("chown_tree", path, e))?;
        } else {
            nix::unistd::chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
                .map_err(|e| fs_error("chown_tree", path, e))?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn chown_walk(_root: &Path, _uid: u32, _gid: u32) -> Result<(), PlatformError> {
    Err(PlatformError::CapabilityUnavailable {
        capability: "chown".to_string(),
    })
}

fn copy_walk(src: &Path, dst: &Path) -> Result<(), PlatformError> {
    for entry in walkdir::WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| fs_error("copy_tree", src, e))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| fs_error("copy_tree", entry.path(), e))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| fs_error("copy_tree", &target, e))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| fs_error("copy_tree", &target, e))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, target: &Path) -> Result<(), PlatformError> {
    let link = std::fs::read_link(src).map_err(|e| fs_error("copy_tree", src, e))?;
    std::os::unix::fs::symlink(link, target).map_err(|e| fs_error("copy_tree", target, e))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, target: &Path) -> Result<(), PlatformError> {
    std::fs::copy(src, target)
        .map(|_| ())
        .map_err(|e| fs_error("copy_tree", target, e))
}

#[async_trait]
impl FilesystemOperations for HostFilesystemOperations {
    async fn ensure_dir(&self, ctx: &PlatformContext, path: &Path) -> Result<(), PlatformError> {
        let start = Instant::now();
        let result = fs::create_dir_all(path)
            .await
            .map_err(|e| fs_error("ensure_dir", path, e));
        ctx.record_fs_outcome("ensure_dir", path, start, &result);
        result
    }

    async fn remove_tree(&self, ctx: &PlatformContext, path: &Path) -> Result<(), PlatformError> {
        let start = Instant::now();
        let result = match fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(fs_error("remove_tree", path, e)),
        };
        ctx.record_fs_outcome("remove_tree", path, start, &result);
        result
    }

    async fn chown_tree(
        &self,
        ctx: &PlatformContext,
        path: &Path,
        uid: u32,
        gid: u32,
    ) -> Result<(), PlatformError> {
        let start = Instant::now();
        let root = path.to_path_buf();
        let result = run_blocking("chown_tree", path, move || chown_walk(&root, uid, gid)).await;
        ctx.record_fs_outcome("chown_tree", path, start, &result);
        result
    }

    async fn list_dir(
        &self,
        ctx: &PlatformContext,
        path: &Path,
    ) -> Result<Vec<String>, PlatformError> {
        let start = Instant::now();
        let result = async {
            let mut entries = match fs::read_dir(path).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(fs_error("list_dir", path, e)),
            };
            let mut names = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| fs_error("list_dir", path, e))?
            {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            names.sort();
            Ok(names)
        }
        .await;
        ctx.record_fs_outcome("list_dir", path, start, &result);
        result
    }

    async fn copy_tree(
        &self,
        ctx: &PlatformContext,
        src: &Path,
        dst: &Path,
    ) -> Result<(), PlatformError> {
        let start = Instant::now();
        let (from, to): (PathBuf, PathBuf) = (src.to_path_buf(), dst.to_path_buf());
        let result = run_blocking("copy_tree", src, move || copy_walk(&from, &to)).await;
        ctx.record_fs_outcome("copy_tree", dst, start, &result);
        result
    }
}
