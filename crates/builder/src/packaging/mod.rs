//! Packaging of the finished module: deterministic tar, then gzip
//!
//! The archive is spooled to disk before it is handed out, so every
//! packaging error surfaces before the build reports success. Spool files
//! are always created fresh; an existing path, symlink or not, is an error.

pub mod archive;
pub mod compression;
pub mod output;

pub use archive::{create_deterministic_tar_archive, get_deterministic_timestamp};
pub use compression::compress_with_gzip;
pub use output::BuildOutput;

use modsmith_config::constants;
use modsmith_errors::{BuildError, Error};
use std::path::Path;

/// Pack `source_dir` into a gzipped tarball at `output_path`.
///
/// Entries are prefixed with the directory's own name, the way npm
/// tarballs carry `package/`.
///
/// # Errors
///
/// Returns an error if the tree cannot be read or the archive cannot be
/// written.
pub async fn pack_directory(
    source_dir: &Path,
    output_path: &Path,
    timestamp: u64,
) -> Result<(), Error> {
    let prefix = source_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BuildError::ArchiveFailed {
            message: format!("cannot archive {}", source_dir.display()),
        })?;
    let tar_path = output_path.with_extension("tar");

    archive::create_deterministic_tar_archive_with_timestamp(
        source_dir, &prefix, &tar_path, timestamp,
    )
    .await?;
    let compressed = compress_with_gzip(&tar_path, output_path).await;
    let _ = tokio::fs::remove_file(&tar_path).await;
    compressed
}

/// Spool the module directory into a private directory and open it for
/// reading.
///
/// The spool lives outside the build root, where the package manager has
/// no write access, and is removed when the returned output is dropped.
///
/// # Errors
///
/// Returns `BuildError::ArchiveFailed` for any failure while packing.
pub async fn pack_module(module_dir: &Path) -> Result<BuildOutput, Error> {
    let archive_failed = |e: Error| match e {
        Error::Build(BuildError::ArchiveFailed { .. }) => e,
        other => BuildError::ArchiveFailed {
            message: other.to_string(),
        }
        .into(),
    };

    let spool = tempfile::Builder::new()
        .prefix("modsmith-spool-")
        .tempdir()
        .map_err(|e| archive_failed(e.into()))?;
    let output_path = spool.path().join(constants::ARCHIVE_FILE);
    pack_directory(module_dir, &output_path, get_deterministic_timestamp())
        .await
        .map_err(archive_failed)?;
    BuildOutput::spooled(output_path, spool).await
}

/// Create `path` for writing, refusing to reuse or follow anything already
/// there.
pub(crate) async fn create_fresh(path: &Path) -> Result<tokio::fs::File, Error> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn existing_spool_path_is_never_followed() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("package");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("index.js"), "1").unwrap();

        let victim = temp.path().join("victim");
        std::fs::write(&victim, "original").unwrap();
        let out = temp.path().join("module.tgz");
        std::os::unix::fs::symlink(&victim, out.with_extension("tar")).unwrap();

        assert!(pack_directory(&src, &out, 0).await.is_err());
        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "original");
    }

    #[tokio::test]
    async fn module_is_spooled_outside_its_tree() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("package");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("index.js"), "1").unwrap();

        let output = pack_module(&src).await.unwrap();
        let spooled = output.path().to_path_buf();
        assert!(!spooled.starts_with(temp.path()));
        assert!(output.len().await.unwrap() > 0);

        drop(output);
        assert!(!spooled.exists());
    }
}
