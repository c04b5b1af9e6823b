//! Deterministic TAR archive creation
//!
//! Ownership, timestamps and permission bits are normalized and entries are
//! written in sorted order, so the same tree always yields the same bytes.
//! Plain ustar headers are used; nothing host-specific is recorded.

use modsmith_errors::{BuildError, Error};
use std::path::{Path, PathBuf};

use super::create_fresh;

/// Default deterministic timestamp (Unix epoch)
const DETERMINISTIC_TIMESTAMP: u64 = 0;

/// Environment variable for `SOURCE_DATE_EPOCH` (standard for reproducible builds)
const SOURCE_DATE_EPOCH_VAR: &str = "SOURCE_DATE_EPOCH";

/// Create a deterministic tar archive of `source_dir` under `prefix/`
///
/// # Errors
///
/// Returns an error if file I/O operations fail or tar creation fails.
pub async fn create_deterministic_tar_archive(
    source_dir: &Path,
    prefix: &str,
    tar_path: &Path,
) -> Result<(), Error> {
    create_deterministic_tar_archive_with_timestamp(
        source_dir,
        prefix,
        tar_path,
        get_deterministic_timestamp(),
    )
    .await
}

/// Create deterministic tar archive with explicit timestamp
///
/// # Errors
///
/// Returns an error if file I/O operations fail or tar creation fails.
pub async fn create_deterministic_tar_archive_with_timestamp(
    source_dir: &Path,
    prefix: &str,
    tar_path: &Path,
    timestamp: u64,
) -> Result<(), Error> {
    use tar::Builder;

    let file = create_fresh(tar_path).await?.into_std().await;
    let source_dir = source_dir.to_path_buf();
    let prefix = PathBuf::from(prefix);

    tokio::task::spawn_blocking(move || -> Result<(), Error> {
        let mut tar_builder = Builder::new(file);
        tar_builder.follow_symlinks(false);

        append_directory_entry(&mut tar_builder, &prefix, timestamp)?;
        add_directory_to_tar_with_timestamp(&mut tar_builder, &source_dir, &prefix, timestamp)?;
        tar_builder.finish()?;

        Ok(())
    })
    .await
    .map_err(|e| BuildError::ArchiveFailed {
        message: format!("tar creation task failed: {e}"),
    })??;

    Ok(())
}

fn normalized_header(entry_type: tar::EntryType, size: u64, mode: u32, mtime: u64) -> tar::Header {
    let mut header = tar::Header::new_ustar();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(mode);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    header
}

fn append_directory_entry(
    tar_builder: &mut tar::Builder<std::fs::File>,
    tar_path: &Path,
    timestamp: u64,
) -> Result<(), Error> {
    let mut header = normalized_header(tar::EntryType::Directory, 0, 0o755, timestamp);
    let dir_path = format!("{}/", tar_path.display());
    tar_builder.append_data(&mut header, dir_path, std::io::empty())?;
    Ok(())
}

/// Recursively add directory contents with deterministic ordering
fn add_directory_to_tar_with_timestamp(
    tar_builder: &mut tar::Builder<std::fs::File>,
    dir_path: &Path,
    tar_path: &Path,
    timestamp: u64,
) -> Result<(), Error> {
    let mut entries = std::fs::read_dir(dir_path)?.collect::<Result<Vec<_>, _>>()?;

    // Byte-wise name order, independent of filesystem and locale
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let file_path = entry.path();
        let tar_entry_path = tar_path.join(entry.file_name());
        let metadata = std::fs::symlink_metadata(&file_path)?;

        if metadata.is_dir() {
            append_directory_entry(tar_builder, &tar_entry_path, timestamp)?;
            add_directory_to_tar_with_timestamp(tar_builder, &file_path, &tar_entry_path, timestamp)?;
        } else if metadata.is_file() {
            let mut file = std::fs::File::open(&file_path)?;
            let mut header = normalized_header(
                tar::EntryType::Regular,
                metadata.len(),
                normalize_file_permissions(&metadata),
                timestamp,
            );
            tar_builder.append_data(&mut header, &tar_entry_path, &mut file)?;
        } else if metadata.is_symlink() {
            let target = std::fs::read_link(&file_path)?;
            let mut header = normalized_header(tar::EntryType::Symlink, 0, 0o777, timestamp);
            tar_builder.append_link(&mut header, &tar_entry_path, &target)?;
        }
        // Device nodes, fifos and sockets are skipped
    }

    Ok(())
}

/// Get deterministic timestamp for reproducible builds
/// Uses `SOURCE_DATE_EPOCH` if set, otherwise uses epoch (0)
#[must_use]
pub fn get_deterministic_timestamp() -> u64 {
    std::env::var(SOURCE_DATE_EPOCH_VAR)
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .unwrap_or(DETERMINISTIC_TIMESTAMP)
}

/// Executables become 0755, everything else 0644
#[cfg(unix)]
fn normalize_file_permissions(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;

    if metadata.permissions().mode() & 0o111 != 0 {
        0o755
    } else {
        0o644
    }
}

#[cfg(not(unix))]
fn normalize_file_permissions(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn entries(tar_path: &Path) -> Vec<(String, tar::EntryType, u64, u64)> {
        let mut archive = tar::Archive::new(std::fs::File::open(tar_path).unwrap());
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                let h = e.header();
                (
                    e.path().unwrap().display().to_string(),
                    h.entry_type(),
                    h.uid().unwrap(),
                    h.mtime().unwrap(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn entries_are_sorted_prefixed_and_normalized() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("package");
        std::fs::create_dir_all(src.join("lib")).unwrap();
        std::fs::write(src.join("package.json"), "{}").unwrap();
        std::fs::write(src.join("lib/b.js"), "b").unwrap();
        std::fs::write(src.join("lib/a.js"), "a").unwrap();

        let tar_path = temp.path().join("out.tar");
        create_deterministic_tar_archive_with_timestamp(&src, "package", &tar_path, 42)
            .await
            .unwrap();

        let listed = entries(&tar_path);
        let names: Vec<&str> = listed.iter().map(|(n, ..)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "package/",
                "package/lib/",
                "package/lib/a.js",
                "package/lib/b.js",
                "package/package.json"
            ]
        );
        assert!(listed.iter().all(|(_, _, uid, mtime)| *uid == 0 && *mtime == 42));
    }

    #[tokio::test]
    async fn identical_trees_produce_identical_bytes() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("package");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("index.js"), "module.exports = 1;\n").unwrap();

        let first = temp.path().join("one.tar");
        let second = temp.path().join("two.tar");
        create_deterministic_tar_archive_with_timestamp(&src, "package", &first, 0)
            .await
            .unwrap();
        std::fs::write(src.join("index.js"), "module.exports = 1;\n").unwrap();
        create_deterministic_tar_archive_with_timestamp(&src, "package", &second, 0)
            .await
            .unwrap();

        let mut a = Vec::new();
        let mut b = Vec::new();
        std::fs::File::open(first).unwrap().read_to_end(&mut a).unwrap();
        std::fs::File::open(second).unwrap().read_to_end(&mut b).unwrap();
        assert_eq!(a, b);
    }
}
