//! Pipeline stages
//!
//! Each stage takes the description produced by the previous one and
//! either hands it on or fails the build. Ordering and completion are the
//! orchestrator's business; nothing in here retries.

mod logs;
mod metadata;
mod prepare;
mod scaffold;
mod spawn;

pub(crate) use logs::check_diagnostic_logs;
pub(crate) use metadata::patch_manifest;
pub(crate) use prepare::prepare;
pub(crate) use scaffold::scaffold;
pub(crate) use spawn::{exit_result, launch, open_log, supervise};

use modsmith_errors::{BuildError, Error};
use serde_json::Value;
use std::path::Path;

/// Read and parse the package manifest at `path`
pub(crate) async fn read_manifest(path: &Path) -> Result<Value, Error> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BuildError::ManifestNotFound {
                path: path.display().to_string(),
            }
            .into())
        }
        Err(e) => return Err(Error::io_with_path(&e, path)),
    };
    Ok(serde_json::from_slice(&bytes)?)
}
