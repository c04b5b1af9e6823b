//! Host runtime probing

use tokio::process::Command;

use crate::version::parse_version;

/// Version of the `node` on `PATH`, if one runs
pub async fn detect_host_runtime() -> Option<String> {
    let output = match Command::new("node").arg("--version").output().await {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!(error = %e, "no host runtime found");
            return None;
        }
    };
    if !output.status.success() {
        return None;
    }
    parse_version(&String::from_utf8_lossy(&output.stdout)).map(|v| v.to_string())
}
