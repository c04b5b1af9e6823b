use futures::future::try_join_all;
use modsmith_config::constants::DIAGNOSTIC_LOGS;
use modsmith_errors::{BuildError, Error};
use std::path::{Path, PathBuf};

/// Fail if the package manager left a non-empty diagnostic log behind
pub(crate) async fn check_diagnostic_logs(module_dir: &Path) -> Result<(), Error> {
    let contents = try_join_all(
        DIAGNOSTIC_LOGS
            .iter()
            .map(|name| read_optional(module_dir.join(name))),
    )
    .await?;

    let (files, logs): (Vec<String>, Vec<String>) = DIAGNOSTIC_LOGS
        .iter()
        .zip(contents)
        .filter(|(_, text)| !text.is_empty())
        .map(|(name, text)| ((*name).to_string(), text))
        .unzip();

    if files.is_empty() {
        return Ok(());
    }
    tracing::warn!(files = ?files, "package manager exited 0 but left diagnostic logs");
    Err(BuildError::SilentFailure {
        files,
        log: logs.join("\n"),
    }
    .into())
}

async fn read_optional(path: PathBuf) -> Result<String, Error> {
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(Error::io_with_path(&e, path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_logs_are_clean() {
        let dir = TempDir::new().unwrap();
        check_diagnostic_logs(dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn empty_logs_are_clean() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("npm-debug.log"), "").unwrap();
        check_diagnostic_logs(dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn non_empty_logs_fail_with_contents() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("builderror.log"), "gyp ERR!").unwrap();
        std::fs::write(dir.path().join("npm-debug.log"), "npm ERR!").unwrap();

        let err = check_diagnostic_logs(dir.path()).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(
            err.to_string(),
            "build error: error output from builderror.log, npm-debug.log"
        );
        match err {
            Error::Build(BuildError::SilentFailure { files, log }) => {
                assert_eq!(files, vec!["builderror.log", "npm-debug.log"]);
                assert_eq!(log, "gyp ERR!\nnpm ERR!");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
