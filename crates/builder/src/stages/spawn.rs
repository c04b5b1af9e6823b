use modsmith_config::constants::NODE_MODULES;
use modsmith_errors::{BuildError, Error};
use modsmith_platform::{LaunchRequest, Platform, PlatformContext, SpawnedProcess};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::completion::Completion;
use crate::description::{BuildCommand, BuildDescription};
use crate::packaging::create_fresh;

type SharedLog<L> = Arc<Mutex<L>>;

const CHUNK: usize = 8 * 1024;

/// How long output may keep flowing after the package manager exits.
/// Descendants that inherited the pipes are not waited for past this.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// How the supervised process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Supervised {
    /// Exit code, `None` if the process was killed
    pub code: Option<i32>,
    /// Output was still open when the grace period ran out
    pub detached: bool,
}

/// Create the capture log, replacing anything left at `log_path`.
///
/// Must run before the package manager starts; the root is writable by it.
pub(crate) async fn open_log(log_path: &Path) -> Result<File, Error> {
    match tokio::fs::remove_file(log_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io_with_path(&e, log_path)),
    }
    create_fresh(log_path).await
}

/// Start the package manager for `desc`.
///
/// `build` runs recompile native code against whatever is installed, so a
/// stale `node_modules` is purged first.
pub(crate) async fn launch(
    platform: &Platform,
    ctx: &PlatformContext,
    desc: &BuildDescription,
) -> Result<SpawnedProcess, Error> {
    if desc.command == BuildCommand::Build {
        let deps_dir = desc.directories.module.join(NODE_MODULES);
        platform.filesystem().remove_tree(ctx, &deps_dir).await?;
    }

    let request = LaunchRequest {
        command: desc.command.as_str().to_string(),
        options: desc.options.clone(),
        working_dir: desc.directories.module.clone(),
        env: desc.env.clone(),
        uid: desc.numeric_uid(),
        gid: desc.numeric_gid(),
        runtime_dir: desc.directories.runtime.clone(),
        version: desc.version.clone().unwrap_or_default(),
        cpu: desc.cpu.clone(),
    };
    Ok(platform.launcher().launch(ctx, &request).await?)
}

/// Tee the child's output into `log` (and the operator's terminal when
/// `passthrough` is set), then wait for it to exit.
///
/// A failure to capture output is delivered through `completion` as soon as
/// it happens. Once the child exits, capture gets [`DRAIN_GRACE`] to reach
/// end of output before it is cut off.
pub(crate) async fn supervise<L>(
    process: &mut SpawnedProcess,
    log: L,
    log_path: &Path,
    passthrough: bool,
    completion: &Completion,
) -> Result<Supervised, Error>
where
    L: AsyncWrite + Unpin + Send + 'static,
{
    let log: SharedLog<L> = Arc::new(Mutex::new(log));

    let mut tees: Vec<JoinHandle<()>> = Vec::with_capacity(2);
    if let Some(stdout) = process.take_stdout() {
        let operator = passthrough.then(tokio::io::stdout);
        tees.push(tokio::spawn(tee(
            stdout,
            operator,
            Arc::clone(&log),
            log_path.to_path_buf(),
            completion.clone(),
        )));
    }
    if let Some(stderr) = process.take_stderr() {
        let operator = passthrough.then(tokio::io::stderr);
        tees.push(tokio::spawn(tee(
            stderr,
            operator,
            Arc::clone(&log),
            log_path.to_path_buf(),
            completion.clone(),
        )));
    }

    let status = process.wait().await?;
    let detached = match tokio::time::timeout(
        DRAIN_GRACE,
        futures::future::join_all(tees.iter_mut()),
    )
    .await
    {
        Ok(joined) => {
            for result in joined {
                result.map_err(|e| Error::internal(format!("output capture task failed: {e}")))?;
            }
            false
        }
        Err(_) => {
            tracing::warn!(
                program = %process.program(),
                "output still open after exit, detaching capture"
            );
            for handle in &tees {
                handle.abort();
            }
            true
        }
    };
    log.lock()
        .await
        .flush()
        .await
        .map_err(|e| Error::io_with_path(&e, log_path))?;

    Ok(Supervised {
        code: status.code(),
        detached,
    })
}

/// Map an exit code to the pipeline's verdict
pub(crate) fn exit_result(program: &str, code: Option<i32>, log_path: &Path) -> Result<(), Error> {
    match code {
        Some(0) => Ok(()),
        Some(code) => Err(BuildError::ExitedWithCode {
            program: program.to_string(),
            code,
            log: Some(log_path.to_path_buf()),
        }
        .into()),
        None => Err(BuildError::Terminated {
            program: program.to_string(),
        }
        .into()),
    }
}

async fn tee<R, W, L>(
    mut reader: R,
    mut operator: Option<W>,
    log: SharedLog<L>,
    log_path: PathBuf,
    completion: Completion,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    L: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                completion.fail(Error::io_with_path(&e, &log_path));
                return;
            }
        };

        if let Err(e) = log.lock().await.write_all(&buf[..n]).await {
            completion.fail(Error::io_with_path(&e, &log_path));
            return;
        }

        if let Some(out) = operator.as_mut() {
            let written = match out.write_all(&buf[..n]).await {
                Ok(()) => out.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                tracing::debug!(error = %e, "operator output closed, continuing capture only");
                operator = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::process::Command;

    /// A log sink whose writes always fail
    struct BrokenLog;

    impl AsyncWrite for BrokenLog {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::other("disk full")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[cfg(unix)]
    fn shell(script: &str) -> SpawnedProcess {
        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(script)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        SpawnedProcess::new("sh".into(), vec![], child)
    }

    #[test]
    fn exit_codes_map_to_verdicts() {
        let log = Path::new("/tmp/root/stdio.log");
        exit_result("npm", Some(0), log).unwrap();

        let err = exit_result("npm", Some(1), log).unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        match err {
            Error::Build(build) => assert_eq!(build.log_path(), Some(log)),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = exit_result("npm", None, log).unwrap_err();
        assert!(matches!(err, Error::Build(BuildError::Terminated { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn log_replaces_planted_symlink() {
        let temp = tempfile::tempdir().unwrap();
        let victim = temp.path().join("victim");
        std::fs::write(&victim, "original").unwrap();
        let log_path = temp.path().join("stdio.log");
        std::os::unix::fs::symlink(&victim, &log_path).unwrap();

        let mut log = open_log(&log_path).await.unwrap();
        log.write_all(b"captured").await.unwrap();
        log.flush().await.unwrap();

        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "original");
        assert_eq!(std::fs::read_to_string(&log_path).unwrap(), "captured");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn backgrounded_descendant_does_not_hold_the_build() {
        let temp = tempfile::tempdir().unwrap();
        let log_path = temp.path().join("stdio.log");
        let log = open_log(&log_path).await.unwrap();
        let (completion, _receiver) = Completion::new();

        let mut process = shell("echo started; sleep 30 & exit 0");
        let started = std::time::Instant::now();
        let supervised = supervise(&mut process, log, &log_path, false, &completion)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(15));
        assert_eq!(supervised.code, Some(0));
        assert!(supervised.detached);
        assert!(std::fs::read_to_string(&log_path).unwrap().contains("started"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn capture_failure_beats_the_exit_failure() {
        let (completion, receiver) = Completion::new();
        let log_path = Path::new("/tmp/root/stdio.log");

        let mut process = shell("echo doomed; exit 3");
        let supervised = supervise(&mut process, BrokenLog, log_path, false, &completion)
            .await
            .unwrap();
        assert_eq!(supervised.code, Some(3));
        assert!(completion.is_delivered());

        let exited = exit_result("sh", supervised.code, log_path).unwrap_err();
        assert_eq!(exited.exit_code(), Some(3));
        assert!(!completion.fail(exited));

        let outcome = receiver.await.unwrap();
        assert!(matches!(outcome, Err(Error::Io { .. })));
    }
}
