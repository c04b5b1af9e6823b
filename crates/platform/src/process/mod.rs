//! Package-manager process launching
//!
//! Two strategies share one interface: [`PosixLauncher`] runs the package
//! manager directly under the resolved identity, [`WindowsLauncher`] runs
//! the bundled runtime's interpreter with an expanded environment. A
//! strategy is chosen once per [`crate::Platform`], never per call.

mod posix;
mod windows;

pub use posix::PosixLauncher;
pub use windows::{windows_environment, WindowsLauncher};

use async_trait::async_trait;
use modsmith_errors::PlatformError;
use modsmith_events::{AppEvent, EventEmitter, PlatformEvent};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::core::PlatformContext;

/// Everything a launcher needs to start one package-manager run
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Package-manager subcommand (`install`, `build`)
    pub command: String,
    /// Extra arguments appended verbatim
    pub options: Vec<String>,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Runtime installation root
    pub runtime_dir: PathBuf,
    /// Resolved runtime version
    pub version: String,
    /// Target architecture tag
    pub cpu: String,
}

impl LaunchRequest {
    /// Subcommand followed by options
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.command.clone())
            .chain(self.options.iter().cloned())
            .collect()
    }
}

/// A running package-manager subprocess
#[derive(Debug)]
pub struct SpawnedProcess {
    program: String,
    args: Vec<String>,
    child: Child,
}

impl SpawnedProcess {
    #[must_use]
    pub fn new(program: String, args: Vec<String>, child: Child) -> Self {
        Self {
            program,
            args,
            child,
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// OS process id, if still running
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the process to exit
    ///
    /// # Errors
    ///
    /// Returns an error if waiting on the child fails.
    pub async fn wait(&mut self) -> Result<ExitStatus, PlatformError> {
        self.child
            .wait()
            .await
            .map_err(|e| PlatformError::ProcessExecutionFailed {
                command: self.program.clone(),
                message: e.to_string(),
            })
    }
}

/// Strategy for starting the package manager
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Strategy name for logs and events
    fn strategy(&self) -> &'static str;

    /// Program and arguments this strategy would run
    fn command_line(&self, request: &LaunchRequest) -> (PathBuf, Vec<String>);

    /// Start the package manager with piped stdout and stderr
    async fn launch(
        &self,
        ctx: &PlatformContext,
        request: &LaunchRequest,
    ) -> Result<SpawnedProcess, PlatformError>;
}

/// The launcher for the host this binary was built for
#[must_use]
pub fn launcher_for_host(package_manager: &str) -> Box<dyn ProcessLauncher> {
    if cfg!(windows) {
        Box::new(WindowsLauncher::new())
    } else {
        Box::new(PosixLauncher::new(package_manager))
    }
}

/// Spawn a prepared command with piped output and report it
pub(crate) fn spawn_piped(
    ctx: &PlatformContext,
    strategy: &str,
    mut command: Command,
    program: &Path,
    args: Vec<String>,
    working_dir: &Path,
) -> Result<SpawnedProcess, PlatformError> {
    let program_name = program.display().to_string();
    command
        .args(&args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|e| {
        let err = if e.kind() == std::io::ErrorKind::NotFound {
            PlatformError::CommandNotFound {
                command: program_name.clone(),
            }
        } else {
            PlatformError::ProcessExecutionFailed {
                command: program_name.clone(),
                message: e.to_string(),
            }
        };
        ctx.emit_failure("launch", &err);
        err
    })?;

    tracing::debug!(program = %program_name, ?args, pid = ?child.id(), strategy, "spawned package manager");
    ctx.emit(AppEvent::Platform(PlatformEvent::ProcessLaunched {
        program: program_name.clone(),
        args: args.clone(),
        working_dir: working_dir.display().to_string(),
        strategy: strategy.to_string(),
    }));

    Ok(SpawnedProcess::new(program_name, args, child))
}
