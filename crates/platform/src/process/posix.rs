use async_trait::async_trait;
use modsmith_errors::PlatformError;
use std::path::PathBuf;
use tokio::process::Command;

use super::{spawn_piped, LaunchRequest, ProcessLauncher, SpawnedProcess};
use crate::core::PlatformContext;

/// Runs the package manager directly, under the requested uid/gid.
///
/// The child sees only the request environment.
#[derive(Debug, Clone)]
pub struct PosixLauncher {
    executable: PathBuf,
}

impl PosixLauncher {
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl Default for PosixLauncher {
    fn default() -> Self {
        Self::new("npm")
    }
}

#[async_trait]
impl ProcessLauncher for PosixLauncher {
    fn strategy(&self) -> &'static str {
        "posix"
    }

    fn command_line(&self, request: &LaunchRequest) -> (PathBuf, Vec<String>) {
        (self.executable.clone(), request.argv())
    }

    async fn launch(
        &self,
        ctx: &PlatformContext,
        request: &LaunchRequest,
    ) -> Result<SpawnedProcess, PlatformError> {
        let (program, args) = self.command_line(request);
        let mut command = Command::new(&program);
        command.env_clear().envs(&request.env);

        #[cfg(unix)]
        {
            if let Some(gid) = request.gid {
                command.gid(gid);
            }
            if let Some(uid) = request.uid {
                command.uid(uid);
            }
        }

        spawn_piped(
            ctx,
            self.strategy(),
            command,
            &program,
            args,
            &request.working_dir,
        )
    }
}
