use async_trait::async_trait;
use modsmith_errors::PlatformError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::{spawn_piped, LaunchRequest, ProcessLauncher, SpawnedProcess};
use crate::core::PlatformContext;

const CLI_SCRIPT: &str = "node_modules/npm/bin/npm-cli.js";
const GYP_BIN: &str = "node_modules/npm/bin/node-gyp-bin";

/// Runs `npm-cli.js` through the bundled runtime's `node.exe`.
///
/// Identity is never applied. The operator's whole environment is passed
/// through with the request environment laid over it, because the exact
/// set the native toolchains need is not known.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsLauncher;

impl WindowsLauncher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Versioned runtime directory, `<runtime>/v<version>/<cpu>`
#[must_use]
pub fn node_dir(request: &LaunchRequest) -> PathBuf {
    request
        .runtime_dir
        .join(format!("v{}", request.version))
        .join(&request.cpu)
}

fn backslashed(path: &Path) -> String {
    path.display().to_string().replace('/', "\\")
}

/// Environment for a Windows launch, computed from the operator's
/// environment and the request.
#[must_use]
pub fn windows_environment(
    ambient: &BTreeMap<String, String>,
    request: &LaunchRequest,
) -> BTreeMap<String, String> {
    let mut env = ambient.clone();
    for (key, value) in &request.env {
        if key == "npm_config_nodedir" {
            continue;
        }
        env.insert(key.clone(), value.clone());
    }

    let search_path = ["path", "PATH", "Path"]
        .iter()
        .find_map(|key| env.get(*key).cloned())
        .unwrap_or_default();
    env.retain(|key, _| !key.eq_ignore_ascii_case("path"));

    let drive = ambient.get("SystemDrive").cloned().unwrap_or_default();
    let gyp_bin = format!("{drive}{}", backslashed(&node_dir(request).join(GYP_BIN)));
    let joined = if search_path.is_empty() {
        gyp_bin
    } else {
        format!("{gyp_bin};{search_path}")
    };
    env.insert("Path".to_string(), joined);

    let username = ambient.get("USERNAME").cloned().unwrap_or_default();
    env.insert("USERNAME".to_string(), username.clone());
    env.insert("npm_config_user".to_string(), username);
    for key in ["APPDATA", "HOMEDRIVE", "HOMEPATH"] {
        match ambient.get(key) {
            Some(value) => env.insert(key.to_string(), value.clone()),
            None => env.remove(key),
        };
    }
    env
}

#[async_trait]
impl ProcessLauncher for WindowsLauncher {
    fn strategy(&self) -> &'static str {
        "windows"
    }

    fn command_line(&self, request: &LaunchRequest) -> (PathBuf, Vec<String>) {
        let dir = node_dir(request);
        let mut args = vec![dir.join(CLI_SCRIPT).display().to_string()];
        args.extend(request.argv());
        (dir.join("node.exe"), args)
    }

    async fn launch(
        &self,
        ctx: &PlatformContext,
        request: &LaunchRequest,
    ) -> Result<SpawnedProcess, PlatformError> {
        let (program, args) = self.command_line(request);
        if !tokio::fs::try_exists(&program).await.unwrap_or(false) {
            let err = PlatformError::CommandNotFound {
                command: program.display().to_string(),
            };
            ctx.emit_failure("launch", &err);
            return Err(err);
        }

        let ambient: BTreeMap<String, String> = std::env::vars().collect();
        let mut command = Command::new(&program);
        command.env_clear().envs(windows_environment(&ambient, request));

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
