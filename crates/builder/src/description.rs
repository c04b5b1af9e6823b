//! Build requests, instance defaults and the resolved build description

use modsmith_config::{constants, host_cpu, host_os, npm_arch, Config};
use modsmith_errors::{BuildError, Error};
use modsmith_platform::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::fetch::RepositorySpec;
use crate::merge::deep_merge;

/// Package-manager subcommand for a build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildCommand {
    #[default]
    Install,
    /// Rebuild native code; stale `node_modules` is purged first
    Build,
}

impl BuildCommand {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Build => "build",
        }
    }
}

impl fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" => Ok(Self::Install),
            "build" => Ok(Self::Build),
            other => Err(modsmith_errors::ConfigError::InvalidValue {
                field: "command".to_string(),
                value: other.to_string(),
            }
            .into()),
        }
    }
}

/// Directory overrides a caller may supply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDirectories {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<PathBuf>,
}

/// A caller's partial build description. Unset fields take instance defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<BuildCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositorySpec>,
    #[serde(default)]
    pub directories: RequestDirectories,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Explicit runtime version; skips resolution when valid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Environment overrides with the highest precedence
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl BuildRequest {
    /// A request rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            directories: RequestDirectories {
                root: Some(root.into()),
                runtime: None,
            },
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_repository(mut self, repository: RepositorySpec) -> Self {
        self.repository = Some(repository);
        self
    }

    #[must_use]
    pub fn with_command(mut self, command: BuildCommand) -> Self {
        self.command = Some(command);
        self
    }
}

/// Orchestrator defaults, fixed at construction
#[derive(Debug, Clone)]
pub struct Defaults {
    pub command: BuildCommand,
    pub uid: Identity,
    pub gid: Identity,
    pub os: String,
    pub cpu: String,
    pub runtime_dir: Option<PathBuf>,
    /// Native header root; the resolved version is appended
    pub headers_dir: PathBuf,
    /// Base environment beneath everything generated
    pub env: BTreeMap<String, String>,
}

impl Defaults {
    /// Derive defaults from configuration and the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured command is unknown.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let mut env = BTreeMap::new();
        if let Ok(path) = std::env::var("PATH") {
            env.insert("PATH".to_string(), path);
        }
        env.extend(config.env.clone());

        let headers_dir = config.runtime.headers_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_default()
                .join(".node-gyp")
        });

        Ok(Self {
            command: config.build.command.parse()?,
            uid: Identity::parse(&config.identity.user),
            gid: Identity::parse(&config.identity.group),
            os: config.target_os(),
            cpu: config.target_cpu(),
            runtime_dir: config.runtime.runtime_dir.clone(),
            headers_dir,
            env,
        })
    }

    fn as_request(&self) -> BuildRequest {
        BuildRequest {
            command: Some(self.command),
            directories: RequestDirectories {
                root: None,
                runtime: self.runtime_dir.clone(),
            },
            uid: Some(self.uid.clone()),
            gid: Some(self.gid.clone()),
            os: Some(self.os.clone()),
            cpu: Some(self.cpu.clone()),
            ..BuildRequest::default()
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            command: BuildCommand::Install,
            uid: Identity::Name("nobody".to_string()),
            gid: Identity::Name("nobody".to_string()),
            os: host_os(),
            cpu: host_cpu(),
            runtime_dir: None,
            headers_dir: PathBuf::from(".node-gyp"),
            env: BTreeMap::new(),
        }
    }
}

/// Working directories of one build, all under `root`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directories {
    pub root: PathBuf,
    pub build: PathBuf,
    /// Fetched module; created by the fetch, never scaffolded
    pub module: PathBuf,
    pub npm_cache: PathBuf,
    pub tmp: PathBuf,
    pub runtime: PathBuf,
}

impl Directories {
    /// Conventional layout under `root`
    #[must_use]
    pub fn from_root(root: &Path, runtime: Option<PathBuf>) -> Self {
        let build = root.join(constants::BUILD_DIR);
        Self {
            root: root.to_path_buf(),
            module: build.join(constants::MODULE_DIR),
            build,
            npm_cache: root.join(constants::CACHE_DIR),
            tmp: root.join(constants::TMP_DIR),
            runtime: runtime.unwrap_or_else(|| root.join(constants::RUNTIME_DIR)),
        }
    }

    /// Every directory the scaffolder creates
    #[must_use]
    pub fn scaffolded(&self) -> Vec<&Path> {
        vec![
            &self.root,
            &self.build,
            &self.npm_cache,
            &self.tmp,
            &self.runtime,
        ]
    }
}

/// A fully defaulted build plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDescription {
    pub command: BuildCommand,
    pub repository: Option<RepositorySpec>,
    pub directories: Directories,
    /// `None` once privilege drop is known to be unavailable
    pub uid: Option<Identity>,
    pub gid: Option<Identity>,
    pub os: String,
    pub cpu: String,
    pub version: Option<String>,
    pub env: BTreeMap<String, String>,
    /// Caller-supplied environment, re-applied over manifest overrides
    #[serde(skip)]
    pub env_overrides: BTreeMap<String, String>,
    pub options: Vec<String>,
    pub filename: Option<String>,
}

impl BuildDescription {
    /// Merge `request` over `defaults`.
    ///
    /// The result's environment layers, lowest first: defaults, generated
    /// package-manager configuration, the caller's `env`. `HOME`, `ROOT` and
    /// `TMPDIR` always point inside the root regardless of any layer.
    ///
    /// # Errors
    ///
    /// Returns an error if `directories.root` is missing.
    pub fn from_request(request: &BuildRequest, defaults: &Defaults) -> Result<Self, Error> {
        let root = request
            .directories
            .root
            .clone()
            .ok_or_else(|| BuildError::MissingField {
                field: "directories.root".to_string(),
            })?;

        let layered = deep_merge(
            &serde_json::to_value(defaults.as_request())?,
            &serde_json::to_value(request)?,
        );
        let merged: BuildRequest = serde_json::from_value(layered)?;

        let directories = Directories::from_root(&root, merged.directories.runtime);
        let command = merged.command.unwrap_or(defaults.command);
        let uid = merged.uid.unwrap_or_else(|| defaults.uid.clone());
        let gid = merged.gid.unwrap_or_else(|| defaults.gid.clone());
        let os = merged.os.unwrap_or_else(|| defaults.os.clone());
        let cpu = merged.cpu.unwrap_or_else(|| defaults.cpu.clone());

        let mut env = defaults.env.clone();
        env.extend(generated_env(
            &directories,
            &cpu,
            &uid,
            merged.version.as_deref(),
            &defaults.headers_dir,
        ));
        env.extend(request.env.clone());
        env.extend(root_env(&directories));

        Ok(Self {
            command,
            repository: merged.repository,
            directories,
            uid: Some(uid),
            gid: Some(gid),
            os,
            cpu,
            version: merged.version,
            env,
            env_overrides: request.env.clone(),
            options: merged.options,
            filename: merged.filename,
        })
    }

    /// Resolved numeric uid, if privileges are being dropped
    #[must_use]
    pub fn numeric_uid(&self) -> Option<u32> {
        match self.uid {
            Some(Identity::Id(id)) => Some(id),
            _ => None,
        }
    }

    /// Resolved numeric gid, if privileges are being dropped
    #[must_use]
    pub fn numeric_gid(&self) -> Option<u32> {
        match self.gid {
            Some(Identity::Id(id)) => Some(id),
            _ => None,
        }
    }

    /// Layer `overrides` into the environment, then re-apply the caller's.
    ///
    /// `HOME`, `ROOT` and `TMPDIR` stay pinned inside the build root.
    pub fn merge_env(&mut self, overrides: impl IntoIterator<Item = (String, String)>) {
        self.env.extend(overrides);
        self.reapply_overrides();
    }

    /// Forget the build identity when privileges cannot be dropped.
    ///
    /// The subprocess then runs as the operator, so the generated `USER` and
    /// `npm_config_user` would be wrong; caller-supplied values are kept.
    pub fn clear_identity(&mut self) {
        self.uid = None;
        self.gid = None;
        for key in IDENTITY_KEYS {
            self.env.remove(key);
        }
        self.reapply_overrides();
    }

    /// Record the resolved runtime version in the plan and environment
    pub fn set_version(&mut self, version: &str) {
        self.version = Some(version.to_string());
        self.env
            .insert("npm_config_node-version".to_string(), version.to_string());
        let nodedir = self
            .env
            .get("npm_config_nodedir")
            .map_or_else(PathBuf::new, PathBuf::from)
            .join(version);
        self.env.insert(
            "npm_config_nodedir".to_string(),
            nodedir.display().to_string(),
        );
        self.reapply_overrides();
    }

    fn reapply_overrides(&mut self) {
        self.env.extend(self.env_overrides.clone());
        self.env.extend(root_env(&self.directories));
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.directories.module.join(constants::MANIFEST_FILE)
    }

    #[must_use]
    pub fn stdio_log_path(&self) -> PathBuf {
        self.directories.root.join(constants::STDIO_LOG)
    }
}

const IDENTITY_KEYS: [&str; 2] = ["USER", "npm_config_user"];

/// Variables that must always resolve inside the build root
fn root_env(directories: &Directories) -> [(String, String); 3] {
    let root = directories.root.display().to_string();
    [
        ("HOME".to_string(), root.clone()),
        ("ROOT".to_string(), root),
        ("TMPDIR".to_string(), directories.tmp.display().to_string()),
    ]
}

fn generated_env(
    directories: &Directories,
    cpu: &str,
    uid: &Identity,
    version: Option<&str>,
    headers_dir: &Path,
) -> BTreeMap<String, String> {
    let root = &directories.root;
    let path = |p: &Path| p.display().to_string();

    let mut env: BTreeMap<String, String> = root_env(directories).into_iter().collect();
    env.extend([
        ("npm_config_production".to_string(), "true".to_string()),
        ("npm_config_cache".to_string(), path(&directories.npm_cache)),
        (
            "npm_config_globalconfig".to_string(),
            path(&root.join(constants::GLOBAL_RC)),
        ),
        (
            "npm_config_userconfig".to_string(),
            path(&root.join(constants::USER_RC)),
        ),
        ("npm_config_nodedir".to_string(), path(headers_dir)),
        ("npm_config_arch".to_string(), npm_arch(cpu)),
        ("USER".to_string(), uid.to_string()),
        ("npm_config_user".to_string(), uid.to_string()),
    ]);
    if let Some(version) = version {
        env.insert("npm_config_node-version".to_string(), version.to_string());
    }
    env
}
