//! Source checkout into the build directory
//!
//! A fetch populates `<build>/package` with the module tree. Git clones land
//! there directly; tarballs are unpacked into `<build>` and are expected to
//! carry npm's `package/` top-level directory.

use async_compression::tokio::bufread::GzipDecoder;
use async_trait::async_trait;
use futures::StreamExt;
use modsmith_config::constants;
use modsmith_errors::{BuildError, Error};
use modsmith_platform::{Platform, PlatformContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufReader};

const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// Where a package's source comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RepositorySpec {
    Git {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
    /// Gzipped tarball, by `http(s)` URL or local path
    Tar { url: String },
    Npm {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        registry: Option<String>,
    },
    /// An unpacked module directory on this host
    Local { path: PathBuf },
}

impl RepositorySpec {
    /// Short human-readable locator for logs and errors
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Git { url, branch } => match branch {
                Some(branch) => format!("git {url}#{branch}"),
                None => format!("git {url}"),
            },
            Self::Tar { url } => format!("tar {url}"),
            Self::Npm { name, version, .. } => match version {
                Some(version) => format!("npm {name}@{version}"),
                None => format!("npm {name}"),
            },
            Self::Local { path } => format!("local {}", path.display()),
        }
    }
}

/// Materializes a repository into a build directory
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// Populate `<destination>/package` from `spec`
    async fn fetch(
        &self,
        ctx: &PlatformContext,
        platform: &Platform,
        spec: &RepositorySpec,
        destination: &Path,
    ) -> Result<(), Error>;
}

/// Fetcher for git, tarball, registry and local sources
#[derive(Clone)]
pub struct CheckoutFetcher {
    client: reqwest::Client,
}

impl CheckoutFetcher {
    /// Create a fetcher with its own HTTP client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("modsmith/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BuildError::Failed {
                message: format!("http client: {e}"),
            })?;
        Ok(Self { client })
    }

    async fn tar(&self, location: &str, destination: &Path) -> Result<(), Error> {
        let archive = destination.join(".checkout.tgz");
        if location.starts_with("http://") || location.starts_with("https://") {
            self.download(location, &archive).await?;
        } else {
            fs::copy(location, &archive)
                .await
                .map_err(|e| fetch_failed(location, e))?;
        }

        let unpacked = unpack_tarball(&archive, destination).await;
        let _ = fs::remove_file(&archive).await;
        unpacked.map_err(|e| fetch_failed(location, e))?;
        normalize_top_level(destination).await
    }

    async fn npm(
        &self,
        name: &str,
        version: Option<&str>,
        registry: Option<&str>,
        destination: &Path,
    ) -> Result<(), Error> {
        let registry = registry.unwrap_or(DEFAULT_REGISTRY).trim_end_matches('/');
        let url = format!("{registry}/{}", name.replace('/', "%2f"));
        let packument: Value = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| fetch_failed(name, e))?
            .json()
            .await
            .map_err(|e| fetch_failed(name, e))?;

        let selected = select_version(&packument, version).ok_or_else(|| {
            fetch_failed(name, format!("no version matching {}", version.unwrap_or("latest")))
        })?;
        let tarball = packument
            .pointer(&format!("/versions/{}/dist/tarball", selected.replace('/', "~1")))
            .and_then(Value::as_str)
            .ok_or_else(|| fetch_failed(name, format!("{selected} has no dist.tarball")))?
            .to_string();

        tracing::debug!(package = name, version = %selected, %tarball, "resolved registry tarball");
        self.tar(&tarball, destination).await
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), Error> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| fetch_failed(url, e))?;

        let mut file = File::create(dest)
            .await
            .map_err(|e| Error::io_with_path(&e, dest))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| fetch_failed(url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io_with_path(&e, dest))?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl RepositoryFetcher for CheckoutFetcher {
    async fn fetch(
        &self,
        ctx: &PlatformContext,
        platform: &Platform,
        spec: &RepositorySpec,
        destination: &Path,
    ) -> Result<(), Error> {
        tracing::info!(source = %spec.describe(), destination = %destination.display(), "fetching repository");
        match spec {
            RepositorySpec::Git { url, branch } => {
                git_clone(url, branch.as_deref(), destination).await
            }
            RepositorySpec::Tar { url } => self.tar(url, destination).await,
            RepositorySpec::Npm {
                name,
                version,
                registry,
            } => {
                self.npm(name, version.as_deref(), registry.as_deref(), destination)
                    .await
            }
            RepositorySpec::Local { path } => platform
                .filesystem()
                .copy_tree(ctx, path, &destination.join(constants::MODULE_DIR))
                .await
                .map_err(|e| fetch_failed(&path.display().to_string(), e)),
        }
    }
}

async fn git_clone(url: &str, branch: Option<&str>, destination: &Path) -> Result<(), Error> {
    let module = destination.join(constants::MODULE_DIR);
    let mut command = tokio::process::Command::new("git");
    command.args(["clone", "--depth", "1"]);
    if let Some(branch) = branch {
        command.args(["--branch", branch]);
    }
    let output = command
        .arg(url)
        .arg(&module)
        .current_dir(destination)
        .output()
        .await
        .map_err(|e| fetch_failed(url, e))?;

    if !output.status.success() {
        return Err(fetch_failed(url, String::from_utf8_lossy(&output.stderr).trim()));
    }
    Ok(())
}

fn fetch_failed(source: &str, message: impl ToString) -> Error {
    BuildError::FetchFailed {
        source_desc: source.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn select_version(packument: &Value, requested: Option<&str>) -> Option<String> {
    let latest = || {
        packument
            .pointer("/dist-tags/latest")
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let Some(requested) = requested else {
        return latest();
    };
    if let Some(tagged) = packument
        .get("dist-tags")
        .and_then(|tags| tags.get(requested))
        .and_then(Value::as_str)
    {
        return Some(tagged.to_string());
    }

    let versions: Vec<semver::Version> = packument
        .get("versions")
        .and_then(Value::as_object)
        .map(|map| map.keys().filter_map(|v| semver::Version::parse(v).ok()).collect())
        .unwrap_or_default();
    crate::version::max_satisfying(&versions, requested).map(|v| v.to_string())
}

async fn unpack_tarball(archive: &Path, destination: &Path) -> std::io::Result<()> {
    let tar_path = destination.join(".checkout.tar");
    {
        let input = File::open(archive).await?;
        let mut decoder = GzipDecoder::new(BufReader::new(input));
        let mut output = File::create(&tar_path).await?;
        tokio::io::copy(&mut decoder, &mut output).await?;
        output.flush().await?;
    }

    let (tar_file, dest) = (tar_path.clone(), destination.to_path_buf());
    let result = tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&tar_file)?;
        let mut archive = tar::Archive::new(file);
        archive.set_preserve_permissions(true);
        archive.unpack(&dest)
    })
    .await
    .map_err(std::io::Error::other)?;

    let _ = fs::remove_file(&tar_path).await;
    result
}

/// Rename a lone differently-named top-level directory to `package`
async fn normalize_top_level(destination: &Path) -> Result<(), Error> {
    let module = destination.join(constants::MODULE_DIR);
    if fs::try_exists(&module).await.unwrap_or(false) {
        return Ok(());
    }

    let mut dirs = Vec::new();
    let mut entries = fs::read_dir(destination)
        .await
        .map_err(|e| Error::io_with_path(&e, destination))?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }

    match dirs.as_slice() {
        [only] => {
            fs::rename(only, &module)
                .await
                .map_err(|e| Error::io_with_path(&e, only))?;
            Ok(())
        }
        _ => Err(BuildError::ManifestNotFound {
            path: module.join(constants::MANIFEST_FILE).display().to_string(),
        }
        .into()),
    }
}
