//! Build pipeline error types

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum BuildError {
    #[error("build failed: {message}")]
    Failed { message: String },

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("no repository specified for build")]
    MissingRepository,

    #[error("fetch failed for {source_desc}: {message}")]
    FetchFailed { source_desc: String, message: String },

    #[error("manifest not found: {path}")]
    ManifestNotFound { path: String },

    #[error("invalid manifest: {message}")]
    ManifestInvalid { message: String },

    #[error("no matching versions found for {constraint}")]
    NoMatchingVersion { constraint: String },

    #[error("{program} exited with code {code}")]
    ExitedWithCode {
        program: String,
        code: i32,
        log: Option<PathBuf>,
    },

    #[error("{program} terminated by signal")]
    Terminated { program: String },

    #[error("error output from {}", .files.join(", "))]
    SilentFailure { files: Vec<String>, log: String },

    #[error("archive failed: {message}")]
    ArchiveFailed { message: String },

    #[error("hook {stage} failed: {message}")]
    HookFailed { stage: String, message: String },
}

impl BuildError {
    /// Whether the package's own build (not the orchestrator) failed.
    #[must_use]
    pub fn is_package_failure(&self) -> bool {
        matches!(
            self,
            Self::ExitedWithCode { .. } | Self::Terminated { .. } | Self::SilentFailure { .. }
        )
    }

    /// Path to the captured subprocess output, if this failure has one.
    #[must_use]
    pub fn log_path(&self) -> Option<&Path> {
        match self {
            Self::ExitedWithCode { log, .. } => log.as_deref(),
            _ => None,
        }
    }

    /// Captured diagnostic text, if this failure carries any inline.
    #[must_use]
    pub fn log_text(&self) -> Option<&str> {
        match self {
            Self::SilentFailure { log, .. } => Some(log),
            _ => None,
        }
    }
}

impl UserFacingError for BuildError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingField { .. } | Self::MissingRepository => {
                Some("Complete the build description before retrying.")
            }
            Self::FetchFailed { .. } => {
                Some("Check network access or the repository locator, then retry.")
            }
            Self::NoMatchingVersion { .. } => {
                Some("Add a runtime version satisfying the package's engines constraint.")
            }
            Self::ExitedWithCode { .. } | Self::SilentFailure { .. } => {
                Some("Inspect the captured package-manager output for the failing step.")
            }
            Self::ManifestNotFound { .. } | Self::ManifestInvalid { .. } => {
                Some("Ensure the repository contains a valid package.json at its root.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Failed { .. } => "build.failed",
            Self::MissingField { .. } => "build.missing_field",
            Self::MissingRepository => "build.missing_repository",
            Self::FetchFailed { .. } => "build.fetch_failed",
            Self::ManifestNotFound { .. } => "build.manifest_not_found",
            Self::ManifestInvalid { .. } => "build.manifest_invalid",
            Self::NoMatchingVersion { .. } => "build.no_matching_version",
            Self::ExitedWithCode { .. } => "build.exit_code",
            Self::Terminated { .. } => "build.terminated",
            Self::SilentFailure { .. } => "build.silent_failure",
            Self::ArchiveFailed { .. } => "build.archive_failed",
            Self::HookFailed { .. } => "build.hook_failed",
        };
        Some(code)
    }
}
