//! Platform-specific operation errors

use std::borrow::Cow;

use crate::{BuildError, UserFacingError};
use thiserror::Error;

/// Errors that can occur during platform-specific operations
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum PlatformError {
    #[error("filesystem operation failed: {operation} on {path} - {message}")]
    FilesystemOperationFailed {
        operation: String,
        path: String,
        message: String,
    },

    #[error("process execution failed: {command} - {message}")]
    ProcessExecutionFailed { command: String, message: String },

    #[error("command not found: {command}")]
    CommandNotFound { command: String },

    #[error("unknown user: {name}")]
    UnknownUser { name: String },

    #[error("unknown group: {name}")]
    UnknownGroup { name: String },

    #[error("identity lookup failed for {name}: {message}")]
    IdentityLookupFailed { name: String, message: String },

    #[error("platform capability not available: {capability}")]
    CapabilityUnavailable { capability: String },

    #[error("permission denied: {operation} - {message}")]
    PermissionDenied { operation: String, message: String },
}

impl UserFacingError for PlatformError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownUser { .. } | Self::UnknownGroup { .. } => {
                Some("Create the account on the build host or configure a different identity.")
            }
            Self::CommandNotFound { .. } => {
                Some("Install the package manager or set build.package_manager in the config.")
            }
            Self::PermissionDenied { .. } => {
                Some("Run the orchestrator with enough privilege to change file ownership.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::FilesystemOperationFailed { .. } => "platform.filesystem_operation_failed",
            Self::ProcessExecutionFailed { .. } => "platform.process_execution_failed",
            Self::CommandNotFound { .. } => "platform.command_not_found",
            Self::UnknownUser { .. } => "platform.unknown_user",
            Self::UnknownGroup { .. } => "platform.unknown_group",
            Self::IdentityLookupFailed { .. } => "platform.identity_lookup_failed",
            Self::CapabilityUnavailable { .. } => "platform.capability_unavailable",
            Self::PermissionDenied { .. } => "platform.permission_denied",
        };
        Some(code)
    }
}

impl From<PlatformError> for BuildError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::ProcessExecutionFailed { command, message }
                if command.contains("git") =>
            {
                BuildError::FetchFailed {
                    source_desc: command,
                    message,
                }
            }
            PlatformError::FilesystemOperationFailed { message, .. } => BuildError::Failed {
                message: format!("filesystem operation failed: {message}"),
            },
            _ => BuildError::Failed {
                message: err.to_string(),
            },
        }
    }
}
