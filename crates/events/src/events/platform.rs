//! Platform-specific operation events

use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Platform operation events for filesystem, identity and process operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// Filesystem operation completed (`ensure_dir`, `remove_tree`, `chown_tree`)
    FilesystemOperationCompleted {
        /// Operation name that completed
        operation: String,
        /// Path the operation targeted
        path: String,
        /// Duration of the operation in milliseconds
        duration_ms: u64,
    },

    /// Identity lookup finished
    IdentityResolved {
        /// Symbolic or numeric user as requested
        user: String,
        /// Symbolic or numeric group as requested
        group: String,
        uid: u32,
        gid: u32,
    },

    /// Process launched
    ProcessLaunched {
        /// Program being executed
        program: String,
        /// Command arguments
        args: Vec<String>,
        /// Working directory
        working_dir: String,
        /// Launch strategy (`posix` or `windows`)
        strategy: String,
    },

    /// Platform operation failed
    OperationFailed {
        /// Operation name that failed
        operation: String,
        failure: FailureContext,
    },
}
