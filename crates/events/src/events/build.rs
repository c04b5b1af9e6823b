use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::FailureContext;

/// Pipeline stages of a single build run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Configuring,
    Scaffolding,
    Fetching,
    Preparing,
    Spawning,
    AwaitingExit,
    CheckingLogs,
    PatchingMetadata,
    Assembling,
    Done,
    Failed,
}

impl BuildStage {
    /// Stable lowercase name used in logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuring => "configuring",
            Self::Scaffolding => "scaffolding",
            Self::Fetching => "fetching",
            Self::Preparing => "preparing",
            Self::Spawning => "spawning",
            Self::AwaitingExit => "awaiting_exit",
            Self::CheckingLogs => "checking_logs",
            Self::PatchingMetadata => "patching_metadata",
            Self::Assembling => "assembling",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transitions are possible
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build-specific events for the event system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BuildEvent {
    /// Build session started
    SessionStarted {
        session_id: String,
        root: PathBuf,
        command: String,
    },

    /// Pipeline entered a new stage
    StageStarted {
        session_id: String,
        stage: BuildStage,
    },

    /// Runtime version selected for the package
    VersionResolved {
        session_id: String,
        version: String,
    },

    /// Package-manager subprocess launched.
    ///
    /// `description` is a snapshot of the resolved build description.
    SubprocessSpawned {
        session_id: String,
        program: String,
        args: Vec<String>,
        pid: Option<u32>,
        description: serde_json::Value,
    },

    /// Package-manager subprocess exited
    SubprocessExited {
        session_id: String,
        code: Option<i32>,
        duration: Duration,
    },

    /// Build completed and the archive is ready to read
    Completed {
        session_id: String,
        archive: PathBuf,
        duration: Duration,
    },

    /// Build failed
    Failed {
        session_id: String,
        stage: BuildStage,
        failure: FailureContext,
        duration: Duration,
    },
}
