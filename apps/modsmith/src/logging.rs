//! Structured logging of domain events
//!
//! Every event received from the pipeline becomes one tracing record with
//! its fields attached.

use modsmith_events::{AppEvent, BuildEvent, GeneralEvent, PlatformEvent};
use tracing::{debug, error, info, warn};

/// Log an `AppEvent` at its level with structured fields
pub fn log_event_with_tracing(event: &AppEvent) {
    match event {
        AppEvent::Build(build) => log_build_event(build),
        AppEvent::Platform(platform) => log_platform_event(platform),
        AppEvent::General(general) => log_general_event(general),
    }
}

fn log_build_event(event: &BuildEvent) {
    match event {
        BuildEvent::SessionStarted {
            session_id,
            root,
            command,
        } => info!(
            session = %session_id,
            root = %root.display(),
            command = %command,
            "Build started"
        ),
        BuildEvent::StageStarted { session_id, stage } => {
            debug!(session = %session_id, stage = %stage, "Stage started");
        }
        BuildEvent::VersionResolved {
            session_id,
            version,
        } => info!(session = %session_id, version = %version, "Runtime resolved"),
        BuildEvent::SubprocessSpawned {
            session_id,
            program,
            args,
            pid,
            description,
        } => {
            info!(
                session = %session_id,
                program = %program,
                args = ?args,
                pid = ?pid,
                "Package manager started"
            );
            debug!(session = %session_id, description = %description, "Build description");
        }
        BuildEvent::SubprocessExited {
            session_id,
            code,
            duration,
        } => info!(
            session = %session_id,
            code = ?code,
            duration_ms = duration.as_millis(),
            "Package manager exited"
        ),
        BuildEvent::Completed {
            session_id,
            archive,
            duration,
        } => info!(
            session = %session_id,
            archive = %archive.display(),
            duration_ms = duration.as_millis(),
            "Build completed"
        ),
        BuildEvent::Failed {
            session_id,
            stage,
            failure,
            duration,
        } => error!(
            session = %session_id,
            stage = %stage,
            code = ?failure.code,
            retryable = failure.retryable,
            duration_ms = duration.as_millis(),
            "Build failed: {}",
            failure.message
        ),
    }
}

fn log_platform_event(event: &PlatformEvent) {
    match event {
        PlatformEvent::FilesystemOperationCompleted {
            operation,
            path,
            duration_ms,
        } => debug!(
            operation = %operation,
            path = %path,
            duration_ms = duration_ms,
            "Filesystem operation completed"
        ),
        PlatformEvent::IdentityResolved {
            user,
            group,
            uid,
            gid,
        } => info!(
            user = %user,
            group = %group,
            uid = uid,
            gid = gid,
            "Build identity resolved"
        ),
        PlatformEvent::ProcessLaunched {
            program,
            args,
            working_dir,
            strategy,
        } => debug!(
            program = %program,
            args = ?args,
            working_dir = %working_dir,
            strategy = %strategy,
            "Process launched"
        ),
        PlatformEvent::OperationFailed { operation, failure } => error!(
            operation = %operation,
            code = ?failure.code,
            "Platform operation failed: {}",
            failure.message
        ),
    }
}

fn log_general_event(event: &GeneralEvent) {
    match event {
        GeneralEvent::Warning { message, context } => {
            warn!(context = ?context, "{message}");
        }
    }
}
