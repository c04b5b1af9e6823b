//! Core platform abstractions and context management

use modsmith_errors::PlatformError;
use modsmith_events::{AppEvent, EventEmitter, EventSender, FailureContext, PlatformEvent};
use std::path::Path;
use std::time::Instant;

use crate::filesystem::FilesystemOperations;
use crate::identity::IdentityOperations;
use crate::process::ProcessLauncher;

/// Context for platform operations, providing event emission
#[derive(Clone, Default)]
pub struct PlatformContext {
    event_sender: Option<EventSender>,
}

impl PlatformContext {
    /// Create a new platform context with event emission capabilities
    #[must_use]
    pub fn new(event_sender: Option<EventSender>) -> Self {
        Self { event_sender }
    }

    /// Report the outcome of a filesystem operation started at `start`
    pub fn record_fs_outcome<T>(
        &self,
        operation: &str,
        path: &Path,
        start: Instant,
        result: &Result<T, PlatformError>,
    ) {
        match result {
            Ok(_) => self.emit(AppEvent::Platform(
                PlatformEvent::FilesystemOperationCompleted {
                    operation: operation.to_string(),
                    path: path.display().to_string(),
                    duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                },
            )),
            Err(e) => self.emit_failure(operation, e),
        }
    }

    /// Report a failed platform operation
    pub fn emit_failure(&self, operation: &str, error: &PlatformError) {
        self.emit(AppEvent::Platform(PlatformEvent::OperationFailed {
            operation: operation.to_string(),
            failure: FailureContext::from_error(error),
        }));
    }
}

impl EventEmitter for PlatformContext {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

/// Main platform abstraction providing access to all platform operations
pub struct Platform {
    filesystem_ops: Box<dyn FilesystemOperations>,
    identity_ops: Box<dyn IdentityOperations>,
    launcher: Box<dyn ProcessLauncher>,
}

impl Platform {
    /// Create a new platform instance with the specified implementations
    #[must_use]
    pub fn new(
        filesystem_ops: Box<dyn FilesystemOperations>,
        identity_ops: Box<dyn IdentityOperations>,
        launcher: Box<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            filesystem_ops,
            identity_ops,
            launcher,
        }
    }

    /// Host implementations, with the launch strategy chosen for this OS.
    ///
    /// `package_manager` is the executable the POSIX strategy runs; the
    /// Windows strategy always goes through the bundled runtime.
    #[must_use]
    pub fn current(package_manager: &str) -> Self {
        use crate::implementations::host::HostFilesystemOperations;

        #[cfg(unix)]
        let identity: Box<dyn IdentityOperations> =
            Box::new(crate::implementations::host::UnixIdentityOperations::new());
        #[cfg(not(unix))]
        let identity: Box<dyn IdentityOperations> = Box::new(crate::identity::NoPrivilegeDrop);

        Self::new(
            Box::new(HostFilesystemOperations::new()),
            identity,
            crate::process::launcher_for_host(package_manager),
        )
    }

    /// Access filesystem operations
    #[must_use]
    pub fn filesystem(&self) -> &dyn FilesystemOperations {
        &*self.filesystem_ops
    }

    /// Access identity operations
    #[must_use]
    pub fn identity(&self) -> &dyn IdentityOperations {
        &*self.identity_ops
    }

    /// Access the process launch strategy
    #[must_use]
    pub fn launcher(&self) -> &dyn ProcessLauncher {
        &*self.launcher
    }

    /// Create a platform context with event emission
    #[must_use]
    pub fn create_context(&self, event_sender: Option<EventSender>) -> PlatformContext {
        PlatformContext::new(event_sender)
    }
}
