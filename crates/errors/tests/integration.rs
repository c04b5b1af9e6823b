//! Integration tests for error types

#[cfg(test)]
mod tests {
    use modsmith_errors::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_conversion() {
        let build_err = BuildError::NoMatchingVersion {
            constraint: ">=99.0.0".into(),
        };
        let err: Error = build_err.into();
        assert!(matches!(err, Error::Build(_)));
        assert!(err.to_string().contains("no matching versions found"));
    }

    #[test]
    fn test_exit_code_is_package_failure() {
        let err: Error = BuildError::ExitedWithCode {
            program: "npm".into(),
            code: 1,
            log: Some(PathBuf::from("/tmp/b1/stdio.log")),
        }
        .into();
        assert_eq!(err.failure_class(), FailureClass::Package);
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "build error: npm exited with code 1");
    }

    #[test]
    fn test_silent_failure_is_client_class() {
        let err: Error = BuildError::SilentFailure {
            files: vec!["builderror.log".into(), "npm-debug.log".into()],
            log: "gyp ERR!".into(),
        }
        .into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.failure_class(), FailureClass::Package);
        assert!(err
            .to_string()
            .contains("error output from builderror.log, npm-debug.log"));
    }

    #[test]
    fn test_io_error_is_orchestrator_failure() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err: Error = io_err.into();
        assert_eq!(err.failure_class(), FailureClass::Orchestrator);
        assert_eq!(err.user_code(), Some("error.io"));
    }

    #[test]
    fn test_platform_error_maps_to_build_error() {
        let err: BuildError = PlatformError::ProcessExecutionFailed {
            command: "git clone".into(),
            message: "exit 128".into(),
        }
        .into();
        assert!(matches!(err, BuildError::FetchFailed { .. }));
    }

    #[test]
    fn test_error_clone() {
        let err = BuildError::HookFailed {
            stage: "npm.package".into(),
            message: "rejected".into(),
        };
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
