//! CLI error handling

use std::fmt;
use std::path::PathBuf;

use modsmith_errors::UserFacingError;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Configuration, build or platform error
    Build(modsmith_errors::Error),
    /// Invalid command arguments
    InvalidArguments(String),
    /// Writing the packaged module failed
    Output { path: PathBuf, source: std::io::Error },
}

impl CliError {
    /// Process exit code: the package's own failures exit 2, everything else 1
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Build(e)
                if e.failure_class() == modsmith_errors::FailureClass::Package =>
            {
                2
            }
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Build(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if let modsmith_errors::Error::Build(build) = e {
                    if let Some(log) = build.log_path() {
                        write!(f, "\n  Output: {}", log.display())?;
                    }
                    if let Some(text) = build.log_text() {
                        write!(f, "\n{text}")?;
                    }
                }
                Ok(())
            }
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Output { path, source } => {
                write!(f, "failed to write {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Build(e) => Some(e),
            CliError::Output { source, .. } => Some(source),
            CliError::InvalidArguments(_) => None,
        }
    }
}

impl From<modsmith_errors::Error> for CliError {
    fn from(e: modsmith_errors::Error) -> Self {
        CliError::Build(e)
    }
}

impl From<modsmith_errors::ConfigError> for CliError {
    fn from(e: modsmith_errors::ConfigError) -> Self {
        CliError::Build(e.into())
    }
}
