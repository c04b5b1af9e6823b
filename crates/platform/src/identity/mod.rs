//! Process identity resolution for privilege drop

use async_trait::async_trait;
use modsmith_errors::PlatformError;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::PlatformContext;

/// A user or group, by name or by number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    Id(u32),
    Name(String),
}

impl Identity {
    /// Parse a configured value; all-digit strings are numeric ids
    #[must_use]
    pub fn parse(value: &str) -> Self {
        value
            .parse::<u32>()
            .map_or_else(|_| Self::Name(value.to_string()), Self::Id)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<u32> for Identity {
    fn from(value: u32) -> Self {
        Self::Id(value)
    }
}

/// Maps symbolic identities to numeric ids
#[async_trait]
pub trait IdentityOperations: Send + Sync {
    /// Whether this host can run a subprocess under another identity.
    ///
    /// When false the pipeline skips resolution and chown entirely and the
    /// package manager runs as the orchestrator's own user.
    fn supports_privilege_drop(&self) -> bool;

    /// Resolve `(uid, gid)`; an unknown name is an error
    async fn resolve(
        &self,
        ctx: &PlatformContext,
        user: &Identity,
        group: &Identity,
    ) -> Result<(u32, u32), PlatformError>;
}

/// Identity operations for hosts (or tests) that never drop privileges
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrivilegeDrop;

#[async_trait]
impl IdentityOperations for NoPrivilegeDrop {
    fn supports_privilege_drop(&self) -> bool {
        false
    }

    async fn resolve(
        &self,
        _ctx: &PlatformContext,
        _user: &Identity,
        _group: &Identity,
    ) -> Result<(u32, u32), PlatformError> {
        Err(PlatformError::CapabilityUnavailable {
            capability: "privilege drop".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_numeric_and_named() {
        assert_eq!(Identity::parse("1001"), Identity::Id(1001));
        assert_eq!(Identity::parse("nobody"), Identity::Name("nobody".into()));
        assert_eq!(Identity::parse("-1"), Identity::Name("-1".into()));
    }

    #[test]
    fn untagged_serde() {
        let id: Identity = serde_json::from_str("65534").unwrap();
        assert_eq!(id, Identity::Id(65534));
        let name: Identity = serde_json::from_str("\"nobody\"").unwrap();
        assert_eq!(name.to_string(), "nobody");
    }
}
