//! Unix user and group lookup

use async_trait::async_trait;
use modsmith_errors::PlatformError;
use modsmith_events::{AppEvent, EventEmitter, PlatformEvent};
use nix::errno::Errno;
use nix::unistd::{Group, User};

use crate::core::PlatformContext;
use crate::identity::{Identity, IdentityOperations};

/// Resolves identities through the system user database
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixIdentityOperations;

impl UnixIdentityOperations {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn lookup_uid(user: &Identity) -> Result<u32, PlatformError> {
    match user {
        Identity::Id(id) => Ok(*id),
        Identity::Name(name) => settle(
            name,
            User::from_name(name).map(|user| user.map(|u| u.uid.as_raw())),
            |name| PlatformError::UnknownUser { name },
        ),
    }
}

fn lookup_gid(group: &Identity) -> Result<u32, PlatformError> {
    match group {
        Identity::Id(id) => Ok(*id),
        Identity::Name(name) => settle(
            name,
            Group::from_name(name).map(|group| group.map(|g| g.gid.as_raw())),
            |name| PlatformError::UnknownGroup { name },
        ),
    }
}

/// A missing entry is `unknown`; a failure to consult the user database is
/// reported as such.
fn settle(
    name: &str,
    lookup: Result<Option<u32>, Errno>,
    unknown: fn(String) -> PlatformError,
) -> Result<u32, PlatformError> {
    match lookup {
        Ok(Some(id)) => Ok(id),
        Ok(None) => Err(unknown(name.to_string())),
        Err(errno) => Err(PlatformError::IdentityLookupFailed {
            name: name.to_string(),
            message: errno.desc().to_string(),
        }),
    }
}

#[async_trait]
impl IdentityOperations for UnixIdentityOperations {
    // Only root may switch the identity of a child process.
    fn supports_privilege_drop(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    async fn resolve(
        &self,
        ctx: &PlatformContext,
        user: &Identity,
        group: &Identity,
    ) -> Result<(u32, u32), PlatformError> {
        let (u, g) = (user.clone(), group.clone());
        let result = tokio::task::spawn_blocking(move || Ok((lookup_uid(&u)?, lookup_gid(&g)?)))
            .await
            .map_err(|e| PlatformError::ProcessExecutionFailed {
                command: "identity lookup".to_string(),
                message: e.to_string(),
            })?;

        match &result {
            Ok((uid, gid)) => ctx.emit(AppEvent::Platform(PlatformEvent::IdentityResolved {
                user: user.to_string(),
                group: group.to_string(),
                uid: *uid,
                gid: *gid,
            })),
            Err(e) => ctx.emit_failure("resolve_identity", e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn numeric_identities_pass_through() {
        let ops = UnixIdentityOperations::new();
        let ctx = PlatformContext::new(None);
        let ids = ops
            .resolve(&ctx, &Identity::Id(4242), &Identity::Id(4343))
            .await
            .unwrap();
        assert_eq!(ids, (4242, 4343));
    }

    #[tokio::test]
    async fn root_resolves_to_zero() {
        let ops = UnixIdentityOperations::new();
        let ctx = PlatformContext::new(None);
        let (uid, _) = ops
            .resolve(&ctx, &Identity::parse("root"), &Identity::Id(0))
            .await
            .unwrap();
        assert_eq!(uid, 0);
    }

    #[tokio::test]
    async fn unknown_user_is_an_error() {
        let ops = UnixIdentityOperations::new();
        let ctx = PlatformContext::new(None);
        let err = ops
            .resolve(
                &ctx,
                &Identity::parse("modsmith-no-such-user"),
                &Identity::Id(0),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::UnknownUser { .. }));
    }

    #[test]
    fn database_errors_are_not_unknown_identities() {
        let unknown = |name| PlatformError::UnknownGroup { name };
        assert_eq!(settle("builder", Ok(Some(7)), unknown).unwrap(), 7);
        assert!(matches!(
            settle("builder", Ok(None), unknown).unwrap_err(),
            PlatformError::UnknownGroup { .. }
        ));
        match settle("builder", Err(Errno::EIO), unknown).unwrap_err() {
            PlatformError::IdentityLookupFailed { name, message } => {
                assert_eq!(name, "builder");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
