use modsmith_errors::{BuildError, Error};
use modsmith_platform::{Identity, Platform, PlatformContext};
use serde_json::Value;

use super::read_manifest;
use crate::description::BuildDescription;
use crate::version::{parse_version, VersionResolver};

const FALLBACK_GROUP: &str = "nobody";

/// Resolve the runtime, fold in manifest `env`, and hand the tree to the
/// build identity. Returns the resolved version.
pub(crate) async fn prepare(
    platform: &Platform,
    ctx: &PlatformContext,
    resolver: &VersionResolver,
    desc: &mut BuildDescription,
) -> Result<String, Error> {
    let manifest = read_manifest(&desc.manifest_path()).await?;

    let version = match desc.version.as_deref().and_then(parse_version) {
        Some(explicit) => explicit,
        None => resolver.resolve_for_manifest(&manifest).ok_or_else(|| {
            BuildError::NoMatchingVersion {
                constraint: resolver.constraint_for(&manifest),
            }
        })?,
    };
    let version = version.to_string();
    desc.set_version(&version);

    if let Some(Value::Object(env)) = manifest.get("env") {
        desc.merge_env(env.iter().filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => return None,
                other => other.to_string(),
            };
            Some((key.clone(), value))
        }));
    }

    let identity = platform.identity();
    if identity.supports_privilege_drop() {
        let user = desc
            .uid
            .clone()
            .unwrap_or_else(|| Identity::Name(FALLBACK_GROUP.to_string()));
        let group = desc
            .gid
            .clone()
            .unwrap_or_else(|| Identity::Name(FALLBACK_GROUP.to_string()));
        let (uid, gid) = identity.resolve(ctx, &user, &group).await?;
        desc.uid = Some(Identity::Id(uid));
        desc.gid = Some(Identity::Id(gid));
        platform
            .filesystem()
            .chown_tree(ctx, &desc.directories.root, uid, gid)
            .await?;
    } else {
        tracing::debug!("privilege drop unavailable, running as current user");
        desc.clear_identity();
    }

    Ok(version)
}
