use modsmith_config::constants::{BIN_DIR, MANIFEST_FILE, NODE_MODULES};
use modsmith_errors::{BuildError, Error};
use modsmith_platform::{Platform, PlatformContext};
use serde_json::Value;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::read_manifest;
use crate::description::{BuildCommand, BuildDescription};
use crate::hooks::{stages, HookPayload, HookRegistry};
use crate::packaging::create_fresh;

/// Record the target platform and installed dependencies in the manifest,
/// let `npm.package` filters rewrite it, and write it back.
pub(crate) async fn patch_manifest(
    platform: &Platform,
    ctx: &PlatformContext,
    hooks: &HookRegistry,
    desc: &mut BuildDescription,
) -> Result<(), Error> {
    let manifest_path = desc.manifest_path();
    let deps_dir = desc.directories.module.join(NODE_MODULES);

    let (mut manifest, installed) = tokio::try_join!(read_manifest(&manifest_path), async {
        platform
            .filesystem()
            .list_dir(ctx, &deps_dir)
            .await
            .map_err(Error::from)
    })?;

    let fields = manifest
        .as_object_mut()
        .ok_or_else(|| BuildError::ManifestInvalid {
            message: "manifest is not a JSON object".to_string(),
        })?;
    fields.insert("os".to_string(), Value::String(desc.os.clone()));
    if desc.command == BuildCommand::Install {
        let bundled = installed
            .into_iter()
            .filter(|name| name != BIN_DIR)
            .map(Value::String)
            .collect();
        fields.insert("bundledDependencies".to_string(), Value::Array(bundled));
    }

    hooks.run_before(
        stages::NPM_PACKAGE,
        &mut HookPayload::new(desc).with_manifest(&mut manifest),
    )?;

    let mut rendered = serde_json::to_string_pretty(&manifest)?;
    rendered.push('\n');
    replace_file(&manifest_path, rendered.as_bytes()).await?;

    hooks.run_after(
        stages::NPM_PACKAGE,
        &mut HookPayload::new(desc).with_manifest(&mut manifest),
    )?;
    Ok(())
}

/// Write `contents` beside `path` and rename it into place. Whatever was at
/// `path`, a symlink included, is replaced rather than written through.
async fn replace_file(path: &Path, contents: &[u8]) -> Result<(), Error> {
    let staged = path.with_file_name(format!(".{MANIFEST_FILE}.{}", Uuid::new_v4()));
    let written = async {
        let mut file = create_fresh(&staged).await?;
        file.write_all(contents)
            .await
            .map_err(|e| Error::io_with_path(&e, &staged))?;
        file.flush()
            .await
            .map_err(|e| Error::io_with_path(&e, &staged))?;
        tokio::fs::rename(&staged, path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))
    }
    .await;
    if written.is_err() {
        let _ = tokio::fs::remove_file(&staged).await;
    }
    written
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replacing_a_symlinked_manifest_leaves_its_target_alone() {
        let temp = tempfile::tempdir().unwrap();
        let victim = temp.path().join("victim");
        std::fs::write(&victim, "original").unwrap();
        let manifest = temp.path().join(MANIFEST_FILE);
        std::os::unix::fs::symlink(&victim, &manifest).unwrap();

        replace_file(&manifest, b"{}\n").await.unwrap();

        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "original");
        assert!(!std::fs::symlink_metadata(&manifest).unwrap().is_symlink());
        assert_eq!(std::fs::read_to_string(&manifest).unwrap(), "{}\n");
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 2);
    }
}
