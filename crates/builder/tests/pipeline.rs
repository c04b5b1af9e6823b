//! End-to-end builds against a scripted package manager

#![cfg(unix)]

use async_compression::tokio::bufread::GzipDecoder;
use modsmith_builder::*;
use modsmith_config::Config;
use modsmith_errors::{BuildError, Error};
use modsmith_events::{AppEvent, BuildEvent, BuildStage, GeneralEvent};
use modsmith_platform::{HostFilesystemOperations, NoPrivilegeDrop, Platform, PosixLauncher};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, BufReader};

/// Stands in for npm. Leaves a `spawned` marker, echoes what it saw, and
/// installs two fake dependencies on `install`.
const FAKE_NPM: &str = r#"#!/bin/sh
touch spawned
echo "fake npm $*"
echo "fake npm warning" >&2
printf '%s' "$HOME" > home-seen
printf '%s' "$CUSTOM" > custom-seen
printf '%s' "$TMPDIR" > tmpdir-seen
case "$FAKE_NPM_MODE" in
  fail) exit 1 ;;
  silent) echo "npm ERR! missing script" > npm-debug.log ;;
  hostile)
    ln -s "$VICTIM" "$TMPDIR/module.tar"
    ln -s "$VICTIM" "$TMPDIR/module.tgz"
    rm -f "$ROOT/stdio.log"
    ln -s "$VICTIM" "$ROOT/stdio.log"
    ;;
  linger) sleep 30 & ;;
esac
if [ "$1" = "build" ]; then
  if [ -e node_modules ]; then touch stale-deps-seen; fi
  exit 0
fi
mkdir -p node_modules/.bin node_modules/left-pad node_modules/nan
exit 0
"#;

/// Written once, before any test spawns, so no test execs a script another
/// thread still holds open for writing.
fn fake_npm() -> &'static Path {
    static SCRIPT: OnceLock<PathBuf> = OnceLock::new();
    SCRIPT.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("modsmith-fake-npm-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let script = dir.join("npm");
        std::fs::write(&script, FAKE_NPM).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    })
}

struct Fixture {
    _tmp: TempDir,
    source: PathBuf,
    root: PathBuf,
}

impl Fixture {
    fn new(manifest: &Value) -> Self {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(
            source.join("package.json"),
            serde_json::to_string_pretty(manifest).unwrap(),
        )
        .unwrap();
        std::fs::write(source.join("index.js"), "module.exports = 42;\n").unwrap();
        let root = tmp.path().join("root");
        Self {
            _tmp: tmp,
            source,
            root,
        }
    }

    fn module(&self) -> PathBuf {
        self.root.join("build").join("package")
    }

    fn request(&self) -> BuildRequest {
        BuildRequest::new(&self.root).with_repository(RepositorySpec::Local {
            path: self.source.clone(),
        })
    }
}

fn orchestrator() -> Orchestrator {
    let mut config = Config::default();
    config.runtime.versions = vec!["4.9.1".to_string(), "5.0.0".to_string()];
    config.runtime.default_engine = "5.0.0".to_string();
    config.build.passthrough_output = false;
    config.build.os = Some("linux".to_string());

    let platform = Platform::new(
        Box::new(HostFilesystemOperations::new()),
        Box::new(NoPrivilegeDrop),
        Box::new(PosixLauncher::new(fake_npm())),
    );
    Orchestrator::new(&config, platform).unwrap()
}

/// Unpack a gzipped tarball into `path → contents`
async fn unpack(mut output: BuildOutput) -> BTreeMap<String, String> {
    let mut gz = Vec::new();
    output.read_to_end(&mut gz).await.unwrap();
    let mut tar_bytes = Vec::new();
    GzipDecoder::new(BufReader::new(&gz[..]))
        .read_to_end(&mut tar_bytes)
        .await
        .unwrap();

    let mut archive = tar::Archive::new(&tar_bytes[..]);
    let mut files = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = entry.path().unwrap().display().to_string();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        files.insert(path, contents);
    }
    files
}

#[tokio::test]
async fn install_records_platform_and_bundled_dependencies() {
    let fixture = Fixture::new(&json!({"name": "demo", "version": "1.0.0"}));
    let output = orchestrator().build(fixture.request()).await.unwrap();
    let files = unpack(output).await;

    let manifest: Value = serde_json::from_str(&files["package/package.json"]).unwrap();
    assert_eq!(manifest["os"], json!("linux"));
    assert_eq!(manifest["bundledDependencies"], json!(["left-pad", "nan"]));
    assert!(files["package/package.json"].ends_with("}\n"));
    assert!(files.contains_key("package/index.js"));
    assert!(files.contains_key("package/node_modules/left-pad/"));

    assert_eq!(files["package/home-seen"], fixture.root.display().to_string());
    let log = std::fs::read_to_string(fixture.root.join("stdio.log")).unwrap();
    assert!(log.contains("fake npm install"));
    assert!(log.contains("fake npm warning"));
}

#[tokio::test]
async fn unsatisfiable_engine_fails_before_spawn() {
    let fixture = Fixture::new(&json!({
        "name": "demo",
        "engines": {"node": ">=99.0.0"}
    }));
    let err = orchestrator().build(fixture.request()).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Build(BuildError::NoMatchingVersion { .. })
    ));
    assert!(err.to_string().contains("no matching versions found"));
    assert!(!fixture.module().join("spawned").exists());
}

#[tokio::test]
async fn non_zero_exit_fails_without_packaging() {
    let fixture = Fixture::new(&json!({"name": "demo"}));
    let mut request = fixture.request();
    request.env.insert("FAKE_NPM_MODE".into(), "fail".into());

    let err = orchestrator().build(request).await.unwrap_err();
    assert_eq!(err.exit_code(), Some(1));

    let mut log = String::new();
    open_failure_log(&err)
        .await
        .unwrap()
        .expect("exit failures carry the captured log")
        .read_to_string(&mut log)
        .await
        .unwrap();
    assert!(log.contains("fake npm install"));

    let manifest: Value =
        serde_json::from_slice(&std::fs::read(fixture.module().join("package.json")).unwrap())
            .unwrap();
    assert!(manifest.get("os").is_none());
}

#[tokio::test]
async fn diagnostic_log_after_clean_exit_fails() {
    let fixture = Fixture::new(&json!({"name": "demo"}));
    let mut request = fixture.request();
    request.env.insert("FAKE_NPM_MODE".into(), "silent".into());

    let err = orchestrator().build(request).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    match err {
        Error::Build(BuildError::SilentFailure { files, log }) => {
            assert_eq!(files, vec!["npm-debug.log"]);
            assert!(log.contains("npm ERR! missing script"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn build_command_purges_dependencies_first() {
    let fixture = Fixture::new(&json!({"name": "native"}));
    std::fs::create_dir_all(fixture.source.join("node_modules").join("stale")).unwrap();

    let output = orchestrator()
        .build(fixture.request().with_command(BuildCommand::Build))
        .await
        .unwrap();
    let files = unpack(output).await;

    assert!(!files.contains_key("package/stale-deps-seen"));
    assert!(!files.keys().any(|path| path.contains("node_modules")));
    let manifest: Value = serde_json::from_str(&files["package/package.json"]).unwrap();
    assert!(manifest.get("bundledDependencies").is_none());
}

#[tokio::test]
async fn caller_env_beats_manifest_env() {
    let fixture = Fixture::new(&json!({"name": "demo", "env": {"CUSTOM": "from-manifest"}}));
    let output = orchestrator().build(fixture.request()).await.unwrap();
    assert_eq!(unpack(output).await["package/custom-seen"], "from-manifest");

    let fixture = Fixture::new(&json!({"name": "demo", "env": {"CUSTOM": "from-manifest"}}));
    let mut request = fixture.request();
    request.env.insert("CUSTOM".into(), "from-caller".into());
    let output = orchestrator().build(request).await.unwrap();
    assert_eq!(unpack(output).await["package/custom-seen"], "from-caller");
}

#[tokio::test]
async fn package_hook_rewrites_written_manifest() {
    let fixture = Fixture::new(&json!({"name": "demo"}));
    let mut orchestrator = orchestrator();
    orchestrator
        .hooks_mut()
        .before(hooks::stages::NPM_PACKAGE, |payload| {
            if let Some(manifest) = payload.manifest.as_deref_mut() {
                manifest["builtBy"] = json!("modsmith");
            }
            Ok(())
        });

    let output = orchestrator.build(fixture.request()).await.unwrap();
    let files = unpack(output).await;
    let manifest: Value = serde_json::from_str(&files["package/package.json"]).unwrap();
    assert_eq!(manifest["builtBy"], json!("modsmith"));
}

#[tokio::test]
async fn missing_repository_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let err = orchestrator()
        .build(BuildRequest::new(tmp.path().join("root")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Build(BuildError::MissingRepository)));
}

#[tokio::test]
async fn failed_build_reports_one_outcome() {
    let fixture = Fixture::new(&json!({"name": "demo"}));
    let mut request = fixture.request();
    request.env.insert("FAKE_NPM_MODE".into(), "fail".into());

    let (tx, mut rx) = modsmith_events::channel();
    let orchestrator = orchestrator().with_event_sender(tx);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    orchestrator
        .build_with(request, move |outcome| {
            assert_eq!(outcome.unwrap_err().exit_code(), Some(1));
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;
    drop(orchestrator);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let mut outcomes = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            AppEvent::Build(BuildEvent::Failed { stage, .. }) => outcomes.push(Some(stage)),
            AppEvent::Build(BuildEvent::Completed { .. }) => outcomes.push(None),
            _ => {}
        }
    }
    assert_eq!(outcomes, vec![Some(BuildStage::AwaitingExit)]);
}

#[tokio::test]
async fn manifest_env_cannot_move_home_out_of_root() {
    let fixture = Fixture::new(&json!({
        "name": "demo",
        "env": {"HOME": "/etc", "ROOT": "/", "TMPDIR": "/", "CUSTOM": "kept"}
    }));
    let output = orchestrator().build(fixture.request()).await.unwrap();
    let files = unpack(output).await;

    assert_eq!(files["package/home-seen"], fixture.root.display().to_string());
    assert_eq!(
        files["package/tmpdir-seen"],
        fixture.root.join("tmp").display().to_string()
    );
    assert_eq!(files["package/custom-seen"], "kept");
}

#[tokio::test]
async fn planted_symlinks_are_never_written_through() {
    let fixture = Fixture::new(&json!({"name": "demo"}));
    let victim = fixture.root.with_file_name("victim");
    std::fs::write(&victim, "original").unwrap();

    let mut request = fixture.request();
    request.env.insert("FAKE_NPM_MODE".into(), "hostile".into());
    request
        .env
        .insert("VICTIM".into(), victim.display().to_string());

    let output = orchestrator().build(request).await.unwrap();
    assert!(!output.path().starts_with(&fixture.root));
    let files = unpack(output).await;
    assert!(files.contains_key("package/package.json"));
    assert_eq!(std::fs::read_to_string(&victim).unwrap(), "original");
}

#[tokio::test]
async fn lingering_descendant_does_not_hang_the_build() {
    let fixture = Fixture::new(&json!({"name": "demo"}));
    let mut request = fixture.request();
    request.env.insert("FAKE_NPM_MODE".into(), "linger".into());

    let (tx, mut rx) = modsmith_events::channel();
    let orchestrator = orchestrator().with_event_sender(tx);
    let output = tokio::time::timeout(Duration::from_secs(20), orchestrator.build(request))
        .await
        .expect("build finishes while the descendant still runs")
        .unwrap();
    drop(orchestrator);
    assert!(unpack(output).await.contains_key("package/spawned"));

    let mut warned = false;
    while let Some(event) = rx.recv().await {
        if let AppEvent::General(GeneralEvent::Warning { message, .. }) = event {
            warned |= message.contains("capture was cut off");
        }
    }
    assert!(warned);
}

#[tokio::test]
async fn events_trace_the_session() {
    let fixture = Fixture::new(&json!({"name": "demo"}));
    let (tx, mut rx) = modsmith_events::channel();
    let orchestrator = orchestrator().with_event_sender(tx);
    orchestrator.build(fixture.request()).await.unwrap();
    drop(orchestrator);

    let mut spawned = None;
    let mut completed = false;
    while let Some(event) = rx.recv().await {
        match event {
            AppEvent::Build(BuildEvent::SubprocessSpawned { description, .. }) => {
                spawned = Some(description);
            }
            AppEvent::Build(BuildEvent::Completed { .. }) => completed = true,
            _ => {}
        }
    }

    let description = spawned.expect("spawn is reported");
    assert_eq!(description["version"], json!("5.0.0"));
    assert_eq!(description["command"], json!("install"));
    assert!(completed);
}
