//! Build orchestration
//!
//! One [`Orchestrator`] is configured once and then runs any number of
//! builds. Each build walks the stages in order:
//!
//! configuring → scaffolding → fetching → preparing → spawning →
//! awaiting exit → checking logs → patching metadata → assembling
//!
//! and produces exactly one outcome. The pipeline and the background tasks
//! that capture subprocess output all report into one [`Completion`]; the
//! first report wins and the rest are dropped.

use modsmith_config::Config;
use modsmith_errors::{BuildError, Error};
use modsmith_events::{
    AppEvent, BuildEvent, BuildStage, EventEmitter, EventSender, FailureContext,
};
use modsmith_platform::{Platform, PlatformContext};
use std::sync::Mutex;
use std::time::Instant;
use tokio::fs::File;
use tracing::Instrument;
use uuid::Uuid;

use crate::completion::Completion;
use crate::description::{BuildDescription, BuildRequest, Defaults};
use crate::fetch::{CheckoutFetcher, RepositoryFetcher};
use crate::hooks::{stages as hook_stages, HookPayload, HookRegistry};
use crate::packaging::{pack_module, BuildOutput};
use crate::runtime::detect_host_runtime;
use crate::stages;
use crate::version::VersionResolver;

/// Runs builds against fixed defaults
pub struct Orchestrator {
    defaults: Defaults,
    resolver: VersionResolver,
    platform: Platform,
    fetcher: Box<dyn RepositoryFetcher>,
    hooks: HookRegistry,
    event_sender: Option<EventSender>,
    passthrough: bool,
}

impl Orchestrator {
    /// Create an orchestrator using the candidate runtimes in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured value is invalid or the HTTP client
    /// for the default fetcher cannot be built.
    pub fn new(config: &Config, platform: Platform) -> Result<Self, Error> {
        Self::with_candidates(config, platform, &config.runtime.versions)
    }

    /// Like [`Orchestrator::new`], but probes the host runtime when
    /// `config` lists no candidate versions.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured value is invalid or the HTTP client
    /// for the default fetcher cannot be built.
    pub async fn from_config(config: &Config, platform: Platform) -> Result<Self, Error> {
        if !config.runtime.versions.is_empty() {
            return Self::new(config, platform);
        }
        let probed: Vec<String> = detect_host_runtime().await.into_iter().collect();
        if probed.is_empty() {
            tracing::warn!("no runtime versions configured and none found on PATH");
        }
        Self::with_candidates(config, platform, &probed)
    }

    fn with_candidates(
        config: &Config,
        platform: Platform,
        candidates: &[String],
    ) -> Result<Self, Error> {
        Ok(Self {
            defaults: Defaults::from_config(config)?,
            resolver: VersionResolver::new(candidates, config.runtime.default_engine.clone())?,
            platform,
            fetcher: Box::new(CheckoutFetcher::new()?),
            hooks: HookRegistry::new(),
            event_sender: None,
            passthrough: config.build.passthrough_output,
        })
    }

    /// Replace the repository fetcher
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Box<dyn RepositoryFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Report build and platform events on `sender`
    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Copy subprocess output to this process's stdout/stderr
    #[must_use]
    pub fn with_passthrough(mut self, passthrough: bool) -> Self {
        self.passthrough = passthrough;
        self
    }

    #[must_use]
    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    #[must_use]
    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    #[must_use]
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Registration must not race an in-flight build, which `&mut self`
    /// already guarantees.
    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    /// Run one build and return the packaged module.
    ///
    /// # Errors
    ///
    /// Returns the first failure of any stage, of the package manager, or of
    /// output capture.
    pub async fn build(&self, request: BuildRequest) -> Result<BuildOutput, Error> {
        let session = Session::new(self.event_sender.clone());
        let span = tracing::info_span!("build", session = %session.id);
        let started = Instant::now();

        session.emit(AppEvent::Build(BuildEvent::SessionStarted {
            session_id: session.id.clone(),
            root: request.directories.root.clone().unwrap_or_default(),
            command: request
                .command
                .unwrap_or(self.defaults.command)
                .to_string(),
        }));

        let (completion, mut receiver) = Completion::new();
        let outcome = {
            let pipeline = self
                .run(request, &session, &completion)
                .instrument(span);
            tokio::pin!(pipeline);

            let early = tokio::select! {
                delivered = &mut receiver => Some(delivered),
                result = &mut pipeline => {
                    completion.deliver(result);
                    None
                }
            };
            match early {
                Some(delivered) => delivered,
                None => receiver.await,
            }
        };
        let outcome =
            outcome.unwrap_or_else(|_| Err(Error::internal("build completion slot dropped")));

        let duration = started.elapsed();
        match &outcome {
            Ok(output) => {
                session.enter(BuildStage::Done);
                tracing::info!(
                    session = %session.id,
                    archive = %output.path().display(),
                    ?duration,
                    "build complete"
                );
                session.emit(AppEvent::Build(BuildEvent::Completed {
                    session_id: session.id.clone(),
                    archive: output.path().to_path_buf(),
                    duration,
                }));
            }
            Err(err) => {
                let stage = session.current();
                tracing::error!(session = %session.id, %stage, error = %err, "build failed");
                session.emit(AppEvent::Build(BuildEvent::Failed {
                    session_id: session.id.clone(),
                    stage,
                    failure: FailureContext::from_error(err),
                    duration,
                }));
            }
        }
        outcome
    }

    /// Run one build and hand its outcome to `callback`, exactly once
    pub async fn build_with<F>(&self, request: BuildRequest, callback: F)
    where
        F: FnOnce(Result<BuildOutput, Error>),
    {
        callback(self.build(request).await);
    }

    async fn run(
        &self,
        request: BuildRequest,
        session: &Session,
        completion: &Completion,
    ) -> Result<BuildOutput, Error> {
        session.enter(BuildStage::Configuring);
        let mut desc = BuildDescription::from_request(&request, &self.defaults)?;
        self.hooks
            .perform(hook_stages::BUILD_CONFIGURE, &mut HookPayload::new(&mut desc))?;
        let repository = desc
            .repository
            .clone()
            .ok_or(BuildError::MissingRepository)?;
        let ctx: PlatformContext = self.platform.create_context(self.event_sender.clone());

        session.enter(BuildStage::Scaffolding);
        stages::scaffold(&self.platform, &ctx, &desc.directories).await?;

        session.enter(BuildStage::Fetching);
        self.fetcher
            .fetch(&ctx, &self.platform, &repository, &desc.directories.build)
            .await?;

        session.enter(BuildStage::Preparing);
        let version = stages::prepare(&self.platform, &ctx, &self.resolver, &mut desc).await?;
        tracing::info!(%version, "runtime selected");
        session.emit(AppEvent::Build(BuildEvent::VersionResolved {
            session_id: session.id.clone(),
            version,
        }));

        session.enter(BuildStage::Spawning);
        self.hooks
            .run_before(hook_stages::NPM_CONFIGURE, &mut HookPayload::new(&mut desc))?;
        let log_path = desc.stdio_log_path();
        let log = stages::open_log(&log_path).await?;
        let mut process = stages::launch(&self.platform, &ctx, &desc).await?;
        session.emit(AppEvent::Build(BuildEvent::SubprocessSpawned {
            session_id: session.id.clone(),
            program: process.program().to_string(),
            args: process.args().to_vec(),
            pid: process.pid(),
            description: serde_json::to_value(&desc)?,
        }));

        session.enter(BuildStage::AwaitingExit);
        let spawned_at = Instant::now();
        let supervised =
            stages::supervise(&mut process, log, &log_path, self.passthrough, completion).await?;
        if supervised.detached {
            session.emit_warning(format!(
                "{} exited but a descendant kept its output open; capture was cut off",
                process.program()
            ));
        }
        session.emit(AppEvent::Build(BuildEvent::SubprocessExited {
            session_id: session.id.clone(),
            code: supervised.code,
            duration: spawned_at.elapsed(),
        }));
        stages::exit_result(process.program(), supervised.code, &log_path)?;
        self.hooks
            .run_after(hook_stages::NPM_CONFIGURE, &mut HookPayload::new(&mut desc))?;

        session.enter(BuildStage::CheckingLogs);
        stages::check_diagnostic_logs(&desc.directories.module).await?;

        session.enter(BuildStage::PatchingMetadata);
        stages::patch_manifest(&self.platform, &ctx, &self.hooks, &mut desc).await?;

        session.enter(BuildStage::Assembling);
        let mut output = pack_module(&desc.directories.module).await?;
        self.hooks.perform(
            hook_stages::BUILD_OUTPUT,
            &mut HookPayload::new(&mut desc).with_output(&mut output),
        )?;
        Ok(output)
    }
}

/// Open the captured subprocess output a failure refers to, if any
///
/// # Errors
///
/// Returns an error if the log exists in the failure but cannot be opened.
pub async fn open_failure_log(error: &Error) -> Result<Option<File>, Error> {
    let Error::Build(build) = error else {
        return Ok(None);
    };
    let Some(path) = build.log_path() else {
        return Ok(None);
    };
    File::open(path)
        .await
        .map(Some)
        .map_err(|e| Error::io_with_path(&e, path))
}

struct Session {
    id: String,
    events: Option<EventSender>,
    stage: Mutex<BuildStage>,
}

impl Session {
    fn new(events: Option<EventSender>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            events,
            stage: Mutex::new(BuildStage::Configuring),
        }
    }

    fn enter(&self, stage: BuildStage) {
        match self.stage.lock() {
            Ok(mut current) => *current = stage,
            Err(poisoned) => *poisoned.into_inner() = stage,
        }
        tracing::debug!(%stage, "entering stage");
        self.emit_stage_started(self.id.clone(), stage);
    }

    fn current(&self) -> BuildStage {
        match self.stage.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl EventEmitter for Session {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}
