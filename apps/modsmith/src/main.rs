//! modsmith - sandboxed npm module builder
//!
//! Loads configuration, runs one build through the orchestrator while
//! logging its events, and writes the packaged module to disk.

mod cli;
mod error;
mod logging;

use crate::cli::{BuildArgs, Cli, Commands};
use crate::error::CliError;
use crate::logging::log_event_with_tracing;
use clap::Parser;
use modsmith_builder::{BuildOutput, BuildRequest, Orchestrator, VersionResolver};
use modsmith_config::Config;
use modsmith_events::EventReceiver;
use modsmith_platform::{Identity, Platform};
use std::path::Path;
use std::process;
use tokio::select;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.debug, cli.global.json_logs);

    if let Err(e) = run(cli).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    info!("Starting modsmith v{}", env!("CARGO_PKG_VERSION"));

    // File (or defaults), then environment; CLI flags are applied per build
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;

    match cli.command {
        Commands::Build(args) => build(config, args).await,
        Commands::Resolve { manifest } => resolve(&config, &manifest).await,
    }
}

async fn build(config: Config, args: BuildArgs) -> Result<(), CliError> {
    let repository = args
        .repository()
        .ok_or_else(|| CliError::InvalidArguments("no source given".to_string()))?;

    let (event_sender, event_receiver) = modsmith_events::channel();
    let platform = Platform::current(&config.build.package_manager);
    let orchestrator = Orchestrator::from_config(&config, platform)
        .await?
        .with_event_sender(event_sender);

    let mut request = BuildRequest::new(&args.root).with_repository(repository);
    request.command = args.command;
    request.version = args.runtime_version;
    request.uid = args.user.as_deref().map(Identity::parse);
    request.gid = args.group.as_deref().map(Identity::parse);
    request.os = args.os;
    request.cpu = args.cpu;
    request.env = args.env.into_iter().collect();
    request.options = args.options;

    let output = execute_with_events(&orchestrator, request, event_receiver).await?;
    let written = write_output(output, &args.output).await?;
    info!(path = %args.output.display(), bytes = written, "Module written");
    println!("{}", args.output.display());
    Ok(())
}

/// Run a build while draining its events into the log
async fn execute_with_events(
    orchestrator: &Orchestrator,
    request: BuildRequest,
    mut event_receiver: EventReceiver,
) -> Result<BuildOutput, CliError> {
    let mut build_future = Box::pin(orchestrator.build(request));

    loop {
        select! {
            result = &mut build_future => {
                while let Ok(event) = event_receiver.try_recv() {
                    log_event_with_tracing(&event);
                }
                return result.map_err(CliError::from);
            }

            event = event_receiver.recv() => {
                if let Some(event) = event {
                    log_event_with_tracing(&event);
                }
            }
        }
    }
}

async fn write_output(mut output: BuildOutput, path: &Path) -> Result<u64, CliError> {
    let to_cli_error = |source| CliError::Output {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(path).await.map_err(to_cli_error)?;
    let written = tokio::io::copy(&mut output, &mut file)
        .await
        .map_err(to_cli_error)?;
    tokio::io::AsyncWriteExt::flush(&mut file)
        .await
        .map_err(to_cli_error)?;
    Ok(written)
}

async fn resolve(config: &Config, manifest: &Path) -> Result<(), CliError> {
    let mut candidates = config.runtime.versions.clone();
    if candidates.is_empty() {
        candidates.extend(modsmith_builder::detect_host_runtime().await);
    }
    let resolver = VersionResolver::new(&candidates, config.runtime.default_engine.clone())?;

    let bytes = tokio::fs::read(manifest)
        .await
        .map_err(|e| modsmith_errors::Error::io_with_path(&e, manifest))?;
    let manifest: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(modsmith_errors::Error::from)?;

    let constraint = resolver.constraint_for(&manifest);
    match resolver.resolve_for_manifest(&manifest) {
        Some(version) => {
            println!("{version}");
            Ok(())
        }
        None => Err(modsmith_errors::Error::from(
            modsmith_errors::BuildError::NoMatchingVersion { constraint },
        )
        .into()),
    }
}

fn init_tracing(debug: bool, json: bool) {
    let default_filter = if debug {
        "info,modsmith=debug,modsmith_builder=debug,modsmith_platform=debug"
    } else {
        "warn,modsmith=info,modsmith_builder=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
