//! Command line interface definition

use clap::{Args, Parser, Subcommand};
use modsmith_builder::{BuildCommand, RepositorySpec};
use std::path::PathBuf;

/// modsmith - build npm modules in a sandboxed root
#[derive(Parser)]
#[command(name = "modsmith")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build npm modules in a sandboxed root and package the result")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch, build and package a module
    #[command(alias = "b")]
    Build(BuildArgs),

    /// Show which runtime a manifest would build against
    Resolve {
        /// Path to a package.json
        manifest: PathBuf,
    },
}

#[derive(Args)]
pub struct BuildArgs {
    /// Build root; everything the build writes lands under it
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Package-manager subcommand
    #[arg(long, value_name = "COMMAND")]
    pub command: Option<BuildCommand>,

    /// Git branch to clone
    #[arg(long, requires = "git")]
    pub branch: Option<String>,

    /// Registry package version
    #[arg(long = "package-version", requires = "npm")]
    pub package_version: Option<String>,

    /// Registry base URL
    #[arg(long, requires = "npm")]
    pub registry: Option<String>,

    /// Runtime version, skipping engines resolution
    #[arg(long = "runtime-version")]
    pub runtime_version: Option<String>,

    /// User the package manager runs as
    #[arg(long)]
    pub user: Option<String>,

    /// Group the package manager runs as
    #[arg(long)]
    pub group: Option<String>,

    /// Target platform tag
    #[arg(long)]
    pub os: Option<String>,

    /// Target architecture tag
    #[arg(long)]
    pub cpu: Option<String>,

    /// Extra environment, KEY=VALUE
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Where to write the packaged module
    #[arg(short, long, value_name = "FILE", default_value = "module.tgz")]
    pub output: PathBuf,

    /// Arguments passed through to the package manager
    #[arg(last = true)]
    pub options: Vec<String>,
}

/// Where the module's source comes from; exactly one is required
#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// Git repository URL
    #[arg(long)]
    pub git: Option<String>,

    /// Tarball URL or path
    #[arg(long)]
    pub tarball: Option<String>,

    /// Registry package name
    #[arg(long)]
    pub npm: Option<String>,

    /// Local directory
    #[arg(long)]
    pub local: Option<PathBuf>,
}

impl BuildArgs {
    /// The repository these arguments point at
    pub fn repository(&self) -> Option<RepositorySpec> {
        let source = &self.source;
        if let Some(url) = &source.git {
            return Some(RepositorySpec::Git {
                url: url.clone(),
                branch: self.branch.clone(),
            });
        }
        if let Some(url) = &source.tarball {
            return Some(RepositorySpec::Tar { url: url.clone() });
        }
        if let Some(name) = &source.npm {
            return Some(RepositorySpec::Npm {
                name: name.clone(),
                version: self.package_version.clone(),
                registry: self.registry.clone(),
            });
        }
        source
            .local
            .as_ref()
            .map(|path| RepositorySpec::Local { path: path.clone() })
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_invocation() {
        let cli = Cli::try_parse_from([
            "modsmith",
            "build",
            "--root",
            "/tmp/b1",
            "--npm",
            "left-pad",
            "--package-version",
            "1.3.0",
            "--env",
            "npm_config_loglevel=silly",
            "--command",
            "build",
            "--",
            "--unsafe-perm",
        ])
        .unwrap();

        let Commands::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.command, Some(BuildCommand::Build));
        assert_eq!(
            args.repository(),
            Some(RepositorySpec::Npm {
                name: "left-pad".into(),
                version: Some("1.3.0".into()),
                registry: None,
            })
        );
        assert_eq!(
            args.env,
            vec![("npm_config_loglevel".to_string(), "silly".to_string())]
        );
        assert_eq!(args.options, vec!["--unsafe-perm"]);
    }

    #[test]
    fn requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["modsmith", "build", "--root", "/tmp/b1"]).is_err());
        assert!(Cli::try_parse_from([
            "modsmith", "build", "--root", "/tmp/b1", "--git", "x", "--local", "y"
        ])
        .is_err());
    }

    #[test]
    fn rejects_malformed_env() {
        assert!(parse_key_val("NOVALUE").is_err());
        assert!(parse_key_val("=x").is_err());
        assert_eq!(
            parse_key_val("A=b=c").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
    }
}
