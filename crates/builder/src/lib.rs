#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]
//! Sandboxed npm module builds for modsmith
//!
//! A build fetches a package into a private root, runs the package manager
//! there under a low-privilege identity with a fully controlled
//! environment, records what was installed in the package manifest, and
//! hands back the module as a gzipped tarball.

mod completion;
pub mod description;
pub mod fetch;
pub mod hooks;
pub mod merge;
mod orchestrator;
pub mod packaging;
mod runtime;
mod stages;
pub mod version;

pub use completion::{Completion, CompletionReceiver};
pub use description::{
    BuildCommand, BuildDescription, BuildRequest, Defaults, Directories, RequestDirectories,
};
pub use fetch::{CheckoutFetcher, RepositoryFetcher, RepositorySpec};
pub use hooks::{Filter, HookPayload, HookRegistry};
pub use merge::deep_merge;
pub use orchestrator::{open_failure_log, Orchestrator};
pub use packaging::{pack_directory, pack_module, BuildOutput};
pub use runtime::detect_host_runtime;
pub use version::{max_satisfying, parse_constraint, parse_version, VersionResolver};
