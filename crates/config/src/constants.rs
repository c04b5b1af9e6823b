//! Fixed names inside a build root
//!
//! These names are not configurable: hooks, operators and the diagnostic
//! log check all rely on finding things at the same place in every build.

/// Fetched source lives here, relative to the build root
pub const BUILD_DIR: &str = "build";
/// Module directory name inside `BUILD_DIR` (npm tarballs unpack to `package/`)
pub const MODULE_DIR: &str = "package";
pub const CACHE_DIR: &str = "npm-cache";
pub const TMP_DIR: &str = "tmp";
pub const RUNTIME_DIR: &str = "runtime";

pub const GLOBAL_RC: &str = "npmglobalrc";
pub const USER_RC: &str = "npmlocalrc";

pub const MANIFEST_FILE: &str = "package.json";
pub const NODE_MODULES: &str = "node_modules";
/// Helper-binary directory inside `node_modules`, never a dependency
pub const BIN_DIR: &str = ".bin";

/// Combined stdout/stderr capture, relative to the build root
pub const STDIO_LOG: &str = "stdio.log";

/// Log files a package manager may leave behind after exiting 0 on failure
pub const DIAGNOSTIC_LOGS: [&str; 2] = ["builderror.log", "npm-debug.log"];

/// Gzip tarball spooled under the tmp directory before it is handed out
pub const ARCHIVE_FILE: &str = "module.tgz";
