//! Mobile build engine for Go packages.
//!
//! `mobuild-sdk` turns a Go package into installable mobile bundles by
//! driving external toolchains: the Go compiler, `gobind`, the Android NDK
//! and SDK tools, and Xcode's `xcrun`. It never compiles anything itself.
//!
//! # Architecture
//!
//! - **Target**: parses `-target` strings such as `android/arm,android/386`
//! - **Toolchain**: resolves the per-architecture compiler environment from a
//!   static table plus the SDKs found on the host
//! - **Builders**: run the compiler once per architecture and assemble the
//!   artifacts into an Android tree, an `.aar`, a universal archive or a
//!   `.framework`
//! - **Orchestrator**: sequences the above for `build`, `test`, `bind` and
//!   `install`
//! - **Shell**: executes, echoes or dry-runs every external action
//!
//! # Example
//!
//! ```ignore
//! use mobuild_sdk::{BuildOptions, GoListLoader, HostSdks, Orchestrator, Shell};
//!
//! let options = BuildOptions {
//!     target: "android/arm,android/386".into(),
//!     dry_run: true,
//!     ..Default::default()
//! };
//! let shell = Shell::from_options(&options);
//! let sdks = HostSdks::discover(&options.tools.xcrun);
//! let loader = GoListLoader::new(&shell, &options.tools.go);
//! let report = Orchestrator::new(&options, &shell, &sdks, &loader).run_build("example/basic")?;
//! println!("{:?}", report.bundle);
//! # Ok::<(), mobuild_sdk::PipelineError>(())
//! ```

pub mod builders;
pub mod codegen;
pub mod gotool;
pub mod orchestrator;
pub mod package;
pub mod shell;
pub mod target;
pub mod toolchain;
pub mod types;

pub use orchestrator::{BuildReport, Command, Orchestrator, PipelineError, Stage, WorkDir};
pub use package::{GoListLoader, Package, PackageLoader};
pub use shell::{Shell, ToolCommand, Transcript};
pub use target::{Arch, Os, TargetSpec, parse_target};
pub use toolchain::{HostSdks, ToolchainEnv, ToolchainSettings, resolve_env};
pub use types::{
    ArtifactKind, BuildArtifact, BuildError, BuildOptions, Bundle, DEFAULT_RUNTIME_PACKAGE,
    ToolFailure, Tools,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
