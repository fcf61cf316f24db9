//! Core types for mobuild-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`BuildError`] / [`ToolFailure`] - Error types for build operations
//! - [`BuildOptions`] / [`Tools`] - Immutable per-command configuration
//! - [`BuildArtifact`] / [`Bundle`] - Outputs of the per-architecture runner
//!   and the assembler

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::target::{Arch, Os};
use crate::toolchain::ToolchainSettings;

/// Captured result of an external tool that exited unsuccessfully.
///
/// `Display` renders a single line. The captured stderr is kept separately so
/// callers can show it in verbose mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    /// Human-readable name of the invocation, e.g. `go build (android/arm)`.
    pub description: String,
    /// Exit status as reported by the OS, or the spawn error.
    pub status: String,
    /// Captured standard error of the tool.
    pub stderr: String,
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.description, self.status)
    }
}

impl std::error::Error for ToolFailure {}

/// Error types for mobuild-sdk operations.
///
/// Every stage of the pipeline reports through this enum; the orchestrator
/// stops at the first one and never retries.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The `-target` string could not be parsed or validated.
    #[error("invalid -target={target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    /// The Android SDK or NDK could not be located.
    #[error("SDK not found: {0}")]
    SdkNotFound(String),

    /// The host lacks the native toolchain required for the target (Xcode for iOS).
    #[error("toolchain unavailable: {0}")]
    ToolchainUnavailable(String),

    /// The Go compiler failed for one architecture. Aborts the whole build.
    #[error("compile failed for {os}/{arch}: {source}")]
    Compile {
        os: Os,
        arch: Arch,
        #[source]
        source: ToolFailure,
    },

    /// The multi-architecture merge tool (`lipo`) failed.
    #[error("merge failed: {0}")]
    Merge(#[source] ToolFailure),

    /// The bundle could not be assembled from the supplied artifacts.
    #[error("assembly failed: {0}")]
    Assembly(String),

    /// Zero, several, or broken packages matched the requested path.
    #[error("package resolution failed: {0}")]
    PackageResolution(String),

    /// A runnable mobile program does not import the runtime-bootstrap package.
    #[error("{package} must import {runtime}")]
    MissingRuntimeImport { package: String, runtime: String },

    /// An external invocation exceeded the configured timeout and was killed.
    #[error("{description} timed out after {}s", timeout.as_secs())]
    Timeout {
        description: String,
        timeout: Duration,
    },

    /// Any other external tool exited non-zero.
    #[error(transparent)]
    Tool(#[from] ToolFailure),

    /// Invalid option combination or configuration file.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding failed (for example `go list -json` output).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BuildError {
    /// Returns the captured tool failure, if this error wraps one.
    pub fn tool_failure(&self) -> Option<&ToolFailure> {
        match self {
            BuildError::Compile { source, .. } => Some(source),
            BuildError::Merge(failure) | BuildError::Tool(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Program names (or paths) of the external tools mobuild drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub go: String,
    pub gobind: String,
    pub xcrun: String,
    pub javac: String,
    pub jar: String,
    pub adb: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            go: "go".into(),
            gobind: "gobind".into(),
            xcrun: "xcrun".into(),
            javac: "javac".into(),
            jar: "jar".into(),
            adb: "adb".into(),
        }
    }
}

/// Default runtime-bootstrap package a runnable mobile program must import.
pub const DEFAULT_RUNTIME_PACKAGE: &str = "golang.org/x/mobile/app";

/// Immutable configuration for one command invocation.
///
/// Built once by the CLI from flags layered over `mobuild.toml` and passed
/// by reference to every component.
///
/// # Example
///
/// ```
/// use mobuild_sdk::BuildOptions;
///
/// let options = BuildOptions {
///     target: "android/arm,android/386".into(),
///     dry_run: true,
///     ..Default::default()
/// };
/// assert_eq!(options.android_api, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Raw `-target` value.
    pub target: String,
    /// `-o`; each command has its own default.
    pub output: Option<PathBuf>,
    /// Replaces the `build` default of `build`, `test` and `install`. Unlike
    /// `output` it is allowed for library packages and ignored by `bind`.
    pub output_dir: Option<PathBuf>,
    /// `-name`; overrides the product name derived from the package.
    pub name: Option<String>,
    /// `-v`
    pub verbose: bool,
    /// `-n`: print commands instead of running them.
    pub dry_run: bool,
    /// `-x`: print commands as they run.
    pub print_commands: bool,
    /// `-work`: keep the scratch directory.
    pub keep_work: bool,
    /// `-a`
    pub force_rebuild: bool,
    /// `-i`
    pub install_deps: bool,
    pub trimpath: bool,
    pub tags: Vec<String>,
    pub gcflags: Option<String>,
    pub ldflags: Option<String>,
    /// Requested Android API level; raised to each ABI's minimum.
    pub android_api: u32,
    /// Minimum iOS version.
    pub ios_version: String,
    pub bitcode: bool,
    /// `CFBundleIdentifier` prefix for generated frameworks.
    pub bundle_id: Option<String>,
    /// `-exe`: build Android executables instead of shared libraries.
    pub exe: bool,
    /// `-javapkg` for bind (Android only).
    pub java_pkg: Option<String>,
    /// `-prefix` for bind (iOS only).
    pub prefix: Option<String>,
    pub runtime_package: String,
    /// Per-invocation timeout. `None` waits forever.
    pub timeout: Option<Duration>,
    pub tools: Tools,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            target: "android".into(),
            output: None,
            output_dir: None,
            name: None,
            verbose: false,
            dry_run: false,
            print_commands: false,
            keep_work: false,
            force_rebuild: false,
            install_deps: false,
            trimpath: false,
            tags: Vec::new(),
            gcflags: None,
            ldflags: None,
            android_api: 16,
            ios_version: "7.0".into(),
            bitcode: true,
            bundle_id: None,
            exe: false,
            java_pkg: None,
            prefix: None,
            runtime_package: DEFAULT_RUNTIME_PACKAGE.into(),
            timeout: None,
            tools: Tools::default(),
        }
    }
}

impl BuildOptions {
    /// The subset of options the toolchain resolver consumes.
    pub fn toolchain_settings(&self) -> ToolchainSettings {
        ToolchainSettings {
            android_api: self.android_api,
            ios_version: self.ios_version.clone(),
            bitcode: self.bitcode,
        }
    }

    /// True when commands are echoed (`-x` or `-n`).
    pub fn prints_commands(&self) -> bool {
        self.print_commands || self.dry_run
    }
}

/// Kind of file a per-architecture build produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    SharedObject,
    StaticArchive,
    Executable,
}

/// One successful per-architecture build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub arch: Arch,
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

/// The final distributable unit for one target OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bundle {
    /// `<o>/android/<section>/<abi>/...`, one file per ABI.
    AndroidTree {
        root: PathBuf,
        artifacts: Vec<BuildArtifact>,
    },
    /// A universal static archive produced by `lipo`.
    UniversalArchive { path: PathBuf, archs: Vec<Arch> },
    /// An iOS `.framework` directory.
    Framework { path: PathBuf, archs: Vec<Arch> },
    /// An Android `.aar` library.
    Aar { path: PathBuf, archs: Vec<Arch> },
}

impl Bundle {
    /// Location of the bundle on disk.
    pub fn path(&self) -> &Path {
        match self {
            Bundle::AndroidTree { root, .. } => root,
            Bundle::UniversalArchive { path, .. }
            | Bundle::Framework { path, .. }
            | Bundle::Aar { path, .. } => path,
        }
    }

    /// Architectures contained in the bundle, in build order.
    pub fn archs(&self) -> Vec<Arch> {
        match self {
            Bundle::AndroidTree { artifacts, .. } => artifacts.iter().map(|a| a.arch).collect(),
            Bundle::UniversalArchive { archs, .. }
            | Bundle::Framework { archs, .. }
            | Bundle::Aar { archs, .. } => archs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failure_displays_one_line() {
        let failure = ToolFailure {
            description: "go build (android/arm)".into(),
            status: "exit status: 2".into(),
            stderr: "line one\nline two\n".into(),
        };
        let err = BuildError::Compile {
            os: Os::Android,
            arch: Arch::Arm,
            source: failure.clone(),
        };
        let rendered = err.to_string();
        assert!(!rendered.contains('\n'));
        assert_eq!(
            rendered,
            "compile failed for android/arm: go build (android/arm) failed: exit status: 2"
        );
        assert_eq!(err.tool_failure(), Some(&failure));
    }

    #[test]
    fn timeout_reports_seconds() {
        let err = BuildError::Timeout {
            description: "go build (android/386)".into(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "go build (android/386) timed out after 30s");
        assert!(err.tool_failure().is_none());
    }

    #[test]
    fn default_options() {
        let options = BuildOptions::default();
        assert_eq!(options.target, "android");
        assert_eq!(options.ios_version, "7.0");
        assert!(options.bitcode);
        assert!(!options.prints_commands());
        assert_eq!(options.tools.go, "go");
        assert_eq!(options.runtime_package, DEFAULT_RUNTIME_PACKAGE);
    }

    #[test]
    fn bundle_path_and_archs() {
        let bundle = Bundle::AndroidTree {
            root: PathBuf::from("build/android/lib"),
            artifacts: vec![
                BuildArtifact {
                    arch: Arch::Arm,
                    path: PathBuf::from("build/android/lib/armeabi-v7a/libx.so"),
                    kind: ArtifactKind::SharedObject,
                },
                BuildArtifact {
                    arch: Arch::X86,
                    path: PathBuf::from("build/android/lib/x86/libx.so"),
                    kind: ArtifactKind::SharedObject,
                },
            ],
        };
        assert_eq!(bundle.path(), Path::new("build/android/lib"));
        assert_eq!(bundle.archs(), vec![Arch::Arm, Arch::X86]);
    }
}
