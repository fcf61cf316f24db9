//! Per-architecture build runner shared by every command.
//!
//! One `go` invocation per `(target, architecture)`, each with the resolved
//! toolchain environment injected and the output written straight to its
//! final location. The first failure aborts the remaining architectures.

use std::path::{Path, PathBuf};

use crate::shell::{Shell, ToolCommand};
use crate::target::{Os, TargetSpec};
use crate::toolchain::ToolchainEnv;
use crate::types::{ArtifactKind, BuildArtifact, BuildError, BuildOptions};

/// `-buildmode` used for a per-architecture build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// `-buildmode=c-shared`, Android libraries.
    CShared,
    /// `-buildmode=c-archive`, iOS static archives.
    CArchive,
    /// `-buildmode=pie`, Android test binaries.
    Pie,
    /// Default build mode, standalone executables.
    Exe,
}

impl BuildMode {
    fn flag(&self) -> Option<&'static str> {
        match self {
            BuildMode::CShared => Some("-buildmode=c-shared"),
            BuildMode::CArchive => Some("-buildmode=c-archive"),
            BuildMode::Pie => Some("-buildmode=pie"),
            BuildMode::Exe => None,
        }
    }

    pub fn artifact_kind(&self) -> ArtifactKind {
        match self {
            BuildMode::CShared => ArtifactKind::SharedObject,
            BuildMode::CArchive => ArtifactKind::StaticArchive,
            BuildMode::Pie | BuildMode::Exe => ArtifactKind::Executable,
        }
    }
}

/// Drives the Go compiler for one command invocation.
#[derive(Debug)]
pub struct GoRunner<'a> {
    shell: &'a Shell,
    options: &'a BuildOptions,
    dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl<'a> GoRunner<'a> {
    pub fn new(shell: &'a Shell, options: &'a BuildOptions) -> Self {
        Self {
            shell,
            options,
            dir: None,
            env: Vec::new(),
        }
    }

    /// Runs every compiler invocation from `dir`.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Sets `key` on every compiler invocation, after the toolchain variables.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Build tags for `os`; iOS always carries `ios` first.
    pub fn tags(&self, os: Os) -> Vec<String> {
        let mut tags = Vec::with_capacity(self.options.tags.len() + 1);
        if os == Os::Ios {
            tags.push("ios".to_string());
        }
        tags.extend(self.options.tags.iter().filter(|t| *t != "ios").cloned());
        tags
    }

    /// Pass-through flags shared with `go build`, after the subcommand.
    pub fn flags(&self, subcommand: &[&str], os: Os) -> Vec<String> {
        let options = self.options;
        let mut args: Vec<String> = subcommand.iter().map(|s| s.to_string()).collect();

        let tags = self.tags(os);
        if !tags.is_empty() {
            args.push(format!("-tags={}", tags.join(",")));
        }
        if options.verbose {
            args.push("-v".into());
        }
        if options.force_rebuild {
            args.push("-a".into());
        }
        if options.install_deps {
            args.push("-i".into());
        }
        if options.print_commands {
            args.push("-x".into());
        }
        if let Some(gcflags) = &options.gcflags {
            args.push(format!("-gcflags={}", gcflags));
        }

        // DWARF is stripped from iOS archives.
        let mut ldflags = Vec::new();
        if os == Os::Ios && subcommand.first() == Some(&"build") {
            ldflags.push("-w");
        }
        if let Some(extra) = options.ldflags.as_deref().filter(|s| !s.is_empty()) {
            ldflags.push(extra);
        }
        if !ldflags.is_empty() {
            args.push(format!("-ldflags={}", ldflags.join(" ")));
        }

        if options.trimpath {
            args.push("-trimpath".into());
        }
        if options.keep_work {
            args.push("-work".into());
        }
        args
    }

    /// Builds `package` once for `env` into `output`.
    ///
    /// # Errors
    ///
    /// [`BuildError::Compile`] naming the architecture when the compiler fails.
    pub fn build_one(
        &self,
        package: &str,
        env: &ToolchainEnv,
        mode: BuildMode,
        output: &Path,
    ) -> Result<BuildArtifact, BuildError> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.shell.mkdir(parent)?;
        }
        let mut args = self.flags(&["build"], env.os);
        args.extend(mode.flag().map(String::from));
        args.push(format!("-o={}", output.display()));
        args.push(package.to_string());
        self.compile(args, env)?;

        Ok(BuildArtifact {
            arch: env.arch,
            path: output.to_path_buf(),
            kind: mode.artifact_kind(),
        })
    }

    /// Builds `package` for `env` without keeping any output. Used to check
    /// that a library package compiles for every requested architecture.
    pub fn compile_only(&self, package: &str, env: &ToolchainEnv) -> Result<(), BuildError> {
        let mut args = self.flags(&["build"], env.os);
        args.push(package.to_string());
        self.compile(args, env)
    }

    /// Compiles the tests of `package` into a position-independent binary.
    pub fn test_binary(
        &self,
        package: &str,
        env: &ToolchainEnv,
        output: &Path,
    ) -> Result<BuildArtifact, BuildError> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.shell.mkdir(parent)?;
        }
        let mut args = self.flags(&["test", "-c"], env.os);
        args.extend(BuildMode::Pie.flag().map(String::from));
        args.push(format!("-o={}", output.display()));
        args.push(package.to_string());
        self.compile(args, env)?;

        Ok(BuildArtifact {
            arch: env.arch,
            path: output.to_path_buf(),
            kind: ArtifactKind::Executable,
        })
    }

    fn compile(&self, args: Vec<String>, env: &ToolchainEnv) -> Result<(), BuildError> {
        let mut cmd = ToolCommand::new(&self.options.tools.go)
            .envs(env.vars())
            .envs(self.env.iter().cloned())
            .args(args)
            .description(format!("go build ({}/{})", env.os, env.arch));
        if let Some(dir) = &self.dir {
            cmd = cmd.current_dir(dir);
        }
        tracing::info!(os = %env.os, arch = %env.arch, "compiling");
        self.shell.run(&cmd).map_err(|e| match e {
            BuildError::Tool(source) => BuildError::Compile {
                os: env.os,
                arch: env.arch,
                source,
            },
            other => other,
        })
    }
}

/// Runs `build` for each environment in order, stopping at the first error.
pub fn build_each<F>(envs: &[ToolchainEnv], mut build: F) -> Result<Vec<BuildArtifact>, BuildError>
where
    F: FnMut(&ToolchainEnv) -> Result<BuildArtifact, BuildError>,
{
    let mut artifacts = Vec::with_capacity(envs.len());
    for env in envs {
        artifacts.push(build(env)?);
    }
    Ok(artifacts)
}

/// Guards an assembler against an incomplete or reordered artifact set.
pub fn check_complete(target: &TargetSpec, artifacts: &[BuildArtifact]) -> Result<(), BuildError> {
    if artifacts.len() < target.archs().len() {
        return Err(BuildError::Assembly(format!(
            "{} artifact(s) for {} requested architecture(s) ({})",
            artifacts.len(),
            target.archs().len(),
            target
        )));
    }
    let built: Vec<_> = artifacts.iter().map(|a| a.arch).collect();
    if built != target.archs() {
        return Err(BuildError::Assembly(format!(
            "artifacts for [{}] do not match {}",
            built
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(","),
            target
        )));
    }
    Ok(())
}

/// Checks that every artifact was written. Skipped in dry-run mode.
pub fn verify_artifacts(shell: &Shell, artifacts: &[BuildArtifact]) -> Result<(), BuildError> {
    if shell.is_dry_run() {
        return Ok(());
    }
    if let Some(missing) = artifacts.iter().find(|a| !a.path.exists()) {
        return Err(BuildError::Assembly(format!(
            "{} was not produced for {}",
            missing.path.display(),
            missing.arch
        )));
    }
    Ok(())
}
