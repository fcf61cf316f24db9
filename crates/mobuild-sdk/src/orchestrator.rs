//! Command pipelines: parse, resolve, build per architecture, assemble.
//!
//! Each command runs as a small state machine over [`Stage`]. Any failure
//! moves it to [`Stage::Failed`] and is reported together with the stage it
//! happened in; later stages never run.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::builders::android::{
    AarAssembler, AndroidTreeAssembler, Section, compile_java, device_abi, getprop_abi_command,
    push,
};
use crate::builders::ios::{FrameworkAssembler, UniversalArchiveAssembler};
use crate::builders::{Assembler, BuildMode, GoRunner, build_each};
use crate::codegen::{library_name, product_name, title_case};
use crate::gotool;
use crate::package::{Package, PackageLoader, check_errors, resolve_single};
use crate::shell::{Shell, ToolCommand};
use crate::target::{Os, TargetSpec, parse_target};
use crate::toolchain::{HostSdks, ToolchainEnv, android_abi, android_platform, resolve_env};
use crate::types::{BuildError, BuildOptions, Bundle};

/// Output directory used by `build` and `test` when `-o` is not given.
pub const DEFAULT_OUTPUT: &str = "build";

/// Device directory executables are pushed to by `install`.
pub const DEVICE_DIR: &str = "/data/local/tmp";

/// Commands that run the build pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Build,
    Test,
    Bind,
    Install,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Build => "build",
            Command::Test => "test",
            Command::Bind => "bind",
            Command::Install => "install",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parsing,
    Resolving,
    Building,
    Assembling,
    Installing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Parsing => "parsing",
            Stage::Resolving => "resolving",
            Stage::Building => "building",
            Stage::Assembling => "assembling",
            Stage::Installing => "installing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        })
    }
}

/// A failed command, tagged with the stage that failed.
#[derive(Debug, thiserror::Error)]
#[error("{command}: {stage}: {source}")]
pub struct PipelineError {
    pub command: Command,
    pub stage: Stage,
    #[source]
    pub source: BuildError,
}

/// Result of a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub command: Command,
    pub target: TargetSpec,
    pub packages: Vec<Package>,
    /// `None` for library packages, which are only compiled.
    pub bundle: Option<Bundle>,
}

struct Pipeline {
    command: Command,
    stage: Stage,
}

impl Pipeline {
    fn enter(&mut self, stage: Stage) {
        tracing::info!(command = %self.command, from = %self.stage, to = %stage, "stage");
        self.stage = stage;
    }
}

fn drive<T>(
    command: Command,
    body: impl FnOnce(&mut Pipeline) -> Result<T, BuildError>,
) -> Result<T, PipelineError> {
    let mut pipeline = Pipeline {
        command,
        stage: Stage::Parsing,
    };
    match body(&mut pipeline) {
        Ok(value) => {
            pipeline.enter(Stage::Done);
            Ok(value)
        }
        Err(source) => {
            let stage = pipeline.stage;
            pipeline.enter(Stage::Failed);
            Err(PipelineError {
                command,
                stage,
                source,
            })
        }
    }
}

/// Scratch directory shared by every architecture of one command.
///
/// Removed when dropped unless it was created with `keep`.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    _guard: Option<TempDir>,
}

impl WorkDir {
    pub fn create(shell: &Shell, keep: bool) -> Result<Self, BuildError> {
        let dir = tempfile::Builder::new().prefix("mobuild-work-").tempdir()?;
        let path = dir.path().to_path_buf();
        shell.substitute(&path, "$WORK");
        shell.echo(&format!("WORK={}", path.display()));
        let guard = if keep {
            let kept = dir.keep();
            if !shell.prints() {
                println!("WORK={}", kept.display());
            }
            None
        } else {
            Some(dir)
        };
        Ok(Self {
            path,
            _guard: guard,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sequences the components for each command.
pub struct Orchestrator<'a> {
    options: &'a BuildOptions,
    shell: &'a Shell,
    sdks: &'a HostSdks,
    loader: &'a dyn PackageLoader,
    gopath: Option<PathBuf>,
}

impl<'a> Orchestrator<'a> {
    /// Registers SDK locations as transcript placeholders on `shell`.
    pub fn new(
        options: &'a BuildOptions,
        shell: &'a Shell,
        sdks: &'a HostSdks,
        loader: &'a dyn PackageLoader,
    ) -> Self {
        if let Some(ndk) = &sdks.ndk {
            shell.substitute(ndk, "$NDK_PATH");
        }
        if let Some(home) = &sdks.android_home {
            shell.substitute(home, "$ANDROID_HOME");
        }
        Self {
            options,
            shell,
            sdks,
            loader,
            gopath: None,
        }
    }

    /// GOPATH entry placed after `$WORK` when building bindings. Queried
    /// from `go env GOPATH` when not set.
    pub fn gopath(mut self, gopath: impl Into<PathBuf>) -> Self {
        let gopath = gopath.into();
        self.shell.substitute(&gopath, "$GOPATH");
        self.gopath = Some(gopath);
        self
    }

    /// `build`: compiles `path` for every requested architecture.
    ///
    /// A main package yields a bundle: shared objects (or executables with
    /// `-exe`) under `<o>/android`, or a universal archive under `<o>/iOS`.
    /// A library package is only compiled.
    pub fn run_build(&self, path: &str) -> Result<BuildReport, PipelineError> {
        drive(Command::Build, |p| {
            self.build_package(p, Command::Build, self.options, path)
        })
    }

    /// `test`: compiles Android test binaries into `<o>/android/test/<abi>/`.
    pub fn run_test(&self, path: &str) -> Result<BuildReport, PipelineError> {
        let options = self.options;
        drive(Command::Test, |p| {
            let target = parse_target(&options.target)?;
            if target.os() != Os::Android {
                return Err(BuildError::InvalidTarget {
                    target: options.target.clone(),
                    reason: "test binaries can only be built for android".into(),
                });
            }

            p.enter(Stage::Resolving);
            let package = self.load_one(target.os(), options, path)?;
            let envs = self.resolve_envs(&target, options)?;

            p.enter(Stage::Building);
            let name = options
                .name
                .clone()
                .unwrap_or_else(|| library_name(package.base_name()));
            let output = output_or_default(options);
            let bundle = self.android_tree(
                p,
                options,
                &target,
                &envs,
                &package,
                &name,
                &output,
                Section::Test,
            )?;
            Ok(BuildReport {
                command: Command::Test,
                target,
                packages: vec![package],
                bundle: Some(bundle),
            })
        })
    }

    /// `bind`: generates language bindings for `paths` and packages them as
    /// an `.aar` (Android) or a `.framework` (iOS).
    pub fn run_bind(&self, paths: &[String]) -> Result<BuildReport, PipelineError> {
        let options = self.options;
        drive(Command::Bind, |p| {
            let target = parse_target(&options.target)?;
            let os = target.os();
            if options.java_pkg.is_some() && os != Os::Android {
                return Err(BuildError::Config(
                    "-javapkg is supported only for android target".into(),
                ));
            }
            if options.prefix.is_some() && os != Os::Ios {
                return Err(BuildError::Config(
                    "-prefix is supported only for ios target".into(),
                ));
            }

            p.enter(Stage::Resolving);
            let patterns = if paths.is_empty() {
                vec![".".to_string()]
            } else {
                paths.to_vec()
            };
            let tags = GoRunner::new(self.shell, options).tags(os);
            let packages = self.loader.load(os, &tags, &patterns)?;
            check_errors(&packages)?;
            if let Some(main) = packages.iter().find(|pkg| pkg.is_main()) {
                return Err(BuildError::Config(format!(
                    "binding 'main' package ({}) is not supported",
                    main.import_path
                )));
            }
            let envs = self.resolve_envs(&target, options)?;
            let bootclasspath = match os {
                Os::Android => Some(android_platform(
                    self.sdks.android_home()?,
                    options.android_api,
                )?),
                Os::Ios => None,
            };
            let gopath = match &self.gopath {
                Some(gopath) => gopath.clone(),
                None => {
                    let gopath = gotool::gopath(self.shell, &options.tools.go)?;
                    self.shell.substitute(&gopath, "$GOPATH");
                    gopath
                }
            };

            p.enter(Stage::Building);
            let work = WorkDir::create(self.shell, options.keep_work)?;
            self.gobind(options, os, &packages, work.path())?;
            let search_path = env::join_paths([work.path(), gopath.as_path()])
                .map_err(|e| BuildError::Config(format!("invalid GOPATH {:?}: {}", gopath, e)))?;
            let runner = GoRunner::new(self.shell, options)
                .in_dir(work.path().join("src"))
                .env("GOPATH", search_path.to_string_lossy());
            let base = packages[0].base_name().to_string();

            let bundle = match bootclasspath {
                Some(bootclasspath) => {
                    let jni = work.path().join("android/src/main/jniLibs");
                    let artifacts = build_each(&envs, |env| {
                        runner.build_one(
                            "./gobind",
                            env,
                            BuildMode::CShared,
                            &jni.join(env.abi).join("libgojni.so"),
                        )
                    })?;
                    let classes = compile_java(
                        self.shell,
                        &options.tools.javac,
                        &options.tools.jar,
                        work.path(),
                        &bootclasspath,
                    )?;

                    p.enter(Stage::Assembling);
                    let output = options
                        .output
                        .clone()
                        .unwrap_or_else(|| PathBuf::from(format!("{}.aar", base)));
                    let java_package = options
                        .java_pkg
                        .clone()
                        .unwrap_or_else(|| format!("go.{}", library_name(&base)));
                    AarAssembler::new(
                        self.shell,
                        output,
                        java_package,
                        options.android_api,
                        classes,
                    )
                    .assemble(&target, &artifacts)?
                }
                None => {
                    let artifacts = build_each(&envs, |env| {
                        runner.build_one(
                            "./gobind",
                            env,
                            BuildMode::CArchive,
                            &work.path().join(format!("{}-{}.a", base, env.arch)),
                        )
                    })?;

                    p.enter(Stage::Assembling);
                    let output = options
                        .output
                        .clone()
                        .unwrap_or_else(|| PathBuf::from(format!("{}.framework", title_case(&base))));
                    let prefix = options.prefix.as_deref().unwrap_or("");
                    let gobind_dir = work.path().join("src").join("gobind");
                    let mut headers: Vec<PathBuf> = packages
                        .iter()
                        .map(|pkg| {
                            gobind_dir.join(format!(
                                "{}{}.objc.h",
                                prefix,
                                title_case(pkg.base_name())
                            ))
                        })
                        .collect();
                    headers.push(gobind_dir.join("Universe.objc.h"));
                    headers.push(gobind_dir.join("ref.h"));

                    FrameworkAssembler::new(self.shell, &options.tools.xcrun, output)
                        .headers(headers)
                        .packages(packages.iter().map(|pkg| pkg.import_path.clone()).collect())
                        .bundle_id_prefix(options.bundle_id.as_deref())
                        .min_os_version(options.ios_version.clone())
                        .assemble(&target, &artifacts)?
                }
            };

            Ok(BuildReport {
                command: Command::Bind,
                target,
                packages,
                bundle: Some(bundle),
            })
        })
    }

    /// `install`: builds Android executables and pushes the one matching the
    /// connected device's ABI to `/data/local/tmp/<name>`.
    pub fn run_install(&self, path: &str) -> Result<BuildReport, PipelineError> {
        let options = BuildOptions {
            exe: true,
            ..self.options.clone()
        };
        drive(Command::Install, |p| {
            let target = parse_target(&options.target)?;
            if target.os() != Os::Android {
                return Err(BuildError::InvalidTarget {
                    target: options.target.clone(),
                    reason: "install is only supported for android".into(),
                });
            }
            let report = self.build_package(p, Command::Install, &options, path)?;

            p.enter(Stage::Installing);
            let Some(Bundle::AndroidTree { artifacts, .. }) = &report.bundle else {
                return Err(BuildError::Config(format!(
                    "{} is not a main package; nothing to install",
                    path
                )));
            };
            let adb = &options.tools.adb;
            let artifact = if self.shell.is_dry_run() {
                self.shell.run(&getprop_abi_command(adb))?;
                artifacts.first()
            } else {
                let abi = device_abi(self.shell, adb)?;
                let found = artifacts.iter().find(|a| android_abi(a.arch).abi == abi);
                if found.is_none() {
                    return Err(BuildError::Assembly(format!(
                        "device ABI {:?} is not among the built architectures ({})",
                        abi, report.target
                    )));
                }
                found
            };
            let Some(artifact) = artifact else {
                return Err(BuildError::Assembly("no executable was built".into()));
            };
            let name = artifact
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            push(
                self.shell,
                adb,
                &artifact.path,
                &format!("{}/{}", DEVICE_DIR, name),
            )?;
            Ok(BuildReport {
                command: Command::Install,
                ..report
            })
        })
    }

    fn build_package(
        &self,
        p: &mut Pipeline,
        command: Command,
        options: &BuildOptions,
        path: &str,
    ) -> Result<BuildReport, BuildError> {
        let target = parse_target(&options.target)?;
        let os = target.os();
        if options.exe && os != Os::Android {
            return Err(BuildError::Config(
                "-exe is supported only for android target".into(),
            ));
        }

        p.enter(Stage::Resolving);
        let package = self.load_one(os, options, path)?;
        if !package.is_main() && options.output.is_some() {
            return Err(BuildError::Config(
                "cannot set -o when building non-main package".into(),
            ));
        }
        if package.is_main() && !options.exe {
            self.require_runtime(&package, options)?;
        }
        let envs = self.resolve_envs(&target, options)?;

        p.enter(Stage::Building);
        if !package.is_main() {
            let runner = GoRunner::new(self.shell, options);
            for env in &envs {
                runner.compile_only(&package.import_path, env)?;
            }
            return Ok(BuildReport {
                command,
                target,
                packages: vec![package],
                bundle: None,
            });
        }

        let output = output_or_default(options);
        let bundle = match os {
            Os::Android => {
                let name = options
                    .name
                    .clone()
                    .unwrap_or_else(|| library_name(package.base_name()));
                let section = if options.exe { Section::App } else { Section::Lib };
                self.android_tree(p, options, &target, &envs, &package, &name, &output, section)?
            }
            Os::Ios => {
                let name = options
                    .name
                    .clone()
                    .unwrap_or_else(|| product_name(package.base_name()));
                let work = WorkDir::create(self.shell, options.keep_work)?;
                let runner = GoRunner::new(self.shell, options);
                let artifacts = build_each(&envs, |env| {
                    runner.build_one(
                        &package.import_path,
                        env,
                        BuildMode::CArchive,
                        &work.path().join(format!("{}-{}.a", name, env.arch)),
                    )
                })?;

                p.enter(Stage::Assembling);
                UniversalArchiveAssembler::new(self.shell, &options.tools.xcrun, &output, &name)
                    .assemble(&target, &artifacts)?
            }
        };

        Ok(BuildReport {
            command,
            target,
            packages: vec![package],
            bundle: Some(bundle),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn android_tree(
        &self,
        p: &mut Pipeline,
        options: &BuildOptions,
        target: &TargetSpec,
        envs: &[ToolchainEnv],
        package: &Package,
        name: &str,
        output: &Path,
        section: Section,
    ) -> Result<Bundle, BuildError> {
        let tree = AndroidTreeAssembler::new(self.shell, output, section);
        let runner = GoRunner::new(self.shell, options);
        tree.prepare()?;

        let result = build_each(envs, |env| {
            let dest = tree.artifact_path(env.arch, name);
            match section {
                Section::Test => runner.test_binary(&package.import_path, env, &dest),
                Section::App => runner.build_one(&package.import_path, env, BuildMode::Exe, &dest),
                Section::Lib => {
                    runner.build_one(&package.import_path, env, BuildMode::CShared, &dest)
                }
            }
        })
        .and_then(|artifacts| {
            p.enter(Stage::Assembling);
            tree.assemble(target, &artifacts)
        });
        if result.is_err() {
            tree.discard();
        }
        result
    }

    fn load_one(&self, os: Os, options: &BuildOptions, path: &str) -> Result<Package, BuildError> {
        let tags = GoRunner::new(self.shell, options).tags(os);
        let packages = self.loader.load(os, &tags, &[path.to_string()])?;
        resolve_single(path, packages)
    }

    fn require_runtime(&self, package: &Package, options: &BuildOptions) -> Result<(), BuildError> {
        if package.imports_transitively(&options.runtime_package) {
            return Ok(());
        }
        Err(BuildError::MissingRuntimeImport {
            package: package.import_path.clone(),
            runtime: options.runtime_package.clone(),
        })
    }

    /// Resolves every architecture before anything is compiled.
    fn resolve_envs(
        &self,
        target: &TargetSpec,
        options: &BuildOptions,
    ) -> Result<Vec<ToolchainEnv>, BuildError> {
        let settings = options.toolchain_settings();
        target
            .archs()
            .iter()
            .map(|&arch| resolve_env(target.os(), arch, &settings, self.sdks))
            .collect()
    }

    fn gobind(
        &self,
        options: &BuildOptions,
        os: Os,
        packages: &[Package],
        work: &Path,
    ) -> Result<(), BuildError> {
        let lang = match os {
            Os::Android => "go,java",
            Os::Ios => "go,objc",
        };
        let mut cmd = ToolCommand::new(&options.tools.gobind)
            .env("GOOS", os.goos())
            .env("CGO_ENABLED", "1")
            .arg(format!("-lang={}", lang))
            .arg(format!("-outdir={}", work.display()))
            .description("gobind");
        let tags = GoRunner::new(self.shell, options).tags(os);
        if !tags.is_empty() {
            cmd = cmd.arg(format!("-tags={}", tags.join(",")));
        }
        if let Some(java_pkg) = &options.java_pkg {
            cmd = cmd.arg(format!("-javapkg={}", java_pkg));
        }
        if let Some(prefix) = &options.prefix {
            cmd = cmd.arg(format!("-prefix={}", prefix));
        }
        let cmd = cmd.args(packages.iter().map(|pkg| pkg.import_path.clone()));
        self.shell.run(&cmd)
    }
}

fn output_or_default(options: &BuildOptions) -> PathBuf {
    options
        .output
        .clone()
        .or_else(|| options.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::Transcript;
    use crate::target::Arch;

    struct FixedLoader(Vec<Package>);

    impl PackageLoader for FixedLoader {
        fn load(&self, _: Os, _: &[String], _: &[String]) -> Result<Vec<Package>, BuildError> {
            Ok(self.0.clone())
        }
    }

    fn package(name: &str, import_path: &str, deps: &[&str]) -> Package {
        Package {
            name: name.into(),
            import_path: import_path.into(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    fn android_sdks() -> HostSdks {
        HostSdks {
            android_home: Some(PathBuf::from("/opt/android")),
            ndk: Some(PathBuf::from("/opt/android/ndk/25.2")),
            ndk_host_tag: "linux-x86_64".into(),
            apple: None,
        }
    }

    fn run(
        options: BuildOptions,
        sdks: HostSdks,
        packages: Vec<Package>,
    ) -> (Result<BuildReport, PipelineError>, String) {
        let transcript = Transcript::new();
        let shell = Shell::new(options.dry_run, options.print_commands).with_output(transcript.clone());
        let loader = FixedLoader(packages);
        let orchestrator = Orchestrator::new(&options, &shell, &sdks, &loader);
        let result = orchestrator.run_build("example/pkg");
        (result, transcript.contents())
    }

    #[test]
    fn invalid_target_fails_while_parsing() {
        let options = BuildOptions {
            target: "android/arm,ios/arm64".into(),
            dry_run: true,
            ..Default::default()
        };
        let (result, transcript) = run(options, android_sdks(), vec![]);
        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::Parsing);
        assert!(matches!(err.source, BuildError::InvalidTarget { .. }));
        assert_eq!(transcript, "");
    }

    #[test]
    fn output_flag_rejected_for_library() {
        let options = BuildOptions {
            output: Some("out".into()),
            dry_run: true,
            ..Default::default()
        };
        let (result, _) = run(options, android_sdks(), vec![package("pkg", "example/pkg", &[])]);
        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::Resolving);
        assert!(matches!(err.source, BuildError::Config(_)));
        assert_eq!(
            err.to_string(),
            "build: resolving: configuration error: cannot set -o when building non-main package"
        );
    }

    #[test]
    fn project_output_dir_allowed_for_library() {
        let options = BuildOptions {
            output_dir: Some("out".into()),
            target: "android/arm".into(),
            dry_run: true,
            ..Default::default()
        };
        let (result, transcript) =
            run(options, android_sdks(), vec![package("pkg", "example/pkg", &[])]);
        assert!(result.unwrap().bundle.is_none());
        assert!(transcript.ends_with("go build example/pkg\n"));
    }

    #[test]
    fn project_output_dir_roots_the_bundle() {
        let options = BuildOptions {
            output_dir: Some("out".into()),
            target: "android/arm64".into(),
            exe: true,
            dry_run: true,
            ..Default::default()
        };
        let (result, transcript) =
            run(options, android_sdks(), vec![package("main", "example/pkg", &["fmt"])]);
        assert_eq!(
            result.unwrap().bundle.unwrap().path(),
            Path::new("out/android/app")
        );
        assert!(transcript.contains("-o=out/android/app/arm64-v8a/pkg example/pkg"));
    }

    #[test]
    fn runnable_program_needs_runtime_import() {
        let options = BuildOptions {
            dry_run: true,
            ..Default::default()
        };
        let (result, transcript) =
            run(options, android_sdks(), vec![package("main", "example/pkg", &["fmt"])]);
        let err = result.unwrap_err();
        assert!(matches!(err.source, BuildError::MissingRuntimeImport { .. }));
        assert_eq!(transcript, "");
    }

    #[test]
    fn executables_skip_runtime_check() {
        let options = BuildOptions {
            target: "android/arm64".into(),
            exe: true,
            dry_run: true,
            ..Default::default()
        };
        let (result, transcript) =
            run(options, android_sdks(), vec![package("main", "example/pkg", &["fmt"])]);
        let report = result.unwrap();
        assert_eq!(
            report.bundle.unwrap().path(),
            Path::new("build/android/app")
        );
        assert!(transcript.contains("-o=build/android/app/arm64-v8a/pkg example/pkg"));
        assert!(!transcript.contains("-buildmode"));
    }

    #[test]
    fn library_package_is_compiled_for_each_arch() {
        let options = BuildOptions {
            target: "android/arm,android/386".into(),
            dry_run: true,
            ..Default::default()
        };
        let (result, transcript) =
            run(options, android_sdks(), vec![package("pkg", "example/pkg", &[])]);
        let report = result.unwrap();
        assert!(report.bundle.is_none());
        let builds: Vec<&str> = transcript.lines().filter(|l| l.contains(" go build")).collect();
        assert_eq!(builds.len(), 2);
        assert!(builds[0].contains("GOARCH=arm "));
        assert!(builds[1].contains("GOARCH=386 "));
        assert!(builds.iter().all(|l| l.ends_with("go build example/pkg")));
    }

    #[test]
    fn ios_without_xcode_fails_before_compiling() {
        let options = BuildOptions {
            target: "ios".into(),
            dry_run: true,
            ..Default::default()
        };
        let (result, transcript) = run(
            options,
            HostSdks::default(),
            vec![package("main", "example/pkg", &["golang.org/x/mobile/app"])],
        );
        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::Resolving);
        assert!(matches!(err.source, BuildError::ToolchainUnavailable(_)));
        assert!(!transcript.contains("go build"));
    }

    #[test]
    fn android_without_ndk_is_sdk_not_found() {
        let options = BuildOptions {
            dry_run: true,
            ..Default::default()
        };
        let (result, _) = run(
            options,
            HostSdks::default(),
            vec![package("main", "example/pkg", &["golang.org/x/mobile/app"])],
        );
        assert!(matches!(
            result.unwrap_err().source,
            BuildError::SdkNotFound(_)
        ));
    }

    #[test]
    fn test_command_rejects_ios() {
        let options = BuildOptions {
            target: "ios/arm64".into(),
            dry_run: true,
            ..Default::default()
        };
        let shell = Shell::new(true, false).with_output(Transcript::new());
        let sdks = HostSdks::default();
        let loader = FixedLoader(vec![]);
        let err = Orchestrator::new(&options, &shell, &sdks, &loader)
            .run_test("example/pkg")
            .unwrap_err();
        assert!(matches!(err.source, BuildError::InvalidTarget { .. }));
    }

    #[test]
    fn test_command_writes_pie_binaries() {
        let options = BuildOptions {
            target: "android/amd64".into(),
            dry_run: true,
            ..Default::default()
        };
        let transcript = Transcript::new();
        let shell = Shell::new(true, false).with_output(transcript.clone());
        let sdks = android_sdks();
        let loader = FixedLoader(vec![package("pkg", "example/pkg", &[])]);
        let report = Orchestrator::new(&options, &shell, &sdks, &loader)
            .run_test("example/pkg")
            .unwrap();
        assert_eq!(report.bundle.unwrap().archs(), vec![Arch::Amd64]);
        assert!(transcript.contents().contains(
            "$NDK_PATH/toolchains/llvm/prebuilt/linux-x86_64/bin/x86_64-linux-android21-clang"
        ));
        assert!(transcript.contents().contains(
            "go test -c -buildmode=pie -o=build/android/test/x86_64/pkg example/pkg"
        ));
    }

    #[test]
    fn bind_flags_are_os_specific() {
        let options = BuildOptions {
            target: "android".into(),
            prefix: Some("Foo".into()),
            dry_run: true,
            ..Default::default()
        };
        let shell = Shell::new(true, false).with_output(Transcript::new());
        let sdks = android_sdks();
        let loader = FixedLoader(vec![]);
        let err = Orchestrator::new(&options, &shell, &sdks, &loader)
            .run_bind(&[])
            .unwrap_err();
        assert_eq!(err.stage, Stage::Parsing);
        assert!(matches!(err.source, BuildError::Config(_)));
    }

    #[test]
    fn install_dry_run_pushes_first_arch() {
        let options = BuildOptions {
            target: "android/arm64,android/amd64".into(),
            dry_run: true,
            ..Default::default()
        };
        let transcript = Transcript::new();
        let shell = Shell::new(true, false).with_output(transcript.clone());
        let sdks = android_sdks();
        let loader = FixedLoader(vec![package("main", "example/basic", &["fmt"])]);
        let report = Orchestrator::new(&options, &shell, &sdks, &loader)
            .run_install("example/basic")
            .unwrap();
        assert_eq!(report.command, Command::Install);
        let contents = transcript.contents();
        assert!(contents.contains("adb shell getprop ro.product.cpu.abi\n"));
        assert!(contents.ends_with(
            "adb push build/android/app/arm64-v8a/basic /data/local/tmp/basic\n"
        ));
    }
}
