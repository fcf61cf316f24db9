//! `mobuild`: build and bind Go packages for Android and iOS.
//!
//! Parses the command line, layers it over `mobuild.toml`, and hands an
//! immutable [`BuildOptions`] to the `mobuild-sdk` orchestrator.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mobuild_sdk::{
    BuildOptions, BuildReport, Bundle, GoListLoader, HostSdks, Orchestrator, PipelineError, Shell,
    gotool,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub mod config;

use config::{CONFIG_FILE_NAME, MobuildConfig};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "MOBUILD_LOG";

/// Orchestrates Go toolchains, gobind and the platform SDKs to produce mobile bundles.
#[derive(Parser, Debug)]
#[command(name = "mobuild", author, version, about = "Build and bind Go packages for Android and iOS", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile an app package into Android libraries or an iOS archive.
    Build {
        #[command(flatten)]
        args: BuildArgs,
        #[arg(default_value = ".", help = "Go package to build")]
        package: String,
    },
    /// Build the package's tests as Android executables.
    Test {
        #[command(flatten)]
        args: BuildArgs,
        #[arg(default_value = ".")]
        package: String,
    },
    /// Generate language bindings and package them as an .aar or .framework.
    Bind {
        #[command(flatten)]
        args: BuildArgs,
        #[arg(help = "Go packages to bind (default: the current directory)")]
        packages: Vec<String>,
    },
    /// Build an Android executable and push it to the connected device.
    Install {
        #[command(flatten)]
        args: BuildArgs,
        #[arg(default_value = ".")]
        package: String,
    },
    /// Remove the mobuild cache directory.
    Clean {
        #[command(flatten)]
        shell: ShellArgs,
    },
    /// Check the host toolchain and write a starter mobuild.toml.
    Init {
        #[command(flatten)]
        shell: ShellArgs,
    },
    /// Print the mobuild and Go versions.
    Version,
}

/// Flags controlling what is executed and echoed.
#[derive(Args, Debug, Clone, Default)]
struct ShellArgs {
    #[arg(short = 'v', help = "Verbose output")]
    verbose: bool,
    #[arg(short = 'n', help = "Print the commands but do not run them")]
    dry_run: bool,
    #[arg(short = 'x', help = "Print the commands")]
    print_commands: bool,
}

/// Flags shared by build, test, bind and install.
#[derive(Args, Debug, Clone, Default)]
struct BuildArgs {
    #[command(flatten)]
    shell: ShellArgs,
    #[arg(
        long,
        help = "Comma-separated targets, e.g. android/arm,android/386 or ios (default: android)"
    )]
    target: Option<String>,
    #[arg(short = 'o', long = "output", help = "Output path")]
    output: Option<PathBuf>,
    #[arg(long, help = "Product name (build, test and install)")]
    name: Option<String>,
    #[arg(long, help = "Keep the temporary work directory")]
    work: bool,
    #[arg(short = 'a', help = "Force rebuilding of packages that are already up-to-date")]
    force_rebuild: bool,
    #[arg(short = 'i', help = "Install the dependencies of the target")]
    install_deps: bool,
    #[arg(long, value_delimiter = ',', help = "Build tags")]
    tags: Vec<String>,
    #[arg(long, allow_hyphen_values = true, help = "Arguments passed to go tool compile")]
    gcflags: Option<String>,
    #[arg(long, allow_hyphen_values = true, help = "Arguments passed to go tool link")]
    ldflags: Option<String>,
    #[arg(long, help = "Remove file system paths from the resulting binaries")]
    trimpath: bool,
    #[arg(long = "androidapi", help = "Minimum Android API level (default: 16)")]
    android_api: Option<u32>,
    #[arg(long = "iosversion", help = "Minimum iOS version (default: 7.0)")]
    ios_version: Option<String>,
    #[arg(long = "bundleid", help = "iOS framework bundle identifier prefix")]
    bundle_id: Option<String>,
    #[arg(long, help = "Build Android executables instead of shared libraries")]
    exe: bool,
    #[arg(long = "javapkg", help = "Java package prefix for generated bindings (android)")]
    java_pkg: Option<String>,
    #[arg(long, help = "Objective-C name prefix for generated bindings (ios)")]
    prefix: Option<String>,
    #[arg(long, help = "Timeout in seconds for each external tool invocation")]
    timeout: Option<u64>,
    #[arg(long, help = "Path to mobuild.toml (default: discovered upwards)")]
    config: Option<PathBuf>,
}

impl BuildArgs {
    /// Layers the flags over `base`, which already carries file values.
    fn apply(&self, base: BuildOptions) -> BuildOptions {
        BuildOptions {
            target: self.target.clone().unwrap_or(base.target),
            output: self.output.clone().or(base.output),
            name: self.name.clone().or(base.name),
            verbose: self.shell.verbose,
            dry_run: self.shell.dry_run,
            print_commands: self.shell.print_commands,
            keep_work: self.work,
            force_rebuild: self.force_rebuild,
            install_deps: self.install_deps,
            trimpath: self.trimpath || base.trimpath,
            tags: if self.tags.is_empty() {
                base.tags
            } else {
                self.tags.clone()
            },
            gcflags: self.gcflags.clone().or(base.gcflags),
            ldflags: self.ldflags.clone().or(base.ldflags),
            android_api: self.android_api.unwrap_or(base.android_api),
            ios_version: self.ios_version.clone().unwrap_or(base.ios_version),
            bundle_id: self.bundle_id.clone().or(base.bundle_id),
            exe: self.exe,
            java_pkg: self.java_pkg.clone(),
            prefix: self.prefix.clone(),
            timeout: self.timeout.map(Duration::from_secs).or(base.timeout),
            ..base
        }
    }

    fn options(&self) -> Result<BuildOptions> {
        let config = load_config(self.config.as_deref())?;
        Ok(self.apply(config.base_options()))
    }
}

fn load_config(explicit: Option<&Path>) -> Result<MobuildConfig> {
    if let Some(path) = explicit {
        return MobuildConfig::load_from_file(path);
    }
    match MobuildConfig::discover()? {
        Some((config, path)) => {
            tracing::debug!(path = %path.display(), "loaded configuration");
            Ok(config)
        }
        None => Ok(MobuildConfig::default()),
    }
}

/// Entry point for the `mobuild` binary.
pub fn run() -> ExitCode {
    load_dotenv();
    let cli = Cli::parse();
    let verbose = cli.command.verbose();
    init_tracing(verbose);

    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, verbose);
            ExitCode::FAILURE
        }
    }
}

impl Command {
    fn verbose(&self) -> bool {
        match self {
            Command::Build { args, .. }
            | Command::Test { args, .. }
            | Command::Bind { args, .. }
            | Command::Install { args, .. } => args.shell.verbose,
            Command::Clean { shell } | Command::Init { shell } => shell.verbose,
            Command::Version => false,
        }
    }
}

fn execute(command: Command) -> Result<()> {
    match command {
        Command::Build { args, package } => {
            let options = args.options()?;
            let report = with_orchestrator(&options, |o| o.run_build(&package))?;
            print_report(&report, &options);
        }
        Command::Test { args, package } => {
            let options = args.options()?;
            let report = with_orchestrator(&options, |o| o.run_test(&package))?;
            print_report(&report, &options);
        }
        Command::Bind { args, packages } => {
            let options = args.options()?;
            let report = with_orchestrator(&options, |o| o.run_bind(&packages))?;
            print_report(&report, &options);
        }
        Command::Install { args, package } => {
            let options = args.options()?;
            let report = with_orchestrator(&options, |o| o.run_install(&package))?;
            print_report(&report, &options);
        }
        Command::Clean { shell: flags } => {
            let config = load_config(None)?;
            let shell = Shell::new(flags.dry_run, flags.dry_run || flags.print_commands);
            let dir = gotool::clean(&shell, &config.tools.resolve().go).context("clean")?;
            if !flags.dry_run {
                println!("✓ Removed {}", dir.display());
            }
        }
        Command::Init { shell: flags } => init(&flags)?,
        Command::Version => {
            println!("mobuild version {}", mobuild_sdk::VERSION);
            let config = load_config(None)?;
            let shell = Shell::new(false, false);
            match gotool::go_version(&shell, &config.tools.resolve().go) {
                Ok(line) => println!("{}", line),
                Err(err) => println!("go: {}", err),
            }
        }
    }
    Ok(())
}

/// Discovers host SDKs, loads packages with `go list` and runs `f`.
fn with_orchestrator<F>(options: &BuildOptions, f: F) -> Result<BuildReport, PipelineError>
where
    F: FnOnce(&Orchestrator<'_>) -> Result<BuildReport, PipelineError>,
{
    let shell = Shell::from_options(options);
    let sdks = HostSdks::discover(&options.tools.xcrun);
    tracing::debug!(?sdks, "host SDKs");
    let loader = GoListLoader::new(&shell, &options.tools.go);
    let orchestrator = Orchestrator::new(options, &shell, &sdks, &loader);
    f(&orchestrator)
}

fn print_report(report: &BuildReport, options: &BuildOptions) {
    if options.dry_run {
        return;
    }
    match &report.bundle {
        Some(Bundle::AndroidTree { root, artifacts }) => {
            println!(
                "✓ {} {}: {} artifact(s) under {}",
                report.command,
                report.target,
                artifacts.len(),
                root.display()
            );
        }
        Some(bundle) => {
            println!(
                "✓ {} {}: {}",
                report.command,
                report.target,
                bundle.path().display()
            );
        }
        None => {
            let packages: Vec<&str> = report
                .packages
                .iter()
                .map(|p| p.import_path.as_str())
                .collect();
            println!(
                "✓ {} {}: {} compiled",
                report.command,
                report.target,
                packages.join(", ")
            );
        }
    }
}

fn init(flags: &ShellArgs) -> Result<()> {
    let config = load_config(None)?;
    let shell = Shell::new(flags.dry_run, flags.dry_run || flags.print_commands);
    let tools = config.tools.resolve();

    let go = gotool::check_go_version(&shell, &tools.go).context("init")?;
    println!("Found {}", go);
    if !gotool::gobind_available(&shell, &tools.gobind) {
        println!(
            "warning: {} not found; install it with `go install golang.org/x/mobile/cmd/gobind@latest` before running bind",
            tools.gobind
        );
    }

    let cache = gotool::cache_dir(&shell, &tools.go).context("init")?;
    shell.mkdir(&cache).context("init")?;

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config_path = cwd.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        println!("{} already exists, leaving it untouched", config_path.display());
    } else {
        let project = cwd
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "app".to_string());
        shell
            .write_file(
                &config_path,
                MobuildConfig::generate_starter_toml(&project).as_bytes(),
            )
            .context("init")?;
    }

    if !flags.dry_run {
        println!("\n✓ mobuild initialized (cache: {})", cache.display());
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|expr| EnvFilter::try_new(expr).ok())
        .unwrap_or_else(|| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

/// Prints the one-line diagnostic, plus the failing tool's stderr when verbose.
fn report_error(err: &anyhow::Error, verbose: bool) {
    match err.downcast_ref::<PipelineError>() {
        Some(failure) => {
            eprintln!("mobuild: {}", failure);
            if verbose
                && let Some(tool) = failure.source.tool_failure()
                && !tool.stderr.is_empty()
            {
                eprint!("{}", tool.stderr);
            }
        }
        None => eprintln!("mobuild: {:#}", err),
    }
}

fn load_dotenv() {
    let _ = dotenvy::from_path(Path::new(".env.local"));
}
