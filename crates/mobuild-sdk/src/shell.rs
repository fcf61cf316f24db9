//! Command execution, dry-run and transcript printing.
//!
//! Every external tool and every filesystem mutation the build performs goes
//! through a [`Shell`]. With printing enabled each action is echoed as one
//! transcript line; in dry-run mode it is echoed and nothing else happens.
//! Transcripts are stable across machines because registered directory
//! prefixes are replaced with placeholders such as `$WORK`.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::toolchain::COMPILER_ENV_VARS;
use crate::types::{BuildError, BuildOptions, ToolFailure};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// An external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    dir: Option<PathBuf>,
    description: String,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        Self {
            description: program.clone(),
            program,
            args: Vec::new(),
            env: Vec::new(),
            dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Name used in error messages, e.g. `go build (android/arm)`.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn describe(&self) -> &str {
        &self.description
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Transcript form: `[PWD=<dir> ]<K=V ...> <program> <args...>`.
    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(self.env.len() + self.args.len() + 2);
        if let Some(dir) = &self.dir {
            parts.push(format!("PWD={}", dir.display()));
        }
        parts.extend(self.env.iter().map(|(k, v)| format!("{}={}", k, v)));
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for key in COMPILER_ENV_VARS {
            cmd.env_remove(key);
        }
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// In-memory transcript sink, shareable between a [`Shell`] and its reader.
#[derive(Debug, Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<u8>>>);

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.0.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }
}

impl Write for Transcript {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| io::Error::other("transcript lock poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes, echoes or skips build actions.
pub struct Shell {
    dry_run: bool,
    print: bool,
    out: Mutex<Box<dyn Write + Send>>,
    substitutions: Mutex<Vec<(String, String)>>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("dry_run", &self.dry_run)
            .field("print", &self.print)
            .field("substitutions", &self.substitutions)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Shell {
    /// Creates a shell writing its transcript to stdout.
    pub fn new(dry_run: bool, print: bool) -> Self {
        Self {
            dry_run,
            print,
            out: Mutex::new(Box::new(io::stdout())),
            substitutions: Mutex::new(Vec::new()),
            timeout: None,
        }
    }

    /// Creates a shell configured from `-n`, `-x` and the timeout option.
    pub fn from_options(options: &BuildOptions) -> Self {
        Self::new(options.dry_run, options.print_commands).with_timeout(options.timeout)
    }

    /// Redirects the transcript.
    pub fn with_output(mut self, out: impl Write + Send + 'static) -> Self {
        self.out = Mutex::new(Box::new(out));
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces `prefix` with `placeholder` in every transcript line.
    pub fn substitute(&self, prefix: impl AsRef<Path>, placeholder: impl Into<String>) {
        let prefix = prefix.as_ref().display().to_string();
        if prefix.is_empty() {
            return;
        }
        if let Ok(mut subs) = self.substitutions.lock() {
            subs.push((prefix, placeholder.into()));
            subs.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// True when actions are echoed.
    pub fn prints(&self) -> bool {
        self.print || self.dry_run
    }

    /// Writes a transcript line when printing.
    pub fn echo(&self, line: &str) {
        if !self.prints() {
            return;
        }
        let mut line = line.to_string();
        if let Ok(subs) = self.substitutions.lock() {
            for (prefix, placeholder) in subs.iter() {
                line = line.replace(prefix.as_str(), placeholder);
            }
        }
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", line);
        }
    }

    /// Echoes and runs `cmd`, failing with [`BuildError::Tool`] on non-zero exit.
    pub fn run(&self, cmd: &ToolCommand) -> Result<(), BuildError> {
        self.echo(&cmd.render());
        if self.dry_run {
            tracing::trace!(command = cmd.describe(), "dry run, skipped");
            return Ok(());
        }
        self.execute(cmd).map(|_| ())
    }

    /// Runs `cmd` even in dry-run mode, without echoing, and returns its stdout.
    ///
    /// Used for queries that later steps depend on (`go list`, `go version`).
    pub fn query(&self, cmd: &ToolCommand) -> Result<String, BuildError> {
        self.execute(cmd).map(|output| output.stdout)
    }

    pub fn mkdir(&self, dir: &Path) -> Result<(), BuildError> {
        self.echo(&format!("mkdir -p {}", dir.display()));
        if !self.dry_run {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Removes a file, symlink or directory tree if present.
    pub fn remove_all(&self, path: &Path) -> Result<(), BuildError> {
        self.echo(&format!("rm -r -f \"{}\"", path.display()));
        if self.dry_run {
            return Ok(());
        }
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
            Ok(_) => fs::remove_file(path)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Creates `link` pointing at the relative path `target`.
    pub fn symlink(&self, target: &str, link: &Path) -> Result<(), BuildError> {
        self.echo(&format!("ln -s {} {}", target, link.display()));
        if !self.dry_run {
            make_symlink(Path::new(target), link)?;
        }
        Ok(())
    }

    pub fn copy_file(&self, src: &Path, dst: &Path) -> Result<(), BuildError> {
        self.echo(&format!("cp {} {}", src.display(), dst.display()));
        if !self.dry_run {
            fs::copy(src, dst)?;
        }
        Ok(())
    }

    pub fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), BuildError> {
        self.echo(&format!("write {}", path.display()));
        if !self.dry_run {
            fs::write(path, contents)?;
        }
        Ok(())
    }

    fn execute(&self, cmd: &ToolCommand) -> Result<ToolOutput, BuildError> {
        let started = Instant::now();
        let mut command = cmd.to_command();
        if self.timeout.is_some() {
            own_process_group(&mut command);
        }
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BuildError::Tool(ToolFailure {
                    description: cmd.describe().to_string(),
                    status: format!("could not start {}: {}", cmd.program(), e),
                    stderr: String::new(),
                })
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.timeout {
            None => child.wait()?,
            Some(limit) => match wait_with_deadline(&mut child, started, limit)? {
                Some(status) => status,
                None => {
                    tracing::warn!(command = cmd.describe(), ?limit, "killed after timeout");
                    return Err(BuildError::Timeout {
                        description: cmd.describe().to_string(),
                        timeout: limit,
                    });
                }
            },
        };

        let output = ToolOutput {
            stdout: String::from_utf8_lossy(&stdout.join().unwrap_or_default()).into_owned(),
            stderr: String::from_utf8_lossy(&stderr.join().unwrap_or_default()).into_owned(),
        };
        tracing::debug!(
            command = cmd.describe(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            %status,
            "tool finished"
        );

        if !status.success() {
            return Err(BuildError::Tool(ToolFailure {
                description: cmd.describe().to_string(),
                status: status.to_string(),
                stderr: output.stderr,
            }));
        }
        Ok(output)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Waits for `child`; kills it and returns `None` once `limit` has elapsed.
fn wait_with_deadline(
    child: &mut Child,
    started: Instant,
    limit: Duration,
) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started.elapsed() >= limit {
            kill_tree(child);
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Puts the child in a new process group led by itself, so a timeout can
/// reach the processes it spawns.
#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt as _;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_: &mut Command) {}

/// Kills `child` and everything in its process group.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let killed = Command::new("kill")
            .args(["-s", "KILL", "--", group.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = killed {
            tracing::debug!(error = %e, "could not signal process group");
        }
    }
    let _ = child.kill();
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
