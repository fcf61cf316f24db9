//! Queries against the host Go installation and the mobuild cache directory.

use std::env;
use std::path::PathBuf;

use crate::shell::{Shell, ToolCommand};
use crate::types::BuildError;

/// Oldest Go release with the module and build-mode support mobuild relies on.
pub const MIN_GO_MINOR: u32 = 16;

/// Runs `go version` and returns the trimmed output line.
pub fn go_version(shell: &Shell, go: &str) -> Result<String, BuildError> {
    let stdout = shell
        .query(&ToolCommand::new(go).arg("version").description("go version"))
        .map_err(|e| BuildError::ToolchainUnavailable(format!("Go is not available: {}", e)))?;
    Ok(stdout.trim().to_string())
}

/// Fails unless `go version` reports Go 1.16 or newer.
///
/// Development builds (`devel ...`) are accepted.
pub fn check_go_version(shell: &Shell, go: &str) -> Result<String, BuildError> {
    let line = go_version(shell, go)?;
    match parse_go_release(&line) {
        Some((1, minor)) if minor < MIN_GO_MINOR => Err(BuildError::ToolchainUnavailable(format!(
            "Go 1.{} or newer is required, found {:?}",
            MIN_GO_MINOR, line
        ))),
        _ => Ok(line),
    }
}

/// Extracts `(major, minor)` from `go version go1.21.3 linux/amd64`.
fn parse_go_release(line: &str) -> Option<(u32, u32)> {
    let release = line.split_whitespace().nth(2)?.strip_prefix("go")?;
    let mut parts = release.split(|c: char| !c.is_ascii_digit());
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// First entry of `go env GOPATH`.
pub fn gopath(shell: &Shell, go: &str) -> Result<PathBuf, BuildError> {
    let stdout = shell.query(
        &ToolCommand::new(go)
            .args(["env", "GOPATH"])
            .description("go env GOPATH"),
    )?;
    env::split_paths(stdout.trim())
        .find(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| BuildError::Config("GOPATH is not set".to_string()))
}

/// Cache directory: `MOBUILD_CACHE`, else `<GOPATH>/pkg/mobuild`.
pub fn cache_dir(shell: &Shell, go: &str) -> Result<PathBuf, BuildError> {
    if let Some(dir) = env::var_os("MOBUILD_CACHE").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    Ok(gopath(shell, go)?.join("pkg").join("mobuild"))
}

/// Removes the cache directory.
pub fn clean(shell: &Shell, go: &str) -> Result<PathBuf, BuildError> {
    let dir = cache_dir(shell, go)?;
    shell.echo(&format!("MOBUILD={}", dir.display()));
    shell.remove_all(&dir)?;
    Ok(dir)
}

/// Returns true if `gobind` can be started. Its exit status is ignored.
pub fn gobind_available(shell: &Shell, gobind: &str) -> bool {
    match shell.query(&ToolCommand::new(gobind).arg("-help").description("gobind")) {
        Ok(_) => true,
        Err(BuildError::Tool(failure)) => !failure.status.starts_with("could not start"),
        Err(_) => false,
    }
}
