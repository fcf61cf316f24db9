//! Go package loading.
//!
//! The build never interprets Go sources itself; it asks `go list` and keeps
//! the handful of fields it needs.

use serde::Deserialize;

use crate::shell::{Shell, ToolCommand};
use crate::target::Os;
use crate::types::BuildError;

/// A Go package as reported by `go list -json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Package {
    #[serde(default)]
    pub name: String,
    pub import_path: String,
    #[serde(default)]
    pub dir: String,
    /// Transitive dependencies.
    #[serde(default)]
    pub deps: Vec<String>,
    /// Direct imports.
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub error: Option<PackageError>,
}

/// Load error attached to a package by `go list -e`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageError {
    #[serde(default)]
    pub pos: String,
    pub err: String,
}

impl Package {
    pub fn is_main(&self) -> bool {
        self.name == "main"
    }

    /// Last element of the import path.
    pub fn base_name(&self) -> &str {
        self.import_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.import_path)
    }

    /// True if `path` is imported directly or transitively.
    pub fn imports_transitively(&self, path: &str) -> bool {
        self.imports.iter().chain(&self.deps).any(|dep| dep == path)
    }
}

/// Resolves package patterns to packages for a target OS.
pub trait PackageLoader {
    fn load(&self, os: Os, tags: &[String], patterns: &[String]) -> Result<Vec<Package>, BuildError>;
}

/// [`PackageLoader`] backed by `go list -e -json`.
#[derive(Debug)]
pub struct GoListLoader<'a> {
    shell: &'a Shell,
    go: String,
}

impl<'a> GoListLoader<'a> {
    pub fn new(shell: &'a Shell, go: impl Into<String>) -> Self {
        Self {
            shell,
            go: go.into(),
        }
    }
}

impl PackageLoader for GoListLoader<'_> {
    fn load(&self, os: Os, tags: &[String], patterns: &[String]) -> Result<Vec<Package>, BuildError> {
        let mut cmd = ToolCommand::new(&self.go)
            .args(["list", "-e", "-json"])
            .env("GOOS", os.goos())
            .description("go list");
        if !tags.is_empty() {
            cmd = cmd.arg(format!("-tags={}", tags.join(",")));
        }
        let cmd = cmd.args(patterns.iter().cloned());
        let stdout = self
            .shell
            .query(&cmd)
            .map_err(|e| BuildError::PackageResolution(e.to_string()))?;
        decode_packages(&stdout)
    }
}

/// Decodes the concatenated JSON objects `go list -json` prints.
pub fn decode_packages(json: &str) -> Result<Vec<Package>, BuildError> {
    serde_json::Deserializer::from_str(json)
        .into_iter::<Package>()
        .map(|package| package.map_err(BuildError::from))
        .collect()
}

/// Requires exactly one error-free package.
pub fn resolve_single(pattern: &str, packages: Vec<Package>) -> Result<Package, BuildError> {
    let mut packages = packages.into_iter();
    let (Some(package), None) = (packages.next(), packages.next()) else {
        return Err(BuildError::PackageResolution(format!(
            "{:?} must match exactly one package",
            pattern
        )));
    };
    check_errors(std::slice::from_ref(&package))?;
    Ok(package)
}

/// Fails on the first package carrying a load error, or on an empty match.
pub fn check_errors(packages: &[Package]) -> Result<(), BuildError> {
    if packages.is_empty() {
        return Err(BuildError::PackageResolution("no packages matched".into()));
    }
    if let Some((package, error)) = packages
        .iter()
        .find_map(|p| p.error.as_ref().map(|e| (p, e)))
    {
        let location = if error.pos.is_empty() {
            package.import_path.clone()
        } else {
            error.pos.clone()
        };
        return Err(BuildError::PackageResolution(format!(
            "{}: {}",
            location, error.err
        )));
    }
    Ok(())
}
