//! iOS bundle assembly: universal archives and frameworks.
//!
//! Per-architecture static archives are merged with `xcrun lipo`. A single
//! architecture goes through the same merge. Frameworks are laid out from a
//! fixed skeleton so two runs with the same inputs produce the same tree.

use std::fs;
use std::path::{Path, PathBuf};

use super::Assembler;
use super::common::{check_complete, verify_artifacts};
use crate::codegen;
use crate::shell::{Shell, ToolCommand};
use crate::target::{Arch, TargetSpec};
use crate::toolchain::apple_arch;
use crate::types::{BuildArtifact, BuildError, Bundle};

/// Directories created under `Versions/A`, each linked from the top level.
const FRAMEWORK_DIRS: [&str; 3] = ["Headers", "Resources", "Modules"];

/// Merges `artifacts` into `output` with `xcrun lipo`.
///
/// # Errors
///
/// [`BuildError::Merge`] when lipo exits non-zero.
pub fn lipo(
    shell: &Shell,
    xcrun: &str,
    artifacts: &[BuildArtifact],
    output: &Path,
) -> Result<(), BuildError> {
    let mut cmd = ToolCommand::new(xcrun)
        .args(["lipo", "-create"])
        .description("xcrun lipo");
    for artifact in artifacts {
        cmd = cmd
            .arg("-arch")
            .arg(lipo_arch(artifact.arch)?)
            .arg(artifact.path.display().to_string());
    }
    cmd = cmd.arg("-o").arg(output.display().to_string());

    tracing::info!(inputs = artifacts.len(), output = %output.display(), "merging archives");
    shell.run(&cmd).map_err(|e| match e {
        BuildError::Tool(failure) => BuildError::Merge(failure),
        other => other,
    })
}

fn lipo_arch(arch: Arch) -> Result<&'static str, BuildError> {
    apple_arch(arch)
        .map(|row| row.lipo_arch)
        .ok_or_else(|| BuildError::Assembly(format!("{} has no iOS slice", arch)))
}

/// Produces `<o>/iOS/lib<name>.a`.
#[derive(Debug)]
pub struct UniversalArchiveAssembler<'a> {
    shell: &'a Shell,
    xcrun: String,
    path: PathBuf,
}

impl<'a> UniversalArchiveAssembler<'a> {
    pub fn new(shell: &'a Shell, xcrun: impl Into<String>, output: &Path, name: &str) -> Self {
        Self {
            shell,
            xcrun: xcrun.into(),
            path: output.join("iOS").join(format!("lib{}.a", name)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Assembler for UniversalArchiveAssembler<'_> {
    fn assemble(
        &self,
        target: &TargetSpec,
        artifacts: &[BuildArtifact],
    ) -> Result<Bundle, BuildError> {
        check_complete(target, artifacts)?;
        verify_artifacts(self.shell, artifacts)?;
        self.shell.remove_all(&self.path)?;
        if let Some(parent) = self.path.parent() {
            self.shell.mkdir(parent)?;
        }
        lipo(self.shell, &self.xcrun, artifacts, &self.path)?;
        Ok(Bundle::UniversalArchive {
            path: self.path.clone(),
            archs: target.archs().to_vec(),
        })
    }
}

/// Produces a `<Name>.framework` directory.
#[derive(Debug)]
pub struct FrameworkAssembler<'a> {
    shell: &'a Shell,
    xcrun: String,
    path: PathBuf,
    name: String,
    headers: Vec<PathBuf>,
    packages: Vec<String>,
    bundle_id: String,
    min_os_version: String,
}

impl<'a> FrameworkAssembler<'a> {
    /// `path` is the framework directory; its stem names the framework.
    pub fn new(shell: &'a Shell, xcrun: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            shell,
            xcrun: xcrun.into(),
            bundle_id: format!("mobuild.{}", codegen::sanitize_bundle_id_component(&name)),
            path,
            name,
            headers: Vec::new(),
            packages: Vec::new(),
            min_os_version: "7.0".to_string(),
        }
    }

    /// Header files copied into `Headers/`, in order.
    pub fn headers(mut self, headers: Vec<PathBuf>) -> Self {
        self.headers = headers;
        self
    }

    /// Go packages listed in the umbrella header.
    pub fn packages(mut self, packages: Vec<String>) -> Self {
        self.packages = packages;
        self
    }

    /// `CFBundleIdentifier` prefix; the framework name is appended.
    pub fn bundle_id_prefix(mut self, prefix: Option<&str>) -> Self {
        if let Some(prefix) = prefix {
            self.bundle_id = format!(
                "{}.{}",
                prefix,
                codegen::sanitize_bundle_id_component(&self.name)
            );
        }
        self
    }

    pub fn min_os_version(mut self, version: impl Into<String>) -> Self {
        self.min_os_version = version.into();
        self
    }

    fn version_dir(&self) -> PathBuf {
        self.path.join("Versions").join("A")
    }

    fn skeleton(&self) -> Result<(), BuildError> {
        let shell = self.shell;
        shell.remove_all(&self.path)?;
        for dir in FRAMEWORK_DIRS {
            shell.mkdir(&self.version_dir().join(dir))?;
        }
        shell.symlink("A", &self.path.join("Versions").join("Current"))?;
        for dir in FRAMEWORK_DIRS {
            shell.symlink(&format!("Versions/Current/{}", dir), &self.path.join(dir))?;
        }
        shell.symlink(
            &format!("Versions/Current/{}", self.name),
            &self.path.join(&self.name),
        )
    }

    /// Best-effort removal of a partially built framework.
    fn discard(&self) {
        if self.shell.is_dry_run() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "could not remove partial framework");
        }
    }

    fn populate(&self, artifacts: &[BuildArtifact]) -> Result<(), BuildError> {
        self.skeleton()?;
        lipo(
            self.shell,
            &self.xcrun,
            artifacts,
            &self.version_dir().join(&self.name),
        )?;

        let headers_dir = self.version_dir().join("Headers");
        let names = self.header_names()?;
        for (src, name) in self.headers.iter().zip(&names) {
            self.shell.copy_file(src, &headers_dir.join(name))?;
        }
        let umbrella = format!("{}.h", self.name);
        if !names.contains(&umbrella) {
            let contents = codegen::umbrella_header(&self.name, &self.packages, &names)?;
            self.shell
                .write_file(&headers_dir.join(&umbrella), contents.as_bytes())?;
        }

        let plist = codegen::info_plist(&self.name, &self.bundle_id, &self.min_os_version)?;
        self.shell.write_file(
            &self.version_dir().join("Resources").join("Info.plist"),
            plist.as_bytes(),
        )?;
        let modulemap = codegen::module_map(&self.name)?;
        self.shell.write_file(
            &self.version_dir().join("Modules").join("module.modulemap"),
            modulemap.as_bytes(),
        )
    }

    fn header_names(&self) -> Result<Vec<String>, BuildError> {
        self.headers
            .iter()
            .map(|h| {
                h.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| {
                        BuildError::Assembly(format!("header path {} has no file name", h.display()))
                    })
            })
            .collect()
    }
}

impl Assembler for FrameworkAssembler<'_> {
    fn assemble(
        &self,
        target: &TargetSpec,
        artifacts: &[BuildArtifact],
    ) -> Result<Bundle, BuildError> {
        if self.name.is_empty() {
            return Err(BuildError::Assembly(format!(
                "cannot derive a framework name from {}",
                self.path.display()
            )));
        }
        check_complete(target, artifacts)?;
        verify_artifacts(self.shell, artifacts)?;

        if let Err(e) = self.populate(artifacts) {
            self.discard();
            return Err(e);
        }

        Ok(Bundle::Framework {
            path: self.path.clone(),
            archs: target.archs().to_vec(),
        })
    }
}
