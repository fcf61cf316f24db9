//! Android bundle assembly.
//!
//! Shared objects and executables are compiled directly into
//! `<o>/android/<section>/<abi>/`, so assembling the tree only guards the
//! result. Bound libraries are packaged as an `.aar` (a zip archive).

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::Assembler;
use super::common::{check_complete, verify_artifacts};
use crate::codegen;
use crate::shell::{Shell, ToolCommand};
use crate::target::TargetSpec;
use crate::toolchain::android_abi;
use crate::types::{BuildArtifact, BuildError, Bundle};

/// Directory under `<o>/android` an artifact lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// `lib/<abi>/lib<name>.so`
    Lib,
    /// `app/<abi>/<name>`
    App,
    /// `test/<abi>/<name>`
    Test,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Lib => "lib",
            Section::App => "app",
            Section::Test => "test",
        }
    }

    fn file_name(&self, name: &str) -> String {
        match self {
            Section::Lib => format!("lib{}.so", name),
            Section::App | Section::Test => name.to_string(),
        }
    }
}

/// Assembles `<o>/android/<section>` from per-ABI artifacts.
#[derive(Debug)]
pub struct AndroidTreeAssembler<'a> {
    shell: &'a Shell,
    root: PathBuf,
    section: Section,
}

impl<'a> AndroidTreeAssembler<'a> {
    pub fn new(shell: &'a Shell, output: &Path, section: Section) -> Self {
        Self {
            shell,
            root: output.join("android").join(section.as_str()),
            section,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of the artifact for `arch`; the runner writes here.
    pub fn artifact_path(&self, arch: crate::target::Arch, name: &str) -> PathBuf {
        self.root
            .join(android_abi(arch).abi)
            .join(self.section.file_name(name))
    }

    /// Removes any previous tree so no stale ABI survives a re-run.
    pub fn prepare(&self) -> Result<(), BuildError> {
        self.shell.remove_all(&self.root)
    }

    /// Best-effort removal of a partially built tree.
    pub fn discard(&self) {
        if self.shell.is_dry_run() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.root)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(root = %self.root.display(), error = %e, "could not remove partial bundle");
        }
    }
}

impl Assembler for AndroidTreeAssembler<'_> {
    fn assemble(
        &self,
        target: &TargetSpec,
        artifacts: &[BuildArtifact],
    ) -> Result<Bundle, BuildError> {
        check_complete(target, artifacts)?;
        verify_artifacts(self.shell, artifacts)?;
        Ok(Bundle::AndroidTree {
            root: self.root.clone(),
            artifacts: artifacts.to_vec(),
        })
    }
}

/// Compiles gobind's Java output and packs it into `classes.jar`.
///
/// Sources under `<work>/java` are passed through an argument file so the
/// transcript does not depend on which files gobind generated.
pub fn compile_java(
    shell: &Shell,
    javac: &str,
    jar: &str,
    work: &Path,
    bootclasspath: &Path,
) -> Result<PathBuf, BuildError> {
    let java_dir = work.join("java");
    let classes = work.join("javac-output");
    let sources_file = work.join("java-sources.txt");
    let classes_jar = work.join("classes.jar");

    let sources = if shell.is_dry_run() {
        Vec::new()
    } else {
        java_sources(&java_dir)?
    };
    shell.write_file(&sources_file, sources.join("\n").as_bytes())?;
    shell.mkdir(&classes)?;
    shell.run(
        &ToolCommand::new(javac)
            .current_dir(&java_dir)
            .args(["-d".to_string(), classes.display().to_string()])
            .args(["-source", "1.8", "-target", "1.8"])
            .arg("-bootclasspath")
            .arg(bootclasspath.display().to_string())
            .arg(format!("@{}", sources_file.display()))
            .description("javac"),
    )?;
    shell.run(
        &ToolCommand::new(jar)
            .arg("cf")
            .arg(classes_jar.display().to_string())
            .arg("-C")
            .arg(classes.display().to_string())
            .arg(".")
            .description("jar"),
    )?;
    Ok(classes_jar)
}

/// Relative paths of every `.java` file under `dir`, sorted.
fn java_sources(dir: &Path) -> Result<Vec<String>, BuildError> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(&path, root, out)?;
            } else if path.extension().is_some_and(|ext| ext == "java") {
                let relative = path.strip_prefix(root).unwrap_or(&path);
                out.push(relative.display().to_string());
            }
        }
        Ok(())
    }
    let mut sources = Vec::new();
    walk(dir, dir, &mut sources)?;
    sources.sort();
    Ok(sources)
}

/// Packs bound libraries and Java classes into an `.aar`.
#[derive(Debug)]
pub struct AarAssembler<'a> {
    shell: &'a Shell,
    path: PathBuf,
    java_package: String,
    min_sdk: u32,
    classes_jar: PathBuf,
}

impl<'a> AarAssembler<'a> {
    pub fn new(
        shell: &'a Shell,
        path: impl Into<PathBuf>,
        java_package: impl Into<String>,
        min_sdk: u32,
        classes_jar: impl Into<PathBuf>,
    ) -> Self {
        Self {
            shell,
            path: path.into(),
            java_package: java_package.into(),
            min_sdk,
            classes_jar: classes_jar.into(),
        }
    }

    fn archive(&self, artifacts: &[BuildArtifact]) -> Result<Vec<u8>, BuildError> {
        let zip_err = |e: zip::result::ZipError| BuildError::Assembly(format!("writing aar: {}", e));
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        let mut add = |name: &str, data: &[u8]| -> Result<(), BuildError> {
            zip.start_file(name, options).map_err(zip_err)?;
            zip.write_all(data)?;
            Ok(())
        };
        add(
            "AndroidManifest.xml",
            codegen::android_manifest(&self.java_package, self.min_sdk)?.as_bytes(),
        )?;
        add("proguard.txt", codegen::proguard_rules()?.as_bytes())?;
        add("classes.jar", &fs::read(&self.classes_jar)?)?;
        add("R.txt", b"")?;
        for artifact in artifacts {
            let entry = format!("jni/{}/libgojni.so", android_abi(artifact.arch).abi);
            add(&entry, &fs::read(&artifact.path)?)?;
        }
        zip.add_directory("res/", options).map_err(zip_err)?;

        Ok(zip.finish().map_err(zip_err)?.into_inner())
    }
}

impl Assembler for AarAssembler<'_> {
    fn assemble(
        &self,
        target: &TargetSpec,
        artifacts: &[BuildArtifact],
    ) -> Result<Bundle, BuildError> {
        check_complete(target, artifacts)?;
        verify_artifacts(self.shell, artifacts)?;
        let bytes = if self.shell.is_dry_run() {
            Vec::new()
        } else {
            self.archive(artifacts)?
        };
        self.shell.remove_all(&self.path)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty())
            && !self.shell.is_dry_run()
        {
            fs::create_dir_all(parent)?;
        }
        self.shell.write_file(&self.path, &bytes)?;
        Ok(Bundle::Aar {
            path: self.path.clone(),
            archs: target.archs().to_vec(),
        })
    }
}

/// `adb shell getprop ro.product.cpu.abi`
pub fn getprop_abi_command(adb: &str) -> ToolCommand {
    ToolCommand::new(adb)
        .args(["shell", "getprop", "ro.product.cpu.abi"])
        .description("adb shell getprop")
}

/// Asks the connected device for its primary ABI.
pub fn device_abi(shell: &Shell, adb: &str) -> Result<String, BuildError> {
    let stdout = shell.query(&getprop_abi_command(adb))?;
    Ok(stdout.trim().to_string())
}

/// Pushes `artifact` to `dest` on the connected device.
pub fn push(shell: &Shell, adb: &str, artifact: &Path, dest: &str) -> Result<(), BuildError> {
    shell.run(
        &ToolCommand::new(adb)
            .arg("push")
            .arg(artifact.display().to_string())
            .arg(dest)
            .description("adb push"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::Transcript;
    use crate::target::{Arch, parse_target};
    use crate::types::ArtifactKind;
    use std::io::Read;

    #[test]
    fn artifact_paths_follow_sections() {
        let shell = Shell::new(true, false);
        let out = Path::new("build");
        assert_eq!(
            AndroidTreeAssembler::new(&shell, out, Section::Lib).artifact_path(Arch::Arm, "asset"),
            PathBuf::from("build/android/lib/armeabi-v7a/libasset.so")
        );
        assert_eq!(
            AndroidTreeAssembler::new(&shell, out, Section::App).artifact_path(Arch::Amd64, "basic"),
            PathBuf::from("build/android/app/x86_64/basic")
        );
        assert_eq!(
            AndroidTreeAssembler::new(&shell, out, Section::Test).artifact_path(Arch::Arm64, "pkg"),
            PathBuf::from("build/android/test/arm64-v8a/pkg")
        );
    }

    #[test]
    fn prepare_removes_stale_abis() {
        let temp = tempfile::tempdir().unwrap();
        let stale = temp.path().join("android/lib/mips");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("libold.so"), b"old").unwrap();

        let shell = Shell::new(false, false);
        let assembler = AndroidTreeAssembler::new(&shell, temp.path(), Section::Lib);
        assembler.prepare().unwrap();
        assert!(!temp.path().join("android/lib").exists());
    }

    #[test]
    fn tree_requires_every_artifact_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        let shell = Shell::new(false, false);
        let assembler = AndroidTreeAssembler::new(&shell, temp.path(), Section::Lib);
        let target = parse_target("android/arm,android/386").unwrap();
        let artifacts: Vec<_> = [Arch::Arm, Arch::X86]
            .into_iter()
            .map(|arch| BuildArtifact {
                arch,
                path: assembler.artifact_path(arch, "asset"),
                kind: ArtifactKind::SharedObject,
            })
            .collect();

        fs::create_dir_all(artifacts[0].path.parent().unwrap()).unwrap();
        fs::write(&artifacts[0].path, b"arm").unwrap();
        assert!(matches!(
            assembler.assemble(&target, &artifacts),
            Err(BuildError::Assembly(_))
        ));

        fs::create_dir_all(artifacts[1].path.parent().unwrap()).unwrap();
        fs::write(&artifacts[1].path, b"x86").unwrap();
        let bundle = assembler.assemble(&target, &artifacts).unwrap();
        assert_eq!(bundle.archs(), vec![Arch::Arm, Arch::X86]);
        assert_eq!(bundle.path(), temp.path().join("android/lib"));
    }

    #[test]
    fn aar_layout_is_fixed() {
        let temp = tempfile::tempdir().unwrap();
        let jar = temp.path().join("classes.jar");
        fs::write(&jar, b"jar").unwrap();
        let so = temp.path().join("libgojni.so");
        fs::write(&so, b"elf").unwrap();

        let transcript = Transcript::new();
        let shell = Shell::new(false, true).with_output(transcript.clone());
        let out = temp.path().join("out/asset.aar");
        let target = parse_target("android/386").unwrap();
        let artifacts = [BuildArtifact {
            arch: Arch::X86,
            path: so,
            kind: ArtifactKind::SharedObject,
        }];
        AarAssembler::new(&shell, &out, "go.asset", 16, &jar)
            .assemble(&target, &artifacts)
            .unwrap();
        let first = fs::read(&out).unwrap();

        let mut archive = zip::ZipArchive::new(fs::File::open(&out).unwrap()).unwrap();
        let names: Vec<String> = archive.file_names().map(String::from).collect();
        let mut sorted = names.clone();
        sorted.sort();
        let mut expected = vec![
            "AndroidManifest.xml",
            "R.txt",
            "classes.jar",
            "jni/x86/libgojni.so",
            "proguard.txt",
            "res/",
        ];
        expected.sort();
        assert_eq!(sorted, expected);

        let mut lib = String::new();
        archive
            .by_name("jni/x86/libgojni.so")
            .unwrap()
            .read_to_string(&mut lib)
            .unwrap();
        assert_eq!(lib, "elf");

        AarAssembler::new(&shell, &out, "go.asset", 16, &jar)
            .assemble(&target, &artifacts)
            .unwrap();
        assert_eq!(fs::read(&out).unwrap(), first);
        assert!(transcript.contents().contains("write "));
    }
}
