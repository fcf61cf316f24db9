//! Dry-run transcripts compared against recorded golden files.

use std::fs;
use std::path::{Path, PathBuf};

use mobuild_sdk::toolchain::{AppleSdks, SdkPaths};
use mobuild_sdk::{
    BuildError, BuildOptions, HostSdks, Orchestrator, Os, Package, PackageLoader, Shell,
    Transcript,
};

struct FixedLoader(Vec<Package>);

impl PackageLoader for FixedLoader {
    fn load(&self, _: Os, _: &[String], _: &[String]) -> Result<Vec<Package>, BuildError> {
        Ok(self.0.clone())
    }
}

fn asset() -> Package {
    Package {
        name: "asset".into(),
        import_path: "golang.org/x/mobile/asset".into(),
        ..Default::default()
    }
}

fn golden(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/testdata")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
}

/// An Android SDK root holding just `platforms/android-16/android.jar`.
fn android_home() -> tempfile::TempDir {
    let home = tempfile::tempdir().unwrap();
    let platform = home.path().join("platforms/android-16");
    fs::create_dir_all(&platform).unwrap();
    fs::write(platform.join("android.jar"), b"").unwrap();
    home
}

fn android_sdks(home: &Path) -> HostSdks {
    HostSdks {
        android_home: Some(home.to_path_buf()),
        ndk: Some(home.join("ndk/25.2.9519653")),
        ndk_host_tag: "linux-x86_64".into(),
        apple: None,
    }
}

fn ios_sdks() -> HostSdks {
    let sdk = |name: &str| SdkPaths {
        clang: PathBuf::from(format!("{name}-clang")),
        clangxx: PathBuf::from(format!("{name}-clang++")),
        ar: PathBuf::from(format!("{name}-ar")),
        sysroot: PathBuf::from(name),
    };
    HostSdks {
        apple: Some(AppleSdks {
            iphoneos: sdk("iphoneos"),
            iphonesimulator: sdk("iphonesimulator"),
        }),
        ..Default::default()
    }
}

fn dry_run_options(target: &str, output: &str) -> BuildOptions {
    BuildOptions {
        target: target.into(),
        output: Some(output.into()),
        dry_run: true,
        print_commands: true,
        ..Default::default()
    }
}

fn bind_transcript(options: &BuildOptions, sdks: &HostSdks) -> String {
    let transcript = Transcript::new();
    let shell = Shell::from_options(options).with_output(transcript.clone());
    let loader = FixedLoader(vec![asset()]);
    Orchestrator::new(options, &shell, sdks, &loader)
        .gopath("/home/gopher/go")
        .run_bind(&["golang.org/x/mobile/asset".to_string()])
        .unwrap_or_else(|e| panic!("bind failed: {e}\n{}", transcript.contents()));
    transcript.contents()
}

#[test]
fn bind_android_default_options() {
    let home = android_home();
    let options = dry_run_options("android/arm", "asset.aar");
    assert_eq!(
        bind_transcript(&options, &android_sdks(home.path())),
        golden("bind_android.golden")
    );
}

#[test]
fn bind_android_with_java_package() {
    let home = android_home();
    let options = BuildOptions {
        java_pkg: Some("com.example.foo".into()),
        ..dry_run_options("android/arm", "asset.aar")
    };
    assert_eq!(
        bind_transcript(&options, &android_sdks(home.path())),
        golden("bind_android_javapkg.golden")
    );
}

#[test]
fn bind_ios_default_options() {
    let options = dry_run_options("ios/arm", "Asset.framework");
    assert_eq!(
        bind_transcript(&options, &ios_sdks()),
        golden("bind_ios.golden")
    );
}

#[test]
fn bind_ios_with_prefix() {
    let options = BuildOptions {
        prefix: Some("Foo".into()),
        ..dry_run_options("ios/arm", "Asset.framework")
    };
    assert_eq!(
        bind_transcript(&options, &ios_sdks()),
        golden("bind_ios_prefix.golden")
    );
}

#[test]
fn build_android_two_abis() {
    let home = android_home();
    let sdks = android_sdks(home.path());
    let options = BuildOptions {
        target: "android/arm,android/386".into(),
        dry_run: true,
        print_commands: true,
        ..Default::default()
    };
    let transcript = Transcript::new();
    let shell = Shell::from_options(&options).with_output(transcript.clone());
    let loader = FixedLoader(vec![Package {
        name: "main".into(),
        import_path: "golang.org/x/mobile/example/basic".into(),
        deps: vec!["golang.org/x/mobile/app".into()],
        ..Default::default()
    }]);

    let report = Orchestrator::new(&options, &shell, &sdks, &loader)
        .run_build("golang.org/x/mobile/example/basic")
        .unwrap();
    assert_eq!(transcript.contents(), golden("build_android.golden"));
    assert_eq!(
        report.bundle.unwrap().path(),
        Path::new("build/android/lib")
    );
    // Nothing is written in dry-run mode.
    assert!(!Path::new("build/android/lib").exists());
}

#[test]
fn transcripts_are_stable_across_runs() {
    let home = android_home();
    let sdks = android_sdks(home.path());
    let options = dry_run_options("android/arm", "asset.aar");
    assert_eq!(
        bind_transcript(&options, &sdks),
        bind_transcript(&options, &sdks)
    );
}
