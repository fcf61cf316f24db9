//! Toolchain environment resolution.
//!
//! Maps an `(os, arch)` pair onto the environment the Go compiler needs to
//! cross-compile cgo code: compiler and archiver paths, sysroot flags and the
//! minimum OS version. The per-architecture facts live in two static tables;
//! [`resolve_env`] combines them with the SDK locations found by
//! [`HostSdks::discover`] and is otherwise pure.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::target::{Arch, Os};
use crate::types::BuildError;

/// NDK prebuilt host directory for the machine mobuild runs on.
#[cfg(target_os = "macos")]
pub const NDK_HOST_TAG: &str = "darwin-x86_64";
#[cfg(target_os = "windows")]
pub const NDK_HOST_TAG: &str = "windows-x86_64";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub const NDK_HOST_TAG: &str = "linux-x86_64";

/// Compiler-selection variables that must never leak from the caller's
/// environment into a cross-compile.
pub const COMPILER_ENV_VARS: &[&str] = &[
    "GOOS",
    "GOARCH",
    "GOARM",
    "CC",
    "CXX",
    "AR",
    "CGO_ENABLED",
    "CGO_CFLAGS",
    "CGO_CXXFLAGS",
    "CGO_CPPFLAGS",
    "CGO_LDFLAGS",
];

/// One row of the Android table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AndroidAbi {
    pub arch: Arch,
    /// `jniLibs` / `lib` directory name.
    pub abi: &'static str,
    /// Prefix of the NDK clang wrapper, completed with `<api>-clang`.
    pub clang_prefix: &'static str,
    /// Lowest API level the NDK ships a wrapper for.
    pub min_api: u32,
}

const ANDROID_ABIS: [AndroidAbi; 4] = [
    AndroidAbi {
        arch: Arch::Arm,
        abi: "armeabi-v7a",
        clang_prefix: "armv7a-linux-androideabi",
        min_api: 16,
    },
    AndroidAbi {
        arch: Arch::Arm64,
        abi: "arm64-v8a",
        clang_prefix: "aarch64-linux-android",
        min_api: 21,
    },
    AndroidAbi {
        arch: Arch::X86,
        abi: "x86",
        clang_prefix: "i686-linux-android",
        min_api: 16,
    },
    AndroidAbi {
        arch: Arch::Amd64,
        abi: "x86_64",
        clang_prefix: "x86_64-linux-android",
        min_api: 21,
    },
];

/// Looks up the Android table row for `arch`. Every `Arch` has one.
pub fn android_abi(arch: Arch) -> &'static AndroidAbi {
    match arch {
        Arch::Arm => &ANDROID_ABIS[0],
        Arch::Arm64 => &ANDROID_ABIS[1],
        Arch::X86 => &ANDROID_ABIS[2],
        Arch::Amd64 => &ANDROID_ABIS[3],
    }
}

/// Maps an Android ABI name (as reported by a device) back to its arch.
pub fn arch_for_abi(abi: &str) -> Option<Arch> {
    ANDROID_ABIS.iter().find(|row| row.abi == abi).map(|row| row.arch)
}

/// Apple platform SDKs relevant for iOS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppleSdk {
    IPhoneOs,
    IPhoneSimulator,
}

impl AppleSdk {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppleSdk::IPhoneOs => "iphoneos",
            AppleSdk::IPhoneSimulator => "iphonesimulator",
        }
    }
}

/// One row of the iOS table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppleArch {
    pub arch: Arch,
    /// Architecture name understood by clang `-arch` and `lipo`.
    pub lipo_arch: &'static str,
    pub sdk: AppleSdk,
    pub min_version_flag: &'static str,
    /// Whether `-fembed-bitcode` applies when bitcode is enabled.
    pub bitcode: bool,
}

const APPLE_ARCHS: [AppleArch; 3] = [
    AppleArch {
        arch: Arch::Arm,
        lipo_arch: "armv7",
        sdk: AppleSdk::IPhoneOs,
        min_version_flag: "-miphoneos-version-min",
        bitcode: true,
    },
    AppleArch {
        arch: Arch::Arm64,
        lipo_arch: "arm64",
        sdk: AppleSdk::IPhoneOs,
        min_version_flag: "-miphoneos-version-min",
        bitcode: true,
    },
    AppleArch {
        arch: Arch::Amd64,
        lipo_arch: "x86_64",
        sdk: AppleSdk::IPhoneSimulator,
        min_version_flag: "-mios-simulator-version-min",
        bitcode: false,
    },
];

/// Looks up the iOS table row for `arch`; `None` for `386`.
pub fn apple_arch(arch: Arch) -> Option<&'static AppleArch> {
    APPLE_ARCHS.iter().find(|row| row.arch == arch)
}

/// Tool locations inside one Apple SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkPaths {
    pub clang: PathBuf,
    pub clangxx: PathBuf,
    pub ar: PathBuf,
    pub sysroot: PathBuf,
}

/// The Apple SDKs an iOS build needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppleSdks {
    pub iphoneos: SdkPaths,
    pub iphonesimulator: SdkPaths,
}

impl AppleSdks {
    pub fn get(&self, sdk: AppleSdk) -> &SdkPaths {
        match sdk {
            AppleSdk::IPhoneOs => &self.iphoneos,
            AppleSdk::IPhoneSimulator => &self.iphonesimulator,
        }
    }
}

/// SDK locations discovered on the host, once per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSdks {
    pub android_home: Option<PathBuf>,
    pub ndk: Option<PathBuf>,
    pub ndk_host_tag: String,
    pub apple: Option<AppleSdks>,
}

impl Default for HostSdks {
    fn default() -> Self {
        Self {
            android_home: None,
            ndk: None,
            ndk_host_tag: NDK_HOST_TAG.to_string(),
            apple: None,
        }
    }
}

impl HostSdks {
    /// Discovers SDKs from the environment.
    ///
    /// - Android SDK: `ANDROID_HOME`, then `ANDROID_SDK_ROOT`
    /// - NDK: `ANDROID_NDK_HOME`, then `$ANDROID_HOME/ndk-bundle`, then the
    ///   highest `$ANDROID_HOME/ndk/<version>`
    /// - Apple SDKs: only on macOS, via `xcrun`
    pub fn discover(xcrun: &str) -> Self {
        let android_home = env_path("ANDROID_HOME").or_else(|| env_path("ANDROID_SDK_ROOT"));
        let ndk = env_path("ANDROID_NDK_HOME")
            .or_else(|| android_home.as_deref().and_then(find_ndk_in_sdk));
        let apple = if cfg!(target_os = "macos") {
            discover_apple(xcrun)
        } else {
            None
        };
        tracing::debug!(?android_home, ?ndk, apple = apple.is_some(), "discovered host SDKs");
        Self {
            android_home,
            ndk,
            ndk_host_tag: NDK_HOST_TAG.to_string(),
            apple,
        }
    }

    /// Returns the NDK root or [`BuildError::SdkNotFound`].
    pub fn ndk_root(&self) -> Result<&Path, BuildError> {
        self.ndk.as_deref().ok_or_else(|| {
            BuildError::SdkNotFound(
                "no Android NDK found; set ANDROID_NDK_HOME or install the NDK under $ANDROID_HOME"
                    .to_string(),
            )
        })
    }

    /// Returns the Android SDK root or [`BuildError::SdkNotFound`].
    pub fn android_home(&self) -> Result<&Path, BuildError> {
        self.android_home.as_deref().ok_or_else(|| {
            BuildError::SdkNotFound("ANDROID_HOME is not set".to_string())
        })
    }

    /// Returns the Apple SDKs or [`BuildError::ToolchainUnavailable`].
    pub fn apple(&self) -> Result<&AppleSdks, BuildError> {
        self.apple.as_ref().ok_or_else(|| {
            BuildError::ToolchainUnavailable("-target=ios requires Xcode".to_string())
        })
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Finds an NDK inside an Android SDK root.
pub fn find_ndk_in_sdk(android_home: &Path) -> Option<PathBuf> {
    let bundle = android_home.join("ndk-bundle");
    if bundle.is_dir() {
        return Some(bundle);
    }
    let mut versions: Vec<(Vec<u32>, PathBuf)> = fs::read_dir(android_home.join("ndk"))
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            (version_key(&name), entry.path())
        })
        .collect();
    versions.sort();
    versions.pop().map(|(_, path)| path)
}

fn version_key(name: &str) -> Vec<u32> {
    name.split('.').map(|part| part.parse().unwrap_or(0)).collect()
}

fn discover_apple(xcrun: &str) -> Option<AppleSdks> {
    Some(AppleSdks {
        iphoneos: discover_sdk(xcrun, AppleSdk::IPhoneOs)?,
        iphonesimulator: discover_sdk(xcrun, AppleSdk::IPhoneSimulator)?,
    })
}

fn discover_sdk(xcrun: &str, sdk: AppleSdk) -> Option<SdkPaths> {
    let query = |args: &[&str]| -> Option<PathBuf> {
        let output = Command::new(xcrun)
            .arg("--sdk")
            .arg(sdk.as_str())
            .args(args)
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!text.is_empty()).then(|| PathBuf::from(text))
    };
    Some(SdkPaths {
        clang: query(&["--find", "clang"])?,
        clangxx: query(&["--find", "clang++"])?,
        ar: query(&["--find", "ar"])?,
        sysroot: query(&["--show-sdk-path"])?,
    })
}

/// Options the resolver depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainSettings {
    pub android_api: u32,
    pub ios_version: String,
    pub bitcode: bool,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            android_api: 16,
            ios_version: "7.0".to_string(),
            bitcode: true,
        }
    }
}

/// Fully resolved cross-compilation environment for one architecture.
///
/// Computed once per architecture and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainEnv {
    pub os: Os,
    pub arch: Arch,
    pub compiler: PathBuf,
    pub cxx_compiler: PathBuf,
    pub archiver: PathBuf,
    pub sysroot_flags: Vec<String>,
    /// API level for Android, iOS deployment target for iOS.
    pub min_os_version: String,
    pub extra_cflags: Vec<String>,
    pub extra_ldflags: Vec<String>,
    /// Android ABI directory name, or the `lipo` architecture name on iOS.
    pub abi: &'static str,
}

impl ToolchainEnv {
    /// Environment variables for the compiler invocation, in a fixed order.
    pub fn vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("GOOS".to_string(), self.os.goos().to_string()),
            ("GOARCH".to_string(), self.arch.as_str().to_string()),
        ];
        if self.arch == Arch::Arm {
            vars.push(("GOARM".to_string(), "7".to_string()));
        }
        vars.push(("CC".to_string(), self.compiler.display().to_string()));
        vars.push(("CXX".to_string(), self.cxx_compiler.display().to_string()));
        vars.push(("AR".to_string(), self.archiver.display().to_string()));

        let cflags = self.cflags();
        if !cflags.is_empty() {
            vars.push(("CGO_CFLAGS".to_string(), cflags.join(" ")));
            vars.push(("CGO_CXXFLAGS".to_string(), cflags.join(" ")));
        }
        let ldflags = self.ldflags();
        if !ldflags.is_empty() {
            vars.push(("CGO_LDFLAGS".to_string(), ldflags.join(" ")));
        }
        vars.push(("CGO_ENABLED".to_string(), "1".to_string()));
        vars
    }

    fn cflags(&self) -> Vec<String> {
        self.sysroot_flags
            .iter()
            .chain(&self.extra_cflags)
            .cloned()
            .collect()
    }

    fn ldflags(&self) -> Vec<String> {
        self.sysroot_flags
            .iter()
            .chain(&self.extra_ldflags)
            .cloned()
            .collect()
    }
}

/// Resolves the toolchain environment for `(os, arch)`.
///
/// # Errors
///
/// - [`BuildError::SdkNotFound`] for Android without an NDK
/// - [`BuildError::ToolchainUnavailable`] for iOS without Xcode
/// - [`BuildError::InvalidTarget`] for a pair outside the table
pub fn resolve_env(
    os: Os,
    arch: Arch,
    settings: &ToolchainSettings,
    sdks: &HostSdks,
) -> Result<ToolchainEnv, BuildError> {
    match os {
        Os::Android => resolve_android(arch, settings, sdks),
        Os::Ios => resolve_ios(arch, settings, sdks),
    }
}

fn resolve_android(
    arch: Arch,
    settings: &ToolchainSettings,
    sdks: &HostSdks,
) -> Result<ToolchainEnv, BuildError> {
    let ndk = sdks.ndk_root()?;
    let row = android_abi(arch);
    let api = settings.android_api.max(row.min_api);
    let bin = ndk
        .join("toolchains")
        .join("llvm")
        .join("prebuilt")
        .join(&sdks.ndk_host_tag)
        .join("bin");

    Ok(ToolchainEnv {
        os: Os::Android,
        arch,
        compiler: bin.join(format!("{}{}-clang", row.clang_prefix, api)),
        cxx_compiler: bin.join(format!("{}{}-clang++", row.clang_prefix, api)),
        archiver: bin.join("llvm-ar"),
        sysroot_flags: Vec::new(),
        min_os_version: api.to_string(),
        extra_cflags: Vec::new(),
        extra_ldflags: Vec::new(),
        abi: row.abi,
    })
}

fn resolve_ios(
    arch: Arch,
    settings: &ToolchainSettings,
    sdks: &HostSdks,
) -> Result<ToolchainEnv, BuildError> {
    let row = apple_arch(arch).ok_or_else(|| BuildError::InvalidTarget {
        target: format!("ios/{}", arch),
        reason: format!("{} is not supported on ios", arch),
    })?;
    let paths = sdks.apple()?.get(row.sdk);

    let sysroot_flags = vec!["-isysroot".to_string(), paths.sysroot.display().to_string()];
    let mut flags = vec![format!("{}={}", row.min_version_flag, settings.ios_version)];
    if settings.bitcode && row.bitcode {
        flags.push("-fembed-bitcode".to_string());
    }
    flags.push("-arch".to_string());
    flags.push(row.lipo_arch.to_string());

    Ok(ToolchainEnv {
        os: Os::Ios,
        arch,
        compiler: paths.clang.clone(),
        cxx_compiler: paths.clangxx.clone(),
        archiver: paths.ar.clone(),
        sysroot_flags,
        min_os_version: settings.ios_version.clone(),
        extra_cflags: flags.clone(),
        extra_ldflags: flags,
        abi: row.lipo_arch,
    })
}

/// Finds `platforms/android-N/android.jar` with the highest installed N that
/// is at least `api`.
pub fn android_platform(android_home: &Path, api: u32) -> Result<PathBuf, BuildError> {
    let platforms = android_home.join("platforms");
    let entries = fs::read_dir(&platforms).map_err(|e| {
        BuildError::SdkNotFound(format!(
            "no Android platforms in {}: {}",
            platforms.display(),
            e
        ))
    })?;
    let best = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let level: u32 = name.strip_prefix("android-")?.parse().ok()?;
            let jar = entry.path().join("android.jar");
            (level >= api && jar.is_file()).then_some((level, jar))
        })
        .max_by_key(|(level, _)| *level);

    best.map(|(_, jar)| jar).ok_or_else(|| {
        BuildError::SdkNotFound(format!(
            "no android.jar for API level {} or newer in {}",
            api,
            platforms.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sdks() -> HostSdks {
        let sdk = |name: &str| SdkPaths {
            clang: PathBuf::from(format!("{name}-clang")),
            clangxx: PathBuf::from(format!("{name}-clang++")),
            ar: PathBuf::from(format!("{name}-ar")),
            sysroot: PathBuf::from(name),
        };
        HostSdks {
            android_home: Some(PathBuf::from("/sdk")),
            ndk: Some(PathBuf::from("/ndk")),
            ndk_host_tag: "linux-x86_64".into(),
            apple: Some(AppleSdks {
                iphoneos: sdk("iphoneos"),
                iphonesimulator: sdk("iphonesimulator"),
            }),
        }
    }

    fn android(arch: Arch, api: u32) -> ToolchainEnv {
        let settings = ToolchainSettings {
            android_api: api,
            ..Default::default()
        };
        resolve_env(Os::Android, arch, &settings, &fake_sdks()).unwrap()
    }

    fn ios(arch: Arch, bitcode: bool) -> ToolchainEnv {
        let settings = ToolchainSettings {
            bitcode,
            ..Default::default()
        };
        resolve_env(Os::Ios, arch, &settings, &fake_sdks()).unwrap()
    }

    const BIN: &str = "/ndk/toolchains/llvm/prebuilt/linux-x86_64/bin";

    #[test]
    fn android_arm() {
        let env = android(Arch::Arm, 16);
        assert_eq!(env.abi, "armeabi-v7a");
        assert_eq!(
            env.compiler,
            PathBuf::from(format!("{BIN}/armv7a-linux-androideabi16-clang"))
        );
        assert_eq!(
            env.cxx_compiler,
            PathBuf::from(format!("{BIN}/armv7a-linux-androideabi16-clang++"))
        );
        assert_eq!(env.archiver, PathBuf::from(format!("{BIN}/llvm-ar")));
        assert_eq!(env.min_os_version, "16");
        assert!(env.vars().contains(&("GOARM".into(), "7".into())));
    }

    #[test]
    fn android_arm64_raises_api_to_minimum() {
        let env = android(Arch::Arm64, 16);
        assert_eq!(env.abi, "arm64-v8a");
        assert_eq!(
            env.compiler,
            PathBuf::from(format!("{BIN}/aarch64-linux-android21-clang"))
        );
        assert_eq!(env.min_os_version, "21");
    }

    #[test]
    fn android_386() {
        let env = android(Arch::X86, 16);
        assert_eq!(env.abi, "x86");
        assert_eq!(
            env.compiler,
            PathBuf::from(format!("{BIN}/i686-linux-android16-clang"))
        );
        assert!(!env.vars().iter().any(|(k, _)| k == "GOARM"));
    }

    #[test]
    fn android_amd64_keeps_higher_api() {
        let env = android(Arch::Amd64, 29);
        assert_eq!(env.abi, "x86_64");
        assert_eq!(
            env.compiler,
            PathBuf::from(format!("{BIN}/x86_64-linux-android29-clang"))
        );
        assert_eq!(env.min_os_version, "29");
    }

    #[test]
    fn android_vars_order() {
        let keys: Vec<String> = android(Arch::Arm, 16)
            .vars()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(
            keys,
            ["GOOS", "GOARCH", "GOARM", "CC", "CXX", "AR", "CGO_ENABLED"]
        );
    }

    #[test]
    fn ios_arm() {
        let env = ios(Arch::Arm, true);
        assert_eq!(env.abi, "armv7");
        assert_eq!(env.compiler, PathBuf::from("iphoneos-clang"));
        let vars = env.vars();
        assert!(vars.contains(&("GOOS".into(), "darwin".into())));
        assert!(vars.contains(&("GOARM".into(), "7".into())));
        assert!(vars.contains(&(
            "CGO_CFLAGS".into(),
            "-isysroot iphoneos -miphoneos-version-min=7.0 -fembed-bitcode -arch armv7".into()
        )));
    }

    #[test]
    fn ios_arm64() {
        let env = ios(Arch::Arm64, true);
        assert_eq!(env.abi, "arm64");
        assert_eq!(env.sysroot_flags, vec!["-isysroot", "iphoneos"]);
        assert_eq!(
            env.extra_ldflags,
            vec!["-miphoneos-version-min=7.0", "-fembed-bitcode", "-arch", "arm64"]
        );
    }

    #[test]
    fn ios_amd64_uses_simulator_without_bitcode() {
        let env = ios(Arch::Amd64, true);
        assert_eq!(env.abi, "x86_64");
        assert_eq!(env.compiler, PathBuf::from("iphonesimulator-clang"));
        assert_eq!(
            env.extra_cflags,
            vec!["-mios-simulator-version-min=7.0", "-arch", "x86_64"]
        );
    }

    #[test]
    fn ios_bitcode_can_be_disabled() {
        let env = ios(Arch::Arm64, false);
        assert!(!env.extra_cflags.contains(&"-fembed-bitcode".to_string()));
    }

    #[test]
    fn ios_386_is_rejected() {
        let err = resolve_env(Os::Ios, Arch::X86, &ToolchainSettings::default(), &fake_sdks())
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidTarget { .. }));
    }

    #[test]
    fn resolution_is_deterministic() {
        let settings = ToolchainSettings::default();
        let sdks = fake_sdks();
        for os in [Os::Android, Os::Ios] {
            for &arch in os.supported_archs() {
                let first = resolve_env(os, arch, &settings, &sdks).unwrap();
                let second = resolve_env(os, arch, &settings, &sdks).unwrap();
                assert_eq!(first, second);
            }
        }
    }

    #[test]
    fn missing_ndk_is_sdk_not_found() {
        let sdks = HostSdks::default();
        let err = resolve_env(Os::Android, Arch::Arm, &ToolchainSettings::default(), &sdks)
            .unwrap_err();
        assert!(matches!(err, BuildError::SdkNotFound(_)));
    }

    #[test]
    fn missing_xcode_is_toolchain_unavailable() {
        let sdks = HostSdks::default();
        let err = resolve_env(Os::Ios, Arch::Arm64, &ToolchainSettings::default(), &sdks)
            .unwrap_err();
        assert!(matches!(err, BuildError::ToolchainUnavailable(_)));
    }

    #[test]
    fn abi_lookup_round_trips() {
        for &arch in Os::Android.supported_archs() {
            assert_eq!(arch_for_abi(android_abi(arch).abi), Some(arch));
        }
        assert_eq!(arch_for_abi("mips"), None);
    }

    #[test]
    fn finds_highest_ndk_version() {
        let temp = tempfile::tempdir().unwrap();
        for version in ["21.4.7075529", "25.2.9519653", "23.1.7779620"] {
            fs::create_dir_all(temp.path().join("ndk").join(version)).unwrap();
        }
        assert_eq!(
            find_ndk_in_sdk(temp.path()),
            Some(temp.path().join("ndk/25.2.9519653"))
        );

        fs::create_dir_all(temp.path().join("ndk-bundle")).unwrap();
        assert_eq!(
            find_ndk_in_sdk(temp.path()),
            Some(temp.path().join("ndk-bundle"))
        );
    }

    #[test]
    fn picks_android_platform() {
        let temp = tempfile::tempdir().unwrap();
        for level in [15, 28, 30] {
            let dir = temp.path().join(format!("platforms/android-{level}"));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("android.jar"), b"").unwrap();
        }
        fs::create_dir_all(temp.path().join("platforms/android-33")).unwrap();

        assert_eq!(
            android_platform(temp.path(), 16).unwrap(),
            temp.path().join("platforms/android-30/android.jar")
        );
        assert!(matches!(
            android_platform(temp.path(), 31),
            Err(BuildError::SdkNotFound(_))
        ));
    }
}
