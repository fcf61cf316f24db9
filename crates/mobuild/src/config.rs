//! Configuration file support for mobuild.
//!
//! A `mobuild.toml` keeps per-project defaults so they do not have to be
//! repeated on every invocation. It is searched for in the current directory
//! and then in each parent directory, stopping at a repository root (a
//! directory containing `.git`) or the filesystem root.
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! output_dir = "build"
//! name = "basic"
//!
//! [android]
//! api = 21
//!
//! [ios]
//! version = "12.0"
//! bundle_id = "com.example"
//! bitcode = false
//!
//! [build]
//! tags = ["netgo"]
//! ldflags = "-s"
//! trimpath = true
//! timeout_secs = 600
//!
//! [tools]
//! go = "/usr/local/go/bin/go"
//! ```
//!
//! CLI flags always take precedence over file values, file values over the
//! built-in defaults.

use anyhow::{Context, Result};
use mobuild_sdk::{BuildOptions, Tools};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "mobuild.toml";

/// Root configuration structure for `mobuild.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MobuildConfig {
    pub project: ProjectConfig,
    pub android: AndroidConfig,
    pub ios: IosConfig,
    pub build: BuildConfig,
    pub tools: ToolsConfig,
}

/// Project-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Output directory for build, test and install when `-o` is absent.
    pub output_dir: Option<PathBuf>,

    /// Product name for `build`, `test` and `install`.
    pub name: Option<String>,
}

/// Android-specific configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AndroidConfig {
    /// Minimum Android API level.
    ///
    /// Defaults to 16. ABIs with a higher NDK minimum still use theirs.
    pub api: u32,
}

impl Default for AndroidConfig {
    fn default() -> Self {
        Self { api: 16 }
    }
}

/// iOS-specific configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IosConfig {
    /// Minimum iOS version.
    ///
    /// Defaults to "7.0".
    pub version: String,

    /// Prefix of the framework's `CFBundleIdentifier`.
    pub bundle_id: Option<String>,

    /// Embed bitcode in device builds.
    pub bitcode: bool,
}

impl Default for IosConfig {
    fn default() -> Self {
        Self {
            version: "7.0".to_string(),
            bundle_id: None,
            bitcode: true,
        }
    }
}

/// Flags passed through to the Go toolchain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub tags: Vec<String>,
    pub ldflags: Option<String>,
    pub gcflags: Option<String>,
    pub trimpath: bool,

    /// Per-invocation timeout for external tools. No timeout when unset.
    pub timeout_secs: Option<u64>,
}

/// Program names or paths of the external tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub go: Option<String>,
    pub gobind: Option<String>,
    pub xcrun: Option<String>,
    pub javac: Option<String>,
    pub jar: Option<String>,
    pub adb: Option<String>,
}

impl ToolsConfig {
    /// Configured tools, falling back to the program names on `PATH`.
    pub fn resolve(&self) -> Tools {
        let defaults = Tools::default();
        let pick = |value: &Option<String>, default: String| value.clone().unwrap_or(default);
        Tools {
            go: pick(&self.go, defaults.go),
            gobind: pick(&self.gobind, defaults.gobind),
            xcrun: pick(&self.xcrun, defaults.xcrun),
            javac: pick(&self.javac, defaults.javac),
            jar: pick(&self.jar, defaults.jar),
            adb: pick(&self.adb, defaults.adb),
        }
    }
}

impl MobuildConfig {
    /// Loads configuration from the specified file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: MobuildConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Searches the current directory and its parents for `mobuild.toml`.
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Attempts to find and load configuration starting from `start_dir`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Build options carrying the file's values on top of the defaults.
    ///
    /// The target and every per-invocation flag keep their defaults; the CLI
    /// layers its flags over the result.
    pub fn base_options(&self) -> BuildOptions {
        let defaults = BuildOptions::default();
        BuildOptions {
            output_dir: self.project.output_dir.clone(),
            name: self.project.name.clone(),
            android_api: self.android.api,
            ios_version: self.ios.version.clone(),
            bundle_id: self.ios.bundle_id.clone(),
            bitcode: self.ios.bitcode,
            tags: self.build.tags.clone(),
            ldflags: self.build.ldflags.clone(),
            gcflags: self.build.gcflags.clone(),
            trimpath: self.build.trimpath,
            timeout: self.build.timeout_secs.map(Duration::from_secs),
            tools: self.tools.resolve(),
            ..defaults
        }
    }

    /// Generates a starter configuration file as a formatted TOML string.
    ///
    /// Every value matches the built-in default, so writing the file changes
    /// nothing until it is edited.
    pub fn generate_starter_toml(project_name: &str) -> String {
        format!(
            r#"# mobuild configuration file
# CLI flags override these settings when provided.

[project]
# Output path for build/test (default: build)
# output_dir = "build"

# Product name for build, test and install (default: derived from the package)
# name = "{project_name}"

[android]
# Minimum Android API level (default: 16)
api = 16

[ios]
# Minimum iOS version (default: 7.0)
version = "7.0"

# Framework bundle identifier prefix (optional)
# bundle_id = "com.example"

# Embed bitcode in device builds (default: true)
bitcode = true

[build]
# Go build tags
tags = []

# Extra flags for the Go compiler and linker (optional)
# gcflags = ""
# ldflags = ""

# Strip file system paths from the resulting binaries (default: false)
trimpath = false

# Timeout in seconds for each external tool invocation (optional)
# timeout_secs = 600

[tools]
# Program names or paths of the external tools (default: looked up on PATH)
# go = "go"
# gobind = "gobind"
# xcrun = "xcrun"
# javac = "javac"
# jar = "jar"
# adb = "adb"
"#,
            project_name = project_name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = MobuildConfig::default();
        assert_eq!(config.android.api, 16);
        assert_eq!(config.ios.version, "7.0");
        assert!(config.ios.bitcode);
        assert!(config.build.tags.is_empty());
        assert_eq!(config.base_options(), BuildOptions::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        let toml_content = r#"
[project]
output_dir = "out"
name = "basic"

[android]
api = 21

[ios]
version = "12.0"
bundle_id = "com.example"
bitcode = false

[build]
tags = ["netgo", "debug"]
ldflags = "-s"
trimpath = true
timeout_secs = 90

[tools]
go = "/opt/go/bin/go"
"#;
        std::fs::write(&config_path, toml_content).unwrap();

        let config = MobuildConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.project.output_dir, Some(PathBuf::from("out")));
        assert_eq!(config.android.api, 21);
        assert_eq!(config.ios.version, "12.0");
        assert!(!config.ios.bitcode);

        let options = config.base_options();
        assert_eq!(options.output, None);
        assert_eq!(options.output_dir, Some(PathBuf::from("out")));
        assert_eq!(options.name.as_deref(), Some("basic"));
        assert_eq!(options.android_api, 21);
        assert_eq!(options.bundle_id.as_deref(), Some("com.example"));
        assert_eq!(options.tags, vec!["netgo".to_string(), "debug".to_string()]);
        assert_eq!(options.ldflags.as_deref(), Some("-s"));
        assert!(options.trimpath);
        assert_eq!(options.timeout, Some(Duration::from_secs(90)));
        assert_eq!(options.tools.go, "/opt/go/bin/go");
        assert_eq!(options.tools.gobind, "gobind");
        assert_eq!(options.target, "android");
    }

    #[test]
    fn test_unknown_values_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[android]\napi = \"latest\"\n").unwrap();

        let err = MobuildConfig::load_from_file(&config_path).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse config file"));
    }

    #[test]
    fn test_discover_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "[project]\nname = \"discovered\"\n",
        )
        .unwrap();
        let nested = temp_dir.path().join("cmd").join("basic");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, path) = MobuildConfig::discover_from(&nested).unwrap().unwrap();
        assert_eq!(config.project.name.as_deref(), Some("discovered"));
        assert_eq!(path, temp_dir.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_discover_stops_at_repository_root() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "").unwrap();
        let repo = temp_dir.path().join("repo");
        std::fs::create_dir_all(repo.join(".git")).unwrap();

        let result = MobuildConfig::discover_from(&repo).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_generate_starter_toml() {
        let toml = MobuildConfig::generate_starter_toml("basic");
        assert!(toml.contains("# name = \"basic\""));

        let config: MobuildConfig = toml::from_str(&toml).unwrap();
        assert_eq!(config, MobuildConfig::default());
    }
}
