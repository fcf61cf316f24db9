//! Target specification parsing.
//!
//! A target string names one mobile OS and the architectures to build for:
//!
//! - `android` / `ios` selects every architecture the OS supports
//! - `android/arm,android/386` selects an explicit, ordered subset
//!
//! All pairs in one string must name the same OS. Architectures keep the
//! order they were given in; repeats collapse onto their first occurrence.

use std::fmt;
use std::str::FromStr;

use crate::types::BuildError;

/// Mobile operating system a bundle is produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Os {
    /// Android (NDK cross-compilers, `.so` per ABI).
    Android,
    /// iOS devices and simulator (Xcode toolchain, universal archives).
    Ios,
}

impl Os {
    /// Returns the name used on the command line (`android`, `ios`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Android => "android",
            Os::Ios => "ios",
        }
    }

    /// Returns the `GOOS` value the Go toolchain expects for this OS.
    pub fn goos(&self) -> &'static str {
        match self {
            Os::Android => "android",
            Os::Ios => "darwin",
        }
    }

    /// Architectures supported for this OS, in the order used for "all".
    pub fn supported_archs(&self) -> &'static [Arch] {
        match self {
            Os::Android => &[Arch::Arm, Arch::Arm64, Arch::X86, Arch::Amd64],
            Os::Ios => &[Arch::Arm, Arch::Arm64, Arch::Amd64],
        }
    }

    /// Returns true if `arch` can be targeted on this OS.
    pub fn supports(&self, arch: Arch) -> bool {
        self.supported_archs().contains(&arch)
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Os {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "android" => Ok(Os::Android),
            "ios" => Ok(Os::Ios),
            other => Err(format!("unsupported os {:?}", other)),
        }
    }
}

/// CPU architecture, named the way `GOARCH` names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    /// 32-bit ARM (`arm`, ARMv7).
    Arm,
    /// 64-bit ARM (`arm64`).
    Arm64,
    /// 32-bit x86 (`386`).
    X86,
    /// 64-bit x86 (`amd64`).
    Amd64,
}

impl Arch {
    /// Returns the `GOARCH` spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::X86 => "386",
            Arch::Amd64 => "amd64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arm" => Ok(Arch::Arm),
            "arm64" => Ok(Arch::Arm64),
            "386" => Ok(Arch::X86),
            "amd64" => Ok(Arch::Amd64),
            other => Err(format!("unsupported arch {:?}", other)),
        }
    }
}

/// A validated target: one OS and a non-empty, duplicate-free, ordered list
/// of architectures that OS supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    os: Os,
    archs: Vec<Arch>,
}

impl TargetSpec {
    /// Every supported architecture of `os`.
    pub fn all(os: Os) -> Self {
        Self {
            os,
            archs: os.supported_archs().to_vec(),
        }
    }

    pub fn os(&self) -> Os {
        self.os
    }

    pub fn archs(&self) -> &[Arch] {
        &self.archs
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .archs
            .iter()
            .map(|arch| format!("{}/{}", self.os, arch))
            .collect();
        f.write_str(&pairs.join(","))
    }
}

impl FromStr for TargetSpec {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_target(s)
    }
}

/// Parses a target string such as `android`, `ios` or `android/arm,android/386`.
///
/// # Errors
///
/// [`BuildError::InvalidTarget`] when the string is empty, names an unknown OS,
/// mixes OSes, or names an architecture the OS does not support.
pub fn parse_target(spec: &str) -> Result<TargetSpec, BuildError> {
    let invalid = |reason: String| BuildError::InvalidTarget {
        target: spec.to_string(),
        reason,
    };

    if spec.trim().is_empty() {
        return Err(invalid("empty target".to_string()));
    }

    let mut os: Option<Os> = None;
    let mut all = false;
    let mut archs: Vec<Arch> = Vec::new();

    for item in spec.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(invalid("empty entry in target list".to_string()));
        }
        let (os_name, arch_name) = match item.split_once('/') {
            Some((os_name, arch_name)) => (os_name, Some(arch_name)),
            None => (item, None),
        };
        let item_os: Os = os_name.parse().map_err(invalid)?;
        match os {
            None => os = Some(item_os),
            Some(first) if first != item_os => {
                return Err(invalid(format!(
                    "cannot target different OSes ({} and {})",
                    first, item_os
                )));
            }
            Some(_) => {}
        }

        let Some(arch_name) = arch_name else {
            all = true;
            continue;
        };
        let arch: Arch = arch_name.parse().map_err(invalid)?;
        if !item_os.supports(arch) {
            return Err(invalid(format!(
                "{} is not supported on {}",
                arch, item_os
            )));
        }
        if !archs.contains(&arch) {
            archs.push(arch);
        }
    }

    // The loop ran at least once, so an OS was recorded.
    let os = os.ok_or_else(|| invalid("empty target".to_string()))?;
    if all {
        return Ok(TargetSpec::all(os));
    }
    Ok(TargetSpec { os, archs })
}
