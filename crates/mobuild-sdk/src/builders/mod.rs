//! Per-architecture building and bundle assembly.
//!
//! ## Overview
//!
//! 1. **Compilation** - [`GoRunner`] invokes `go` once per architecture with
//!    the resolved toolchain environment
//! 2. **Assembly** - an [`Assembler`] turns the ordered artifacts into a
//!    [`Bundle`](crate::Bundle)
//!
//! ## Assemblers
//!
//! | Assembler | Target | Output |
//! |-----------|--------|--------|
//! | [`AndroidTreeAssembler`] | Android | `<o>/android/{lib,app,test}/<abi>/...` |
//! | [`AarAssembler`] | Android | `<pkg>.aar` |
//! | [`UniversalArchiveAssembler`] | iOS | `<o>/iOS/lib<name>.a` |
//! | [`FrameworkAssembler`] | iOS | `<Name>.framework` |

pub mod android;
pub mod common;
pub mod ios;

pub use android::{AarAssembler, AndroidTreeAssembler, Section};
pub use common::{BuildMode, GoRunner, build_each};
pub use ios::{FrameworkAssembler, UniversalArchiveAssembler};

use crate::target::TargetSpec;
use crate::types::{BuildArtifact, BuildError, Bundle};

/// Turns one artifact per requested architecture into a bundle.
///
/// Implementations fail with [`BuildError::Assembly`] when `artifacts` does
/// not cover every architecture of `target`, and replace any bundle already
/// present at their output path.
pub trait Assembler {
    fn assemble(
        &self,
        target: &TargetSpec,
        artifacts: &[BuildArtifact],
    ) -> Result<Bundle, BuildError>;
}
