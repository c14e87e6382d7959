//! External reference toolchains used as oracles

pub mod compiler;
pub mod runtime;
pub mod version;

pub use compiler::{CompileOutcome, ReferenceCompiler, ReferenceRegistry};
pub use runtime::{ReferenceRuntime, RuntimeCache, RuntimeOutcome};
pub use version::{ReferenceVersion, ReleaseTier, VersionError};
