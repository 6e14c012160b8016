//! Shared data types for kiln recipes.
//!
//! Everything in this crate is plain data: build settings, option schemas,
//! package references, package metadata and compatibility keys. No IO
//! happens here; the engine in `kiln-core` owns all side effects.

pub mod hash;
pub mod info;
pub mod options;
pub mod settings;
pub mod types;

// Re-exports
pub use hash::*;
pub use info::{CompatibilityKey, PackageMetadata};
pub use options::{OptionDecl, OptionDomain, OptionError, OptionSchema, OptionSet, OptionValue};
pub use settings::*;
pub use types::*;
