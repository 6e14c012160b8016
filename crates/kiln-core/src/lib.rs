pub mod cmake;
pub mod host;
pub mod io;
pub mod lifecycle;
pub mod packager;
pub mod patch;
pub mod paths;
pub mod process;
pub mod profile;
pub mod recipe;
pub mod recipes;
pub mod sysreqs;

pub mod reporter;

pub use lifecycle::{PackageReport, Pipeline, PipelineError};
pub use paths::*;
pub use recipe::{Recipe, RecipeContext, RecipeError};
pub use reporter::{NullReporter, Reporter};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("kiln-core/", env!("CARGO_PKG_VERSION"));
