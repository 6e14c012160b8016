//! Shared plumbing for the commands that run a recipe.

pub mod context;

pub use context::{Context, Target};
