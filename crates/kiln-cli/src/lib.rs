//! kiln - CMake package recipes
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Builds binary packages of `protoc` and `sentry-native` from upstream
//! source archives.
//!
//! # Architecture
//!
//! - **Typestate Pattern**: a build runs `Pipeline` → `Resolved` → `Planned` →
//!   `Prepared` → `Sourced` → `Built` → `Packaged`, so phases cannot be skipped
//!   or reordered.
//! - **Pure recipes**: recipe hooks only compute; every process launch goes
//!   through a `CommandRunner`, which `--dry-run` swaps for a recorder.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.kiln/
//! ├── cache/      # Downloaded archives (by sha256)
//! ├── logs/       # One build log per invocation
//! ├── recipes/    # Local sources.toml and patch overrides per recipe
//! └── work/       # <name>-<version>/{source,build,package}
//! ```

pub mod cmd;
pub mod ops;
pub mod ui;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "kiln - CMake package recipes")]
pub struct Cli {
    /// Directory with per-recipe patch files and sources.toml
    #[arg(long, global = true, env = "KILN_RECIPES_DIR")]
    pub recipes_dir: Option<PathBuf>,

    /// Root for source, build and package directories
    #[arg(long, global = true, env = "KILN_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List available recipes
    List,
    /// Show a recipe's description and options
    Inspect {
        /// Recipe name
        recipe: String,
    },
    /// Resolve options, requirements and the build plan without building
    Resolve {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Download, build and package a recipe
    Create {
        #[command(flatten)]
        target: TargetArgs,
        /// Stream build output instead of writing it to the log
        #[arg(short, long)]
        verbose: bool,
        /// Fetch and extract sources, but only print the commands
        #[arg(long)]
        dry_run: bool,
    },
}

/// Which recipe to run, and for what configuration.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Recipe name
    pub recipe: String,
    /// Upstream version (default: newest known)
    #[arg(long)]
    pub version: Option<String>,
    /// Profile file with [settings], [options] and [env]
    #[arg(short = 'p', long)]
    pub profile: Option<PathBuf>,
    /// Setting override, e.g. -s compiler.version=16
    #[arg(short = 's', long = "setting", value_name = "KEY=VALUE")]
    pub settings: Vec<String>,
    /// Option override, e.g. -o shared=True or -o sentry-native:backend=none
    #[arg(short = 'o', long = "option", value_name = "[RECIPE:]NAME=VALUE")]
    pub options: Vec<String>,
}
