//! Invocation context.
//!
//! Turns command-line arguments, the optional profile and the host into the
//! inputs a [`Pipeline`] needs.

use anyhow::{Context as _, Result};
use kiln_core::host::HostEnvironment;
use kiln_core::paths::{KilnHome, WorkLayout};
use kiln_core::profile::{Profile, scoped_override};
use kiln_core::recipe::{Recipe, load_sources};
use kiln_core::{Pipeline, recipes};
use kiln_schema::{OptionValue, Settings, Version};
use std::path::PathBuf;

use crate::TargetArgs;

/// Where kiln keeps its files for this run.
#[derive(Debug, Clone)]
pub struct Context {
    pub home: KilnHome,
    pub recipes_dir: PathBuf,
    pub work_dir: PathBuf,
}

impl Context {
    /// Directories given on the command line win over `KILN_HOME`.
    pub fn new(recipes_dir: Option<PathBuf>, work_dir: Option<PathBuf>) -> Result<Self> {
        let home = KilnHome::detect()
            .context("Could not determine the kiln home directory; set KILN_HOME")?;
        Ok(Self {
            recipes_dir: recipes_dir.unwrap_or_else(|| home.recipes_dir()),
            work_dir: work_dir.unwrap_or_else(|| home.work_dir()),
            home,
        })
    }

    /// Look up a built-in recipe by name.
    pub fn recipe(name: &str) -> Result<&'static dyn Recipe> {
        recipes::lookup(name).with_context(|| {
            let known: Vec<&str> = recipes::all().iter().map(|r| r.descriptor().name).collect();
            format!("Unknown recipe '{name}' (available: {})", known.join(", "))
        })
    }

    /// Resolve everything a pipeline for `args` needs.
    pub fn target(&self, args: &TargetArgs) -> Result<Target> {
        let recipe = Self::recipe(&args.recipe)?;
        let name = recipe.descriptor().name;

        let version = match &args.version {
            Some(v) => Version::from(v.as_str()),
            None => load_sources(recipe, &self.recipes_dir)?
                .versions()
                .pop()
                .with_context(|| format!("{name} has no known versions"))?,
        };

        let profile = match &args.profile {
            Some(path) => Profile::from_file(path)
                .with_context(|| format!("Failed to load profile {}", path.display()))?,
            None => Profile::default(),
        };

        let mut settings = Settings::detect_host();
        profile.apply_to(&mut settings)?;
        for raw in &args.settings {
            let (key, value) = raw
                .split_once('=')
                .with_context(|| format!("Expected KEY=VALUE, got '{raw}'"))?;
            settings.set(key.trim(), value.trim())?;
        }

        let mut overrides = profile.options_for(name)?;
        for raw in &args.options {
            if let Some(assignment) = scoped_override(name, raw)? {
                overrides.push(assignment);
            }
        }

        tracing::debug!(recipe = name, %version, overrides = overrides.len(), "Target resolved");
        Ok(Target {
            recipe,
            version,
            settings,
            overrides,
            env: profile.env()?,
            host: HostEnvironment::detect(),
        })
    }

    /// A pipeline for `target`, rooted in this context's directories.
    pub fn pipeline(&self, target: Target) -> Pipeline {
        let name = target.recipe.descriptor().name;
        let layout = WorkLayout::new(&self.work_dir, name, target.version.as_str());
        Pipeline::new(
            target.recipe,
            target.version,
            target.settings,
            target.overrides,
            target.host,
            layout,
        )
        .with_recipes_dir(self.recipes_dir.clone())
        .with_env(target.env)
    }
}

/// One recipe, one version, one configuration.
#[derive(Debug, Clone)]
pub struct Target {
    pub recipe: &'static dyn Recipe,
    pub version: Version,
    pub settings: Settings,
    pub overrides: Vec<(String, OptionValue)>,
    pub env: Vec<(String, String)>,
    pub host: HostEnvironment,
}
