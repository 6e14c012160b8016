//! The recipe contract.
//!
//! A recipe is a unit struct implementing [`Recipe`]: static descriptor data
//! plus lifecycle hooks that are pure functions of a [`RecipeContext`]. The
//! engine (see [`crate::lifecycle`]) owns every side effect and calls the
//! hooks in a fixed order.

use std::collections::BTreeMap;
use std::path::Path;

use kiln_schema::{
    CompatibilityKey, OptionError, OptionSchema, OptionSet, OptionValue, PackageMetadata,
    Requirement, Settings, Sha256Digest, Version,
};
use serde::Deserialize;
use thiserror::Error;

use crate::cmake::Definition;
use crate::host::HostEnvironment;
use crate::io::extract::ArchiveFormat;
use crate::process::CommandSpec;

#[derive(Error, Debug)]
pub enum RecipeError {
    /// The settings/options combination is known not to work.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A recognised option value that is deliberately not supported.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("{recipe} has no source for version {version} (available: {available})")]
    UnknownVersion {
        recipe: String,
        version: String,
        available: String,
    },

    #[error(transparent)]
    Option(#[from] OptionError),

    #[error("Invalid source table for {recipe}: {message}")]
    Sources { recipe: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Static facts about a recipe.
#[derive(Debug, Clone, Copy)]
pub struct RecipeDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub homepage: &'static str,
    pub url: &'static str,
    pub license: &'static str,
    pub topics: &'static [&'static str],
    /// Files shipped with the recipe (patches).
    pub exports: &'static [Export],
}

/// A file embedded in the binary alongside its recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Export {
    pub file: &'static str,
    pub contents: &'static str,
}

impl RecipeDescriptor {
    pub fn export_names(&self) -> Vec<&'static str> {
        self.exports.iter().map(|e| e.file).collect()
    }
}

/// Everything a hook may look at. Built once per invocation.
#[derive(Debug, Clone)]
pub struct RecipeContext {
    pub settings: Settings,
    pub options: OptionSet,
    pub version: Version,
    pub host: HostEnvironment,
}

/// One downloadable source archive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceEntry {
    pub url: String,
    /// Expected digest. An unpinned archive is downloaded fresh every time.
    #[serde(default)]
    pub sha256: Option<Sha256Digest>,
    pub format: ArchiveFormat,
}

/// Version to source archive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceTable {
    #[serde(default)]
    sources: BTreeMap<String, SourceEntry>,
}

impl SourceTable {
    /// Parse the TOML form:
    ///
    /// ```toml
    /// [sources."3.11.4"]
    /// url = "https://..."
    /// sha256 = "..."
    /// format = "tar.gz"
    /// ```
    pub fn parse(recipe: &str, content: &str) -> Result<Self, RecipeError> {
        toml::from_str(content).map_err(|e| RecipeError::Sources {
            recipe: recipe.to_string(),
            message: e.to_string(),
        })
    }

    /// Entry for `version`, compared loosely (`0.4` finds `0.4.0`).
    pub fn get(&self, version: &Version) -> Option<&SourceEntry> {
        self.sources
            .iter()
            .find(|(v, _)| Version::from(v.as_str()) == *version)
            .map(|(_, entry)| entry)
    }

    /// Known versions, oldest first.
    pub fn versions(&self) -> Vec<Version> {
        let mut versions: Vec<Version> =
            self.sources.keys().map(|v| Version::from(v.as_str())).collect();
        versions.sort();
        versions
    }

    /// Add or replace entries from `other`.
    pub fn merge(&mut self, other: SourceTable) {
        self.sources.extend(other.sources);
    }

    /// Entry for `version`, or [`RecipeError::UnknownVersion`].
    pub fn require(&self, recipe: &str, version: &Version) -> Result<&SourceEntry, RecipeError> {
        self.get(version).ok_or_else(|| RecipeError::UnknownVersion {
            recipe: recipe.to_string(),
            version: version.to_string(),
            available: self
                .versions()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// When a patch is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchPhase {
    /// Right after extraction.
    Source,
    /// Just before CMake configure.
    Build,
}

/// A patch shipped with the recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSpec {
    /// File name inside the recipe's export directory.
    pub file: &'static str,
    pub phase: PatchPhase,
    /// Leading path components to strip (`patch -p`).
    pub strip: u32,
}

/// Best-effort post-install cleanup, relative to the package directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupRule {
    RemoveDir(&'static str),
    RemoveGlob(&'static str),
}

/// A host package that must be installed before building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPackage {
    /// Package manager executable (e.g. `apk`).
    pub manager: &'static str,
    /// Arguments after the manager (e.g. `["add", "libexecinfo-dev"]`).
    pub args: &'static [&'static str],
}

impl SystemPackage {
    /// Shell form, with the host's sudo prefix: `sudo -A apk add libexecinfo-dev`.
    pub fn command_line(&self, host: &HostEnvironment) -> String {
        format!("{}{} {}", host.sudo_prefix(), self.manager, self.args.join(" "))
    }

    /// The same command as a [`CommandSpec`].
    pub fn command(&self, host: &HostEnvironment) -> CommandSpec {
        let mut words = host.sudo_prefix().split_whitespace().map(str::to_string);
        match words.next() {
            Some(sudo) => CommandSpec::new(sudo)
                .args(words)
                .arg(self.manager)
                .args(self.args.iter().copied()),
            None => CommandSpec::new(self.manager).args(self.args.iter().copied()),
        }
    }
}

/// A package recipe.
///
/// Hooks have no side effects. Defaults cover recipes that do not need a hook.
pub trait Recipe: Send + Sync {
    fn descriptor(&self) -> &'static RecipeDescriptor;

    /// Declared options with their domains and defaults.
    fn options(&self) -> OptionSchema;

    /// Embedded version to source table.
    fn sources(&self) -> Result<SourceTable, RecipeError>;

    /// Name of the top-level directory inside the source archive.
    fn archive_root(&self, version: &Version) -> String;

    /// Remove options that do not apply to the target.
    fn config_options(&self, _ctx: &RecipeContext, _options: &mut OptionSet) {}

    /// Reject broken settings/options combinations.
    fn configure(&self, _ctx: &RecipeContext) -> Result<(), RecipeError> {
        Ok(())
    }

    fn requirements(&self, _ctx: &RecipeContext) -> Result<Vec<Requirement>, RecipeError> {
        Ok(Vec::new())
    }

    fn system_requirements(&self, _ctx: &RecipeContext) -> Vec<SystemPackage> {
        Vec::new()
    }

    fn patches(&self, _ctx: &RecipeContext) -> Vec<PatchSpec> {
        Vec::new()
    }

    /// Directory under the source tree holding the top-level `CMakeLists.txt`.
    fn cmake_subdir(&self) -> Option<&'static str> {
        None
    }

    /// Recipe-specific `-D` definitions, added after the generic ones.
    fn cmake_definitions(&self, _ctx: &RecipeContext) -> Vec<(String, Definition)> {
        Vec::new()
    }

    /// License files copied from the source root into `licenses/`.
    fn license_files(&self) -> &'static [&'static str] {
        &["LICENSE"]
    }

    fn post_package(&self, _ctx: &RecipeContext) -> Vec<CleanupRule> {
        Vec::new()
    }

    /// Link information for consumers, read from the finished package.
    fn package_info(
        &self,
        ctx: &RecipeContext,
        package_dir: &Path,
    ) -> Result<PackageMetadata, RecipeError>;

    /// Narrow the compatibility key.
    fn package_id(&self, _ctx: &RecipeContext, _key: &mut CompatibilityKey) {}
}

impl std::fmt::Debug for dyn Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.descriptor().name)
            .finish()
    }
}

/// Produce the resolved context for one invocation.
///
/// Order: defaults, `config_options`, overrides, `configure`. An override
/// naming an option that `config_options` removed is dropped with a warning;
/// an override naming an undeclared option is an error.
pub fn resolve_options(
    recipe: &dyn Recipe,
    settings: &Settings,
    overrides: &[(String, OptionValue)],
    version: &Version,
    host: &HostEnvironment,
) -> Result<RecipeContext, RecipeError> {
    let name = recipe.descriptor().name;
    let schema = recipe.options();
    let mut ctx = RecipeContext {
        settings: settings.clone(),
        options: OptionSet::from_schema(&schema),
        version: version.clone(),
        host: host.clone(),
    };

    let mut options = ctx.options.clone();
    recipe.config_options(&ctx, &mut options);

    for (key, value) in overrides {
        if schema.get(key).is_none() {
            return Err(OptionError::Unknown(key.clone()).into());
        }
        if !options.contains(key) {
            tracing::warn!(
                recipe = name,
                option = key.as_str(),
                "Option does not apply to this configuration, ignoring override"
            );
            continue;
        }
        options.set(key, value.clone())?;
    }

    ctx.options = options;
    recipe.configure(&ctx)?;

    tracing::debug!(recipe = name, options = ?ctx.options, "Options resolved");
    Ok(ctx)
}

/// The full compatibility key for `ctx`, narrowed by the recipe.
pub fn compatibility_key(
    recipe: &dyn Recipe,
    ctx: &RecipeContext,
    requires: &[Requirement],
) -> CompatibilityKey {
    let mut key = CompatibilityKey::new(&ctx.settings, &ctx.options, requires);
    recipe.package_id(ctx, &mut key);
    key
}

/// The embedded table, extended by `<recipes_dir>/<name>/sources.toml` when
/// that file exists.
pub fn load_sources(recipe: &dyn Recipe, recipes_dir: &Path) -> Result<SourceTable, RecipeError> {
    let name = recipe.descriptor().name;
    let mut table = recipe.sources()?;
    let local = recipes_dir.join(name).join("sources.toml");
    if local.is_file() {
        tracing::debug!(path = %local.display(), "Merging local source table");
        let content = std::fs::read_to_string(&local)?;
        table.merge(SourceTable::parse(name, &content)?);
    }
    Ok(table)
}
