//! Recipe Lifecycle Typestate Pattern
//!
//! Models one recipe invocation as a series of explicit state transitions:
//!
//! ```text
//! Pipeline --[resolve()]--> Resolved --[requirements()]--> Planned
//!   --[system_requirements()]--> Prepared --[acquire()]--> Sourced
//!   --[build()]--> Built --[package()]--> Packaged --[finish()]--> PackageReport
//! ```
//!
//! Every transition consumes the previous state, so a phase can neither run
//! twice nor out of order: system prerequisites are always in place before
//! the build, and nothing is downloaded for a configuration that was rejected.
//!
//! # Usage
//!
//! ```ignore
//! let report = Pipeline::new(recipe, version, settings, overrides, host, layout)
//!     .with_runner(runner)
//!     .resolve()?
//!     .requirements()?
//!     .system_requirements()?
//!     .acquire(&fetcher)
//!     .await?
//!     .build()?
//!     .package()?
//!     .finish()?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_schema::{
    CompatibilityKey, OptionValue, PackageMetadata, PackageName, Requirement, Settings,
    Sha256Digest, Version,
};
use serde::Serialize;
use thiserror::Error;

use crate::cmake::{BuildSession, CMake};
use crate::host::HostEnvironment;
use crate::io::download::{DownloadError, FetchRequest, SourceFetch};
use crate::io::extract::{ExtractError, extract};
use crate::packager::{apply_cleanup, copy_licenses};
use crate::patch::{apply_patches, stage_exports};
use crate::paths::WorkLayout;
use crate::process::{BuildError, CommandRunner, SystemRunner};
use crate::recipe::{
    PatchPhase, PatchSpec, Recipe, RecipeContext, RecipeError, SourceEntry, SystemPackage,
    compatibility_key, load_sources, resolve_options,
};
use crate::reporter::{NullReporter, Reporter};
use crate::sysreqs::{self, SysreqError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Recipe(#[from] RecipeError),

    #[error(transparent)]
    Sysreq(#[from] SysreqError),

    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Source archive has no top-level '{0}' directory")]
    ArchiveLayout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write package metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a finished invocation produced. Also written as JSON to
/// [`WorkLayout::metadata_file`].
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    pub name: PackageName,
    pub version: Version,
    pub requirements: Vec<Requirement>,
    pub compatibility_key: CompatibilityKey,
    /// Digest of `compatibility_key`.
    pub package_id: Sha256Digest,
    pub metadata: PackageMetadata,
    pub package_dir: PathBuf,
}

/// Invocation-wide collaborators, carried through every state.
struct Invocation {
    recipe: &'static dyn Recipe,
    name: PackageName,
    layout: WorkLayout,
    recipes_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    runner: Arc<dyn CommandRunner>,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("recipe", &self.name)
            .field("layout", &self.layout)
            .field("recipes_dir", &self.recipes_dir)
            .finish_non_exhaustive()
    }
}

impl Invocation {
    fn enter(&self, version: &Version, phase: &str) {
        tracing::info!(recipe = %self.name, %version, phase, "Entering phase");
        self.reporter.phase(&self.name, version, phase);
    }

    fn exports_dir(&self) -> PathBuf {
        self.layout.root.join("exports")
    }

    /// Embedded exports, replaced file by file from `<recipes_dir>/<name>/`.
    fn stage_exports(&self) -> std::io::Result<Vec<PathBuf>> {
        let local = self
            .recipes_dir
            .as_ref()
            .map(|dir| dir.join(self.name.as_str()));
        stage_exports(
            self.recipe.descriptor().exports,
            local.as_deref(),
            &self.exports_dir(),
        )
    }
}

/// Everything decided before any side effect happens.
#[derive(Debug, Clone)]
struct Plan {
    ctx: RecipeContext,
    source: SourceEntry,
    requirements: Vec<Requirement>,
    key: CompatibilityKey,
}

/// State 0: an invocation that has been requested but not yet resolved.
///
/// # Transitions
///
/// - [`resolve()`](Self::resolve) -> [`Resolved`]
#[derive(Debug)]
pub struct Pipeline {
    inv: Invocation,
    version: Version,
    settings: Settings,
    overrides: Vec<(String, OptionValue)>,
    host: HostEnvironment,
}

impl Pipeline {
    /// Commands run through a [`SystemRunner`] logging to
    /// `<layout.root>/build.log` unless [`with_runner`](Self::with_runner)
    /// says otherwise.
    pub fn new(
        recipe: &'static dyn Recipe,
        version: Version,
        settings: Settings,
        overrides: Vec<(String, OptionValue)>,
        host: HostEnvironment,
        layout: WorkLayout,
    ) -> Self {
        let runner = Arc::new(SystemRunner::new(layout.root.join("build.log")));
        Self {
            inv: Invocation {
                recipe,
                name: PackageName::new(recipe.descriptor().name),
                layout,
                recipes_dir: None,
                env: Vec::new(),
                runner,
                reporter: Arc::new(NullReporter),
            },
            version,
            settings,
            overrides,
            host,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.inv.runner = runner;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.inv.reporter = reporter;
        self
    }

    /// Local recipe directory: `<dir>/<name>/sources.toml` extends the source
    /// table and files in `<dir>/<name>/` replace the embedded patches.
    pub fn with_recipes_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.inv.recipes_dir = Some(dir.into());
        self
    }

    /// Environment passed to every cmake process.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.inv.env = env;
        self
    }

    /// Resolve options and pin the source archive for the version.
    ///
    /// Fails on an invalid configuration or a version with no known source.
    pub fn resolve(self) -> Result<Resolved, PipelineError> {
        let Self {
            inv,
            version,
            settings,
            overrides,
            host,
        } = self;
        inv.enter(&version, "resolve");

        let ctx = resolve_options(inv.recipe, &settings, &overrides, &version, &host)?;
        let table = match &inv.recipes_dir {
            Some(dir) => load_sources(inv.recipe, dir)?,
            None => inv.recipe.sources()?,
        };
        let source = table.require(inv.name.as_str(), &version)?.clone();

        Ok(Resolved { inv, ctx, source })
    }
}

/// State 1: options are final and the source archive is known.
///
/// # Transitions
///
/// - [`requirements()`](Self::requirements) -> [`Planned`]
#[derive(Debug)]
pub struct Resolved {
    inv: Invocation,
    ctx: RecipeContext,
    source: SourceEntry,
}

impl Resolved {
    pub fn context(&self) -> &RecipeContext {
        &self.ctx
    }

    pub fn source(&self) -> &SourceEntry {
        &self.source
    }

    /// Declare requirements and compute the compatibility key.
    pub fn requirements(self) -> Result<Planned, PipelineError> {
        let Self { inv, ctx, source } = self;
        inv.enter(&ctx.version, "requirements");

        let requirements = inv.recipe.requirements(&ctx)?;
        let key = compatibility_key(inv.recipe, &ctx, &requirements);
        tracing::debug!(package_id = %key.digest(), "Compatibility key computed");

        Ok(Planned {
            inv,
            plan: Plan {
                ctx,
                source,
                requirements,
                key,
            },
        })
    }
}

/// State 2: the whole invocation is decided; nothing has touched the disk.
///
/// # Transitions
///
/// - [`system_requirements()`](Self::system_requirements) -> [`Prepared`]
#[derive(Debug)]
pub struct Planned {
    inv: Invocation,
    plan: Plan,
}

impl Planned {
    pub fn context(&self) -> &RecipeContext {
        &self.plan.ctx
    }

    pub fn source(&self) -> &SourceEntry {
        &self.plan.source
    }

    pub fn requires(&self) -> &[Requirement] {
        &self.plan.requirements
    }

    pub fn compatibility_key(&self) -> &CompatibilityKey {
        &self.plan.key
    }

    /// Host packages the next transition would install.
    pub fn system_packages(&self) -> Vec<SystemPackage> {
        self.inv.recipe.system_requirements(&self.plan.ctx)
    }

    pub fn patches(&self) -> Vec<PatchSpec> {
        self.inv.recipe.patches(&self.plan.ctx)
    }

    /// The CMake invocation the build would use.
    pub fn cmake(&self) -> CMake {
        let mut cmake = CMake::for_recipe(self.inv.recipe, &self.plan.ctx, &self.inv.layout);
        cmake.env.clone_from(&self.inv.env);
        cmake
    }

    /// Install system prerequisites according to the host's mode.
    pub fn system_requirements(self) -> Result<Prepared, PipelineError> {
        let Self { inv, plan } = self;
        inv.enter(&plan.ctx.version, "system_requirements");

        let packages = inv.recipe.system_requirements(&plan.ctx);
        let ran = sysreqs::install(inv.runner.as_ref(), &plan.ctx.host, &packages)?;
        if !ran.is_empty() {
            inv.reporter
                .info(&format!("Installed system requirements: {}", ran.join(", ")));
        }

        Ok(Prepared { inv, plan })
    }
}

/// State 3: the host is ready to build.
///
/// # Transitions
///
/// - [`acquire()`](Self::acquire) -> [`Sourced`]
#[derive(Debug)]
pub struct Prepared {
    inv: Invocation,
    plan: Plan,
}

impl Prepared {
    /// Fetch and verify the archive, extract it as the source tree and apply
    /// source-phase patches.
    ///
    /// Existing `source`, `build` and `package` directories are wiped first.
    pub async fn acquire(self, fetcher: &dyn SourceFetch) -> Result<Sourced, PipelineError> {
        let Self { inv, plan } = self;
        let version = &plan.ctx.version;
        inv.enter(version, "source");

        let archive = fetcher
            .fetch(
                FetchRequest {
                    name: &inv.name,
                    version,
                    url: &plan.source.url,
                    sha256: plan.source.sha256.as_ref(),
                },
                inv.reporter.as_ref(),
            )
            .await?;

        let layout = &inv.layout;
        for dir in [&layout.source, &layout.build, &layout.package] {
            remove_dir_if_exists(dir)?;
        }
        let staging = layout.root.join("extract");
        remove_dir_if_exists(&staging)?;

        let (from, into, format) = (archive.clone(), staging.clone(), plan.source.format);
        let count = tokio::task::spawn_blocking(move || extract(&from, &into, format))
            .await
            .map_err(std::io::Error::other)??;
        tracing::debug!(files = count, archive = %archive.display(), "Extracted");

        let root_name = inv.recipe.archive_root(version);
        let root = staging.join(&root_name);
        if !root.is_dir() {
            return Err(PipelineError::ArchiveLayout(root_name));
        }
        std::fs::rename(&root, &layout.source)?;
        if let Err(e) = std::fs::remove_dir_all(&staging) {
            tracing::warn!(dir = %staging.display(), "Failed to remove staging directory: {e}");
        }

        let staged = inv.stage_exports()?;
        tracing::debug!(exports = staged.len(), "Staged recipe exports");

        let patches = inv.recipe.patches(&plan.ctx);
        apply_patches(
            inv.runner.as_ref(),
            &layout.source,
            &inv.exports_dir(),
            &patches,
            PatchPhase::Source,
        )?;

        Ok(Sourced { inv, plan, patches })
    }
}

/// State 4: a patched source tree is in place.
///
/// # Transitions
///
/// - [`build()`](Self::build) -> [`Built`]
#[derive(Debug)]
pub struct Sourced {
    inv: Invocation,
    plan: Plan,
    patches: Vec<PatchSpec>,
}

impl Sourced {
    pub fn source_dir(&self) -> &Path {
        &self.inv.layout.source
    }

    /// Apply build-phase patches, then configure and build with CMake.
    pub fn build(self) -> Result<Built, PipelineError> {
        let Self { inv, plan, patches } = self;
        inv.enter(&plan.ctx.version, "build");

        apply_patches(
            inv.runner.as_ref(),
            &inv.layout.source,
            &inv.exports_dir(),
            &patches,
            PatchPhase::Build,
        )?;

        let mut cmake = CMake::for_recipe(inv.recipe, &plan.ctx, &inv.layout);
        cmake.env.clone_from(&inv.env);
        let mut session = BuildSession::new(Arc::clone(&inv.runner), cmake);
        session.build()?;

        Ok(Built { inv, plan, session })
    }
}

/// State 5: the build tree is complete.
///
/// # Transitions
///
/// - [`package()`](Self::package) -> [`Packaged`]
#[derive(Debug)]
pub struct Built {
    inv: Invocation,
    plan: Plan,
    session: BuildSession,
}

impl Built {
    pub fn package_dir(&self) -> &Path {
        &self.inv.layout.package
    }

    /// Copy licenses, install into the package directory and apply the
    /// recipe's cleanup rules.
    pub fn package(self) -> Result<Packaged, PipelineError> {
        let Self {
            inv,
            plan,
            mut session,
        } = self;
        inv.enter(&plan.ctx.version, "package");

        let licenses = copy_licenses(
            &inv.layout.source,
            &inv.layout.licenses(),
            inv.recipe.license_files(),
        )?;
        session.install()?;
        let removed = apply_cleanup(&inv.layout.package, &inv.recipe.post_package(&plan.ctx));
        tracing::debug!(licenses = licenses.len(), removed = removed.len(), "Packaged");

        Ok(Packaged { inv, plan })
    }
}

/// State 6: the package directory holds the final contents.
///
/// # Transitions
///
/// - [`finish()`](Self::finish) -> [`PackageReport`]
#[derive(Debug)]
pub struct Packaged {
    inv: Invocation,
    plan: Plan,
}

impl Packaged {
    /// Collect package metadata and write it next to the package contents.
    pub fn finish(self) -> Result<PackageReport, PipelineError> {
        let Self { inv, plan } = self;
        let version = plan.ctx.version.clone();
        inv.enter(&version, "finish");

        let metadata = inv.recipe.package_info(&plan.ctx, &inv.layout.package)?;
        let report = PackageReport {
            name: inv.name.clone(),
            version,
            package_id: plan.key.digest(),
            compatibility_key: plan.key,
            requirements: plan.requirements,
            metadata,
            package_dir: inv.layout.package.clone(),
        };

        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(inv.layout.metadata_file(), json)?;

        inv.reporter.done(
            &report.name,
            &report.version,
            &format!("package {}", report.package_id.as_str()),
        );
        Ok(report)
    }
}

fn remove_dir_if_exists(dir: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
