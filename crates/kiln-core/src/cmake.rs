//! CMake invocation.
//!
//! [`CMake`] is the configured build handle: directories, generator and the
//! ordered `-D` definitions. [`BuildSession`] runs it and makes sure the
//! configure step happens at most once per invocation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_schema::{Arch, BuildType, Compiler, Os, Settings};

use crate::paths::WorkLayout;
use crate::process::{BuildError, CommandRunner, CommandSpec};
use crate::recipe::{Recipe, RecipeContext};

/// Value of a `-D` definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    /// Rendered as `ON`/`OFF`.
    Bool(bool),
    Text(String),
}

impl std::fmt::Display for Definition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(true) => write!(f, "ON"),
            Self::Bool(false) => write!(f, "OFF"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Definition {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Definition {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Definition {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&Path> for Definition {
    fn from(p: &Path) -> Self {
        Self::Text(p.display().to_string())
    }
}

/// A CMake project configured for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CMake {
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub install_prefix: PathBuf,
    pub generator: Option<String>,
    /// `-A` platform for Visual Studio generators.
    pub platform: Option<String>,
    pub build_type: BuildType,
    pub parallel: usize,
    /// Extra environment for every cmake process.
    pub env: Vec<(String, String)>,
    definitions: Vec<(String, Definition)>,
}

impl CMake {
    pub fn new(source_dir: &Path, build_dir: &Path, install_prefix: &Path, build_type: BuildType) -> Self {
        Self {
            source_dir: source_dir.to_path_buf(),
            build_dir: build_dir.to_path_buf(),
            install_prefix: install_prefix.to_path_buf(),
            generator: None,
            platform: None,
            build_type,
            parallel: num_cpus::get(),
            env: Vec::new(),
            definitions: Vec::new(),
        }
    }

    /// The handle a recipe builds with: generic definitions first, then the
    /// recipe's own.
    pub fn for_recipe(recipe: &dyn Recipe, ctx: &RecipeContext, layout: &WorkLayout) -> Self {
        let source_dir = match recipe.cmake_subdir() {
            Some(sub) => layout.source.join(sub),
            None => layout.source.clone(),
        };
        let mut cmake = Self::new(
            &source_dir,
            &layout.build,
            &layout.package,
            ctx.settings.build_type,
        );
        cmake.generator = default_generator(&ctx.settings);
        cmake.platform = vs_platform(&ctx.settings);

        if !cmake.is_multi_config() {
            cmake.define("CMAKE_BUILD_TYPE", ctx.settings.build_type.as_str());
        }
        cmake.define("CMAKE_INSTALL_PREFIX", layout.package.as_path());
        if let Some(shared) = ctx.options.bool("shared") {
            cmake.define("BUILD_SHARED_LIBS", shared);
        }
        if let Some(fpic) = ctx.options.bool("fPIC") {
            cmake.define("CMAKE_POSITION_INDEPENDENT_CODE", fpic);
        }
        cmake.define("CMAKE_INSTALL_LIBDIR", "lib");
        cmake.define("CMAKE_INSTALL_BINDIR", "bin");
        cmake.define("CMAKE_INSTALL_INCLUDEDIR", "include");

        for (key, value) in recipe.cmake_definitions(ctx) {
            cmake.define(key, value);
        }
        cmake
    }

    /// Set a definition, replacing an earlier value for the same key in place.
    pub fn define(&mut self, key: impl Into<String>, value: impl Into<Definition>) {
        let key = key.into();
        let value = value.into();
        match self.definitions.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.definitions.push((key, value)),
        }
    }

    pub fn definition(&self, key: &str) -> Option<&Definition> {
        self.definitions
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn definitions(&self) -> &[(String, Definition)] {
        &self.definitions
    }

    /// Visual Studio and Xcode pick the configuration at build time.
    pub fn is_multi_config(&self) -> bool {
        self.generator
            .as_deref()
            .is_some_and(|g| g.starts_with("Visual Studio") || g == "Xcode" || g.contains("Multi-Config"))
    }

    pub fn configure_command(&self) -> CommandSpec {
        let mut cmd = CommandSpec::new("cmake")
            .arg("-S")
            .arg(self.source_dir.display().to_string())
            .arg("-B")
            .arg(self.build_dir.display().to_string());
        if let Some(generator) = &self.generator {
            cmd = cmd.arg("-G").arg(generator.clone());
        }
        if let Some(platform) = &self.platform {
            cmd = cmd.arg("-A").arg(platform.clone());
        }
        self.with_env(cmd.args(self.definitions.iter().map(|(k, v)| format!("-D{k}={v}"))))
    }

    pub fn build_command(&self) -> CommandSpec {
        self.with_env(
            CommandSpec::new("cmake")
                .arg("--build")
                .arg(self.build_dir.display().to_string())
                .args(["--config", self.build_type.as_str()])
                .arg("--parallel")
                .arg(self.parallel.to_string()),
        )
    }

    pub fn install_command(&self) -> CommandSpec {
        self.with_env(
            CommandSpec::new("cmake")
                .arg("--install")
                .arg(self.build_dir.display().to_string())
                .args(["--config", self.build_type.as_str()]),
        )
    }

    fn with_env(&self, cmd: CommandSpec) -> CommandSpec {
        self.env
            .iter()
            .fold(cmd, |cmd, (k, v)| cmd.env(k.clone(), v.clone()))
    }
}

/// Visual Studio generator name for a VS compiler on a Windows target.
fn default_generator(settings: &Settings) -> Option<String> {
    if settings.os != Os::Windows {
        return None;
    }
    let Compiler::VisualStudio { version, .. } = &settings.compiler else {
        return None;
    };
    let major = version.split('.').next().unwrap_or_default();
    let year = match major {
        "14" => "2015",
        "15" => "2017",
        "16" => "2019",
        "17" => "2022",
        _ => return None,
    };
    Some(format!("Visual Studio {major} {year}"))
}

fn vs_platform(settings: &Settings) -> Option<String> {
    default_generator(settings)?;
    let platform = match settings.arch {
        Arch::X86 => "Win32",
        Arch::X86_64 => "x64",
        Arch::Armv7 => "ARM",
        Arch::Armv8 => "ARM64",
    };
    Some(platform.to_string())
}

/// Runs one recipe's CMake steps.
pub struct BuildSession {
    runner: Arc<dyn CommandRunner>,
    cmake: CMake,
    configured: bool,
}

impl std::fmt::Debug for BuildSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildSession")
            .field("cmake", &self.cmake)
            .field("configured", &self.configured)
            .finish_non_exhaustive()
    }
}

impl BuildSession {
    pub fn new(runner: Arc<dyn CommandRunner>, cmake: CMake) -> Self {
        Self {
            runner,
            cmake,
            configured: false,
        }
    }

    /// Configure on first use; later calls return the same handle without
    /// running cmake again.
    pub fn configure_cmake(&mut self) -> Result<&CMake, BuildError> {
        if !self.configured {
            std::fs::create_dir_all(&self.cmake.build_dir)?;
            tracing::info!(source = %self.cmake.source_dir.display(), "Configuring CMake");
            self.runner.run(&self.cmake.configure_command())?;
            self.configured = true;
        }
        Ok(&self.cmake)
    }

    pub fn build(&mut self) -> Result<(), BuildError> {
        let cmd = self.configure_cmake()?.build_command();
        tracing::info!("Building");
        self.runner.run(&cmd)
    }

    pub fn install(&mut self) -> Result<(), BuildError> {
        let cmd = self.configure_cmake()?.install_command();
        tracing::info!(prefix = %self.cmake.install_prefix.display(), "Installing");
        self.runner.run(&cmd)
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }
}
