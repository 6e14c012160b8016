//! Build settings: target OS, architecture, compiler and build type.
//!
//! Settings describe the machine a package is built *for*. The `os_build` and
//! `arch_build` fields describe the machine that runs build tools; they only
//! matter for recipes that fold them into their compatibility key.
//!
//! # Example
//!
//! ```
//! use kiln_schema::{Arch, Os, Settings};
//!
//! let mut settings = Settings::detect_host();
//! settings.set("os", "Windows").unwrap();
//! settings.set("compiler", "Visual Studio").unwrap();
//! settings.set("compiler.version", "16").unwrap();
//! assert_eq!(settings.os, Os::Windows);
//! assert_eq!(settings.compiler.name(), "Visual Studio");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Version;

/// Errors raised while parsing or applying a setting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingError {
    /// The value is not legal for the named setting.
    #[error("Invalid value '{value}' for setting '{key}'")]
    InvalidValue {
        /// Setting key (e.g. `compiler.runtime`).
        key: String,
        /// The rejected value.
        value: String,
    },

    /// The setting key is not known.
    #[error("Unknown setting '{0}'")]
    UnknownKey(String),
}

/// Target operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Os {
    /// Microsoft Windows.
    Windows,
    /// Linux (any distribution).
    Linux,
    /// Apple macOS.
    Macos,
    /// Android.
    Android,
    /// `FreeBSD`.
    FreeBsd,
    /// Apple iOS.
    Ios,
}

impl Os {
    /// The OS the current binary was compiled for.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => Self::Windows,
            "macos" => Self::Macos,
            "android" => Self::Android,
            "freebsd" => Self::FreeBsd,
            "ios" => Self::Ios,
            _ => Self::Linux,
        }
    }

    /// Canonical token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::Linux => "Linux",
            Self::Macos => "Macos",
            Self::Android => "Android",
            Self::FreeBsd => "FreeBSD",
            Self::Ios => "iOS",
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Os {
    type Err = SettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "windows" | "win" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "macos" | "darwin" | "osx" => Ok(Self::Macos),
            "android" => Ok(Self::Android),
            "freebsd" => Ok(Self::FreeBsd),
            "ios" => Ok(Self::Ios),
            _ => Err(SettingError::InvalidValue {
                key: "os".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Target CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    /// 32-bit Intel.
    X86,
    /// 64-bit Intel/AMD.
    X86_64,
    /// 32-bit ARM.
    Armv7,
    /// 64-bit ARM (`aarch64`).
    Armv8,
}

impl Arch {
    /// Get the current architecture
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "x86" => Self::X86,
            "arm" => Self::Armv7,
            "aarch64" => Self::Armv8,
            _ => Self::X86_64,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
            Self::Armv7 => "armv7",
            Self::Armv8 => "armv8",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = SettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x86" | "i386" | "i686" => Ok(Self::X86),
            "x86_64" | "amd64" | "x64" => Ok(Self::X86_64),
            "armv7" | "arm" => Ok(Self::Armv7),
            "armv8" | "arm64" | "aarch64" => Ok(Self::Armv8),
            _ => Err(SettingError::InvalidValue {
                key: "arch".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// MSVC runtime library selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsvcRuntime {
    /// Static release runtime.
    MT,
    /// Static debug runtime.
    MTd,
    /// Dynamic release runtime.
    MD,
    /// Dynamic debug runtime.
    MDd,
}

impl MsvcRuntime {
    /// Canonical token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MT => "MT",
            Self::MTd => "MTd",
            Self::MD => "MD",
            Self::MDd => "MDd",
        }
    }

    /// Whether the runtime is linked statically (`MT` or `MTd`).
    pub fn is_static(&self) -> bool {
        self.as_str().contains("MT")
    }
}

impl std::str::FromStr for MsvcRuntime {
    type Err = SettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MT" => Ok(Self::MT),
            "MTd" => Ok(Self::MTd),
            "MD" => Ok(Self::MD),
            "MDd" => Ok(Self::MDd),
            _ => Err(SettingError::InvalidValue {
                key: "compiler.runtime".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Compiler identity plus its version.
///
/// Only Visual Studio carries a runtime sub-setting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum Compiler {
    /// GNU Compiler Collection.
    Gcc {
        /// Compiler version (e.g. `9`).
        version: Version,
    },
    /// LLVM clang.
    Clang {
        /// Compiler version (e.g. `10`).
        version: Version,
    },
    /// Apple's clang fork shipped with Xcode.
    AppleClang {
        /// Compiler version (e.g. `12.0`).
        version: Version,
    },
    /// Microsoft Visual Studio (MSVC).
    #[serde(rename = "Visual Studio")]
    VisualStudio {
        /// Visual Studio major version (e.g. `16` for VS 2019).
        version: Version,
        /// C runtime linkage.
        runtime: MsvcRuntime,
    },
}

impl Compiler {
    /// Compiler identity string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gcc { .. } => "gcc",
            Self::Clang { .. } => "clang",
            Self::AppleClang { .. } => "apple-clang",
            Self::VisualStudio { .. } => "Visual Studio",
        }
    }

    /// Compiler version.
    pub fn version(&self) -> &Version {
        match self {
            Self::Gcc { version }
            | Self::Clang { version }
            | Self::AppleClang { version }
            | Self::VisualStudio { version, .. } => version,
        }
    }

    /// MSVC runtime, if this is Visual Studio.
    pub fn runtime(&self) -> Option<MsvcRuntime> {
        match self {
            Self::VisualStudio { runtime, .. } => Some(*runtime),
            _ => None,
        }
    }

    /// Whether this is Visual Studio.
    pub fn is_visual_studio(&self) -> bool {
        matches!(self, Self::VisualStudio { .. })
    }

    /// A sensible default compiler for the given OS.
    pub fn default_for(os: Os) -> Self {
        match os {
            Os::Windows => Self::VisualStudio {
                version: Version::from("16"),
                runtime: MsvcRuntime::MD,
            },
            Os::Macos | Os::Ios => Self::AppleClang {
                version: Version::from("12.0"),
            },
            Os::Linux | Os::Android | Os::FreeBsd => Self::Gcc {
                version: Version::from("9"),
            },
        }
    }

    /// Build a compiler from its identity name, keeping the version (and
    /// runtime, for Visual Studio) of `self` where that makes sense.
    ///
    /// # Errors
    ///
    /// Returns [`SettingError::InvalidValue`] if `name` is not a known compiler.
    pub fn with_name(&self, name: &str) -> Result<Self, SettingError> {
        let version = self.version().clone();
        match name.to_lowercase().as_str() {
            "gcc" => Ok(Self::Gcc { version }),
            "clang" => Ok(Self::Clang { version }),
            "apple-clang" | "apple_clang" => Ok(Self::AppleClang { version }),
            "visual studio" | "msvc" | "visual_studio" => Ok(Self::VisualStudio {
                version,
                runtime: self.runtime().unwrap_or(MsvcRuntime::MD),
            }),
            _ => Err(SettingError::InvalidValue {
                key: "compiler".to_string(),
                value: name.to_string(),
            }),
        }
    }

    /// Return a copy with a different version.
    pub fn with_version(&self, version: Version) -> Self {
        match self {
            Self::Gcc { .. } => Self::Gcc { version },
            Self::Clang { .. } => Self::Clang { version },
            Self::AppleClang { .. } => Self::AppleClang { version },
            Self::VisualStudio { runtime, .. } => Self::VisualStudio {
                version,
                runtime: *runtime,
            },
        }
    }
}

impl std::fmt::Display for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name(), self.version())
    }
}

/// CMake build type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BuildType {
    /// Unoptimised, with debug info.
    Debug,
    /// Optimised.
    #[default]
    Release,
    /// Optimised, with debug info.
    RelWithDebInfo,
    /// Optimised for size.
    MinSizeRel,
}

impl BuildType {
    /// Canonical token (the CMake spelling).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "Debug",
            Self::Release => "Release",
            Self::RelWithDebInfo => "RelWithDebInfo",
            Self::MinSizeRel => "MinSizeRel",
        }
    }
}

impl std::fmt::Display for BuildType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BuildType {
    type Err = SettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            "relwithdebinfo" => Ok(Self::RelWithDebInfo),
            "minsizerel" => Ok(Self::MinSizeRel),
            _ => Err(SettingError::InvalidValue {
                key: "build_type".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// The full settings record for one build invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Target operating system.
    pub os: Os,
    /// Target architecture.
    pub arch: Arch,
    /// Compiler used for the target.
    pub compiler: Compiler,
    /// CMake build type.
    pub build_type: BuildType,
    /// OS of the machine running build tools.
    pub os_build: Os,
    /// Architecture of the machine running build tools.
    pub arch_build: Arch,
}

impl Settings {
    /// Settings describing a native build on the current host.
    pub fn detect_host() -> Self {
        let os = Os::current();
        let arch = Arch::current();
        Self {
            os,
            arch,
            compiler: Compiler::default_for(os),
            build_type: BuildType::Release,
            os_build: os,
            arch_build: arch,
        }
    }

    /// Apply a single `key=value` override.
    ///
    /// Recognised keys: `os`, `arch`, `compiler`, `compiler.version`,
    /// `compiler.runtime`, `build_type`, `os_build`, `arch_build`.
    /// Setting `os` (or `arch`) does not touch `os_build` (or `arch_build`).
    ///
    /// # Errors
    ///
    /// Returns [`SettingError`] for unknown keys or illegal values.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingError> {
        match key {
            "os" => self.os = value.parse()?,
            "arch" => self.arch = value.parse()?,
            "os_build" => self.os_build = value.parse()?,
            "arch_build" => self.arch_build = value.parse()?,
            "build_type" => self.build_type = value.parse()?,
            "compiler" => self.compiler = self.compiler.with_name(value)?,
            "compiler.version" => {
                self.compiler = self.compiler.with_version(Version::from(value));
            }
            "compiler.runtime" => match &mut self.compiler {
                Compiler::VisualStudio { runtime, .. } => *runtime = value.parse()?,
                _ => {
                    return Err(SettingError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
            },
            _ => return Err(SettingError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Flatten into `key -> value` pairs, the form used by compatibility keys.
    ///
    /// Build-machine settings are not included; recipes opt into them.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("os".to_string(), self.os.to_string()),
            ("arch".to_string(), self.arch.to_string()),
            ("compiler".to_string(), self.compiler.name().to_string()),
            (
                "compiler.version".to_string(),
                self.compiler.version().to_string(),
            ),
        ];
        if let Some(runtime) = self.compiler.runtime() {
            pairs.push(("compiler.runtime".to_string(), runtime.as_str().to_string()));
        }
        pairs.push(("build_type".to_string(), self.build_type.to_string()));
        pairs
    }
}
