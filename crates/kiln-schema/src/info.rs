//! What a finished package reports to its consumers.
//!
//! [`PackageMetadata`] is the link surface (libraries, flags, defines).
//! [`CompatibilityKey`] is the reduced set of inputs that decides whether two
//! builds of the same package can be swapped for one another.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::hash::Sha256Digest;
use crate::options::OptionSet;
use crate::settings::Settings;
use crate::types::Requirement;

/// Link information published for downstream packages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Library names to link, in link order.
    #[serde(default)]
    pub libs: Vec<String>,
    /// System libraries the package needs at link time.
    #[serde(default)]
    pub system_libs: Vec<String>,
    /// Linker flags for executables.
    #[serde(default)]
    pub exe_link_flags: Vec<String>,
    /// Linker flags for shared libraries.
    #[serde(default)]
    pub shared_link_flags: Vec<String>,
    /// Preprocessor definitions consumers must set.
    #[serde(default)]
    pub defines: Vec<String>,
    /// Generator name to package alias (e.g. `cmake_find_package` to `protoc`).
    #[serde(default)]
    pub names: BTreeMap<String, String>,
}

/// The inputs that decide binary compatibility of a build.
///
/// Built from the full settings, the resolved options and the requirement
/// references; a recipe may then drop or add entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompatibilityKey {
    /// Setting name to value.
    pub settings: BTreeMap<String, String>,
    /// Option name to value. Removed options are absent.
    pub options: BTreeMap<String, String>,
    /// Requirement references, sorted.
    pub requires: Vec<String>,
}

impl CompatibilityKey {
    /// The full, unreduced key.
    pub fn new(settings: &Settings, options: &OptionSet, requires: &[Requirement]) -> Self {
        let mut requires: Vec<String> = requires.iter().map(|r| r.reference.to_string()).collect();
        requires.sort();
        Self {
            settings: settings.to_pairs().into_iter().collect(),
            options: options
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            requires,
        }
    }

    /// Drop a setting together with its sub-settings (`compiler` also drops
    /// `compiler.version` and `compiler.runtime`).
    pub fn remove_setting(&mut self, key: &str) {
        let prefix = format!("{key}.");
        self.settings
            .retain(|k, _| k != key && !k.starts_with(&prefix));
    }

    /// Add the build-machine settings (`os_build`, `arch_build`).
    pub fn include_build_settings(&mut self, settings: &Settings) {
        self.settings
            .insert("os_build".to_string(), settings.os_build.to_string());
        self.settings
            .insert("arch_build".to_string(), settings.arch_build.to_string());
    }

    /// Canonical text form: one `[section]` header followed by sorted
    /// `key=value` lines per section.
    pub fn canonical(&self) -> String {
        let mut out = String::from("[settings]\n");
        for (k, v) in &self.settings {
            let _ = writeln!(out, "{k}={v}");
        }
        out.push_str("[options]\n");
        for (k, v) in &self.options {
            let _ = writeln!(out, "{k}={v}");
        }
        out.push_str("[requires]\n");
        for r in &self.requires {
            let _ = writeln!(out, "{r}");
        }
        out
    }

    /// SHA256 of [`canonical`](Self::canonical); equal keys give equal digests.
    pub fn digest(&self) -> Sha256Digest {
        Sha256Digest::compute(self.canonical().as_bytes())
    }
}
