//! Build profiles.
//!
//! A profile is a TOML file fixing the target settings, option overrides and
//! build environment for an invocation:
//!
//! ```toml
//! [settings]
//! os = "Windows"
//! compiler = "Visual Studio"
//! "compiler.version" = "16"
//! "compiler.runtime" = "MT"
//!
//! [options]
//! shared = true
//! "sentry-native:backend" = "none"
//!
//! [env]
//! CMAKE_BUILD_PARALLEL_LEVEL = "8"
//! ```
//!
//! Dotted setting keys must be quoted. An option key of the form
//! `recipe:option` only applies to that recipe.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use kiln_schema::{OptionValue, SettingError, Settings};
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading or applying a profile.
#[derive(Error, Debug)]
pub enum ProfileError {
    /// The profile file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The content is not valid TOML for a profile.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting was rejected.
    #[error(transparent)]
    Setting(#[from] SettingError),

    /// A value is a table or array where a scalar is expected.
    #[error("[{section}] {key} must be a string, number or boolean")]
    NotScalar { section: &'static str, key: String },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    #[serde(default)]
    pub settings: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub options: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub env: BTreeMap<String, toml::Value>,
}

impl Profile {
    /// Parse a profile from a TOML file on disk.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Io` if the file cannot be read, or
    /// `ProfileError::Parse` if the TOML content is invalid.
    pub fn from_file(path: &Path) -> Result<Self, ProfileError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a profile from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Parse` if the TOML content is invalid.
    pub fn parse(content: &str) -> Result<Self, ProfileError> {
        Ok(toml::from_str(content)?)
    }

    /// Overwrite `settings` with this profile's `[settings]`.
    ///
    /// Keys are applied in sorted order, so `compiler` lands before
    /// `compiler.version` and `compiler.runtime`.
    pub fn apply_to(&self, settings: &mut Settings) -> Result<(), ProfileError> {
        for (key, value) in &self.settings {
            let value = scalar("settings", key, value)?;
            settings.set(key, &value)?;
        }
        Ok(())
    }

    /// Option overrides that apply to `recipe`.
    ///
    /// Unscoped entries come first, then `recipe:option` entries, so a scoped
    /// value wins over an unscoped one.
    pub fn options_for(&self, recipe: &str) -> Result<Vec<(String, OptionValue)>, ProfileError> {
        let mut unscoped = Vec::new();
        let mut scoped = Vec::new();
        for (key, value) in &self.options {
            let parsed = match value {
                toml::Value::Boolean(b) => OptionValue::Bool(*b),
                other => OptionValue::parse(&scalar("options", key, other)?),
            };
            match key.split_once(':') {
                None => unscoped.push((key.clone(), parsed)),
                Some((owner, name)) if owner.eq_ignore_ascii_case(recipe) => {
                    scoped.push((name.to_string(), parsed));
                }
                Some(_) => {}
            }
        }
        unscoped.extend(scoped);
        Ok(unscoped)
    }

    /// The `[env]` table as process environment pairs.
    pub fn env(&self) -> Result<Vec<(String, String)>, ProfileError> {
        self.env
            .iter()
            .map(|(k, v)| Ok((k.clone(), scalar("env", k, v)?)))
            .collect()
    }
}

impl std::str::FromStr for Profile {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Split a command-line `-o` value (`name=value` or `recipe:name=value`)
/// and keep it only if it targets `recipe`.
pub fn scoped_override(
    recipe: &str,
    raw: &str,
) -> Result<Option<(String, OptionValue)>, kiln_schema::OptionError> {
    let (key, value) = kiln_schema::options::parse_assignment(raw)?;
    Ok(match key.split_once(':') {
        None => Some((key, value)),
        Some((owner, name)) if owner.eq_ignore_ascii_case(recipe) => Some((name.to_string(), value)),
        Some(_) => None,
    })
}

fn scalar(section: &'static str, key: &str, value: &toml::Value) -> Result<String, ProfileError> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        _ => Err(ProfileError::NotScalar {
            section,
            key: key.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_schema::{Compiler, MsvcRuntime, Os, Version};

    const WINDOWS: &str = r#"
[settings]
os = "Windows"
compiler = "Visual Studio"
"compiler.version" = 16
"compiler.runtime" = "MT"
build_type = "Debug"

[options]
shared = true
fPIC = "False"
"sentry-native:backend" = "none"
"protoc:lite" = true

[env]
CMAKE_BUILD_PARALLEL_LEVEL = 8
"#;

    #[test]
    fn test_apply_settings() {
        let profile: Profile = WINDOWS.parse().unwrap();
        let mut settings = Settings::detect_host();
        profile.apply_to(&mut settings).unwrap();

        assert_eq!(settings.os, Os::Windows);
        assert_eq!(settings.build_type.as_str(), "Debug");
        assert_eq!(
            settings.compiler,
            Compiler::VisualStudio {
                version: Version::from("16"),
                runtime: MsvcRuntime::MT,
            }
        );
    }

    #[test]
    fn test_scoped_options() {
        let profile = Profile::parse(WINDOWS).unwrap();

        let sentry = profile.options_for("sentry-native").unwrap();
        assert_eq!(
            sentry,
            vec![
                ("fPIC".to_string(), OptionValue::Bool(false)),
                ("shared".to_string(), OptionValue::Bool(true)),
                ("backend".to_string(), OptionValue::from("none")),
            ]
        );

        let protoc = profile.options_for("protoc").unwrap();
        assert!(protoc.contains(&("lite".to_string(), OptionValue::Bool(true))));
        assert!(!protoc.iter().any(|(k, _)| k == "backend"));
    }

    #[test]
    fn test_env() {
        let profile = Profile::parse(WINDOWS).unwrap();
        assert_eq!(
            profile.env().unwrap(),
            vec![("CMAKE_BUILD_PARALLEL_LEVEL".to_string(), "8".to_string())]
        );
    }

    #[test]
    fn test_empty_profile() {
        let profile = Profile::parse("").unwrap();
        assert_eq!(profile, Profile::default());
        assert!(profile.options_for("protoc").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            Profile::parse("[compilers]\ngcc = 1"),
            Err(ProfileError::Parse(_))
        ));

        let profile = Profile::parse("[settings]\narch = \"sparc\"").unwrap();
        let err = profile.apply_to(&mut Settings::detect_host()).unwrap_err();
        assert!(matches!(err, ProfileError::Setting(_)));

        let profile = Profile::parse("[env]\nPATH = [\"a\", \"b\"]").unwrap();
        assert!(matches!(profile.env(), Err(ProfileError::NotScalar { section: "env", .. })));
    }

    #[test]
    fn test_scoped_override() {
        assert_eq!(
            scoped_override("protoc", "protoc:shared=True").unwrap(),
            Some(("shared".to_string(), OptionValue::Bool(true)))
        );
        assert_eq!(scoped_override("protoc", "sentry-native:backend=none").unwrap(), None);
        assert_eq!(
            scoped_override("protoc", "lite=False").unwrap(),
            Some(("lite".to_string(), OptionValue::Bool(false)))
        );
        assert!(scoped_override("protoc", "=x").is_err());
    }
}
