//! Recipe options: named, enumerated build-time choices.
//!
//! A recipe declares an [`OptionSchema`]: an ordered list of options, each
//! with a finite domain of legal values and a default. An [`OptionSet`] is a
//! concrete assignment built from that schema. Options may be removed when
//! they do not apply to the target platform; a removed option has no value
//! at all (not even its default).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while assigning option values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    /// The option name is not declared by the recipe.
    #[error("Unknown option '{0}'")]
    Unknown(String),

    /// The value lies outside the option's declared domain.
    #[error("'{value}' is not a valid value for option '{name}' (possible values: {domain})")]
    OutOfDomain {
        /// Option name.
        name: String,
        /// Rejected value.
        value: String,
        /// Comma-separated legal values.
        domain: String,
    },

    /// An override string was not of the form `name=value`.
    #[error("Invalid option assignment '{0}': expected name=value")]
    Malformed(String),
}

/// A single option value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Boolean toggle.
    Bool(bool),
    /// Enumerated token (e.g. `"curl"`).
    Text(String),
}

impl OptionValue {
    /// Parse a raw string. `True`/`true`/`1` and `False`/`false`/`0` become
    /// booleans; anything else is kept as text.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "True" | "true" | "1" => Self::Bool(true),
            "False" | "false" | "0" => Self::Bool(false),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Boolean view; text values are never truthy.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(_) => None,
        }
    }

    /// Text view; booleans have none.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Bool(_) => None,
        }
    }
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// The ordered set of legal values for one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDomain(Vec<OptionValue>);

impl OptionDomain {
    /// `{True, False}`.
    pub fn boolean() -> Self {
        Self(vec![OptionValue::Bool(true), OptionValue::Bool(false)])
    }

    /// A domain of text tokens.
    pub fn tokens(values: &[&str]) -> Self {
        Self(values.iter().map(|v| OptionValue::from(*v)).collect())
    }

    /// Whether `value` is legal.
    pub fn contains(&self, value: &OptionValue) -> bool {
        self.0.contains(value)
    }

    /// Legal values, in declaration order.
    pub fn values(&self) -> &[OptionValue] {
        &self.0
    }
}

impl std::fmt::Display for OptionDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", joined.join(", "))
    }
}

/// Declaration of one option: name, domain and default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDecl {
    /// Option name (e.g. `shared`, `fPIC`).
    pub name: String,
    /// Legal values.
    pub domain: OptionDomain,
    /// Default value; always a member of `domain`.
    pub default: OptionValue,
}

impl OptionDecl {
    /// Boolean option with the given default.
    pub fn boolean(name: &str, default: bool) -> Self {
        Self {
            name: name.to_string(),
            domain: OptionDomain::boolean(),
            default: OptionValue::Bool(default),
        }
    }

    /// Enumerated text option with the given default.
    pub fn tokens(name: &str, values: &[&str], default: &str) -> Self {
        Self {
            name: name.to_string(),
            domain: OptionDomain::tokens(values),
            default: OptionValue::from(default),
        }
    }
}

/// Ordered list of option declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OptionSchema(Vec<OptionDecl>);

impl OptionSchema {
    /// Build a schema from declarations.
    pub fn new(decls: Vec<OptionDecl>) -> Self {
        Self(decls)
    }

    /// Look up a declaration by name.
    pub fn get(&self, name: &str) -> Option<&OptionDecl> {
        self.0.iter().find(|d| d.name == name)
    }

    /// Iterate declarations in order.
    pub fn iter(&self) -> impl Iterator<Item = &OptionDecl> {
        self.0.iter()
    }
}

/// A concrete option assignment for one build.
///
/// Keeps a copy of the schema so every `set` is checked against the
/// declared domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionSet {
    #[serde(skip)]
    schema: OptionSchema,
    values: BTreeMap<String, OptionValue>,
}

impl OptionSet {
    /// All options at their defaults.
    pub fn from_schema(schema: &OptionSchema) -> Self {
        let values = schema
            .iter()
            .map(|d| (d.name.clone(), d.default.clone()))
            .collect();
        Self {
            schema: schema.clone(),
            values,
        }
    }

    /// Assign a value.
    ///
    /// # Errors
    ///
    /// Returns [`OptionError::Unknown`] if the schema does not declare `name`,
    /// or [`OptionError::OutOfDomain`] if `value` is not legal for it.
    pub fn set(&mut self, name: &str, value: OptionValue) -> Result<(), OptionError> {
        let decl = self
            .schema
            .get(name)
            .ok_or_else(|| OptionError::Unknown(name.to_string()))?;
        if !decl.domain.contains(&value) {
            return Err(OptionError::OutOfDomain {
                name: name.to_string(),
                value: value.to_string(),
                domain: decl.domain.to_string(),
            });
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Remove an option entirely. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.values.remove(name).is_some()
    }

    /// Whether the option is still present.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Value if present; `None` once removed.
    pub fn get_safe(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    /// Boolean value of a present boolean option.
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get_safe(name).and_then(OptionValue::as_bool)
    }

    /// Text value of a present enumerated option.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get_safe(name).and_then(OptionValue::as_text)
    }

    /// Iterate present options in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Split a `name=value` override.
///
/// # Errors
///
/// Returns [`OptionError::Malformed`] if there is no `=` or the name is empty.
pub fn parse_assignment(raw: &str) -> Result<(String, OptionValue), OptionError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), OptionValue::parse(value.trim())))
        }
        _ => Err(OptionError::Malformed(raw.to_string())),
    }
}
