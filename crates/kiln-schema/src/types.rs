//! Package names, versions, references and requirements.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use thiserror::Error;

/// A normalized package name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageName(String);

impl PackageName {
    /// Create a new package name, normalizing the input to lowercase.
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    /// Return the normalized name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for PackageName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.to_lowercase()
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.to_lowercase()
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

/// A version string, compared loosely.
///
/// Missing numeric components count as zero, so `"0.4"` equals `"0.4.0"` and
/// `"14"` sorts below `"15.0"`. Strings that are not dotted numbers fall back
/// to plain string ordering.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Version(String);

impl Version {
    /// Create a new version from the given string (stored as-is).
    pub fn new(v: &str) -> Self {
        Self(v.to_string())
    }

    /// Return the version string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse as semver, zero-filling missing minor/patch components.
    pub fn loose(&self) -> Option<semver::Version> {
        let (core, rest) = match self.0.find(['-', '+']) {
            Some(idx) => self.0.split_at(idx),
            None => (self.0.as_str(), ""),
        };
        let mut parts: Vec<&str> = core.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return None;
        }
        while parts.len() < 3 {
            parts.push("0");
        }
        semver::Version::parse(&format!("{}{rest}", parts.join("."))).ok()
    }

    /// Numeric release components and pre-release tag, any number of
    /// components (`12.0.40629.0`). `None` unless every component is numeric.
    fn parts(&self) -> Option<(Vec<u64>, Option<semver::Prerelease>)> {
        let (core, rest) = match self.0.find(['-', '+']) {
            Some(idx) => self.0.split_at(idx),
            None => (self.0.as_str(), ""),
        };
        let numbers = core
            .split('.')
            .map(|p| p.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        let pre = match rest.strip_prefix('-') {
            Some(pre) => {
                let pre = pre.split_once('+').map_or(pre, |(p, _)| p);
                Some(semver::Prerelease::new(pre).ok()?)
            }
            None => None,
        };
        Some((numbers, pre))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        let (Some((a, a_pre)), Some((b, b_pre))) = (self.parts(), other.parts()) else {
            return match (self.parts(), other.parts()) {
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                _ => self.0.cmp(&other.0),
            };
        };
        let len = a.len().max(b.len());
        let component = |v: &[u64], i: usize| v.get(i).copied().unwrap_or(0);
        (0..len)
            .map(|i| component(&a, i).cmp(&component(&b, i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| match (a_pre, b_pre) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) => x.cmp(&y),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self.parts() {
            Some((mut numbers, pre)) => {
                while numbers.last() == Some(&0) {
                    numbers.pop();
                }
                numbers.hash(state);
                pre.hash(state);
            }
            None => self.0.hash(state),
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for Version {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<&str> for Version {
    fn eq(&self, other: &&str) -> bool {
        *self == Version::new(other)
    }
}

/// Errors that can occur when parsing a [`PackageReference`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// The string is not of the form `name/version[@user/channel]`.
    #[error("Invalid package reference '{0}': expected name/version[@user/channel]")]
    Malformed(String),
}

/// A fully named package: `name/version` or `name/version@user/channel`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageReference {
    /// Package name.
    pub name: PackageName,
    /// Package version.
    pub version: Version,
    /// Publishing namespace, if any.
    pub user: Option<String>,
    /// Channel within the namespace (e.g. `stable`), if any.
    pub channel: Option<String>,
}

impl PackageReference {
    /// Reference without user/channel.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: PackageName::new(name),
            version: Version::new(version),
            user: None,
            channel: None,
        }
    }

    /// Attach a `user/channel` pair.
    pub fn with_channel(mut self, user: &str, channel: &str) -> Self {
        self.user = Some(user.to_string());
        self.channel = Some(channel.to_string());
        self
    }
}

impl std::fmt::Display for PackageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.version)?;
        if let (Some(user), Some(channel)) = (&self.user, &self.channel) {
            write!(f, "@{user}/{channel}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for PackageReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ReferenceError::Malformed(s.to_string());

        let (pkg, namespace) = match s.split_once('@') {
            Some((pkg, ns)) => (pkg, Some(ns)),
            None => (s, None),
        };
        let (name, version) = pkg.split_once('/').ok_or_else(malformed)?;
        if name.is_empty() || version.is_empty() || version.contains('/') {
            return Err(malformed());
        }

        let mut reference = Self::new(name, version);
        if let Some(ns) = namespace {
            let (user, channel) = ns.split_once('/').ok_or_else(malformed)?;
            if user.is_empty() || channel.is_empty() {
                return Err(malformed());
            }
            reference = reference.with_channel(user, channel);
        }
        Ok(reference)
    }
}

/// Whether a dependency is exposed to consumers of the depending package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Transitively exposed to consumers.
    #[default]
    Public,
    /// Used only to build this package.
    Private,
}

/// A declared dependency on another package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    /// The package depended on.
    pub reference: PackageReference,
    /// Visibility towards consumers.
    pub visibility: Visibility,
}

impl Requirement {
    /// A publicly visible requirement.
    pub fn public(reference: PackageReference) -> Self {
        Self {
            reference,
            visibility: Visibility::Public,
        }
    }

    /// A private requirement.
    pub fn private(reference: PackageReference) -> Self {
        Self {
            reference,
            visibility: Visibility::Private,
        }
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.visibility {
            Visibility::Public => write!(f, "{}", self.reference),
            Visibility::Private => write!(f, "{} (private)", self.reference),
        }
    }
}
