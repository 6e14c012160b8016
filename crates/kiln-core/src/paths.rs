//! Filesystem locations: the kiln home directory and per-build work trees.

use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Returns the kiln home directory, or None if the user's home cannot be resolved.
///
/// `KILN_HOME` overrides the default of `~/.kiln`.
pub fn try_kiln_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("KILN_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".kiln"))
}

/// Directory layout under a kiln home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KilnHome {
    root: PathBuf,
}

impl KilnHome {
    /// Use `root` as the home directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve from `KILN_HOME` or the user's home directory.
    pub fn detect() -> Option<Self> {
        try_kiln_home().map(Self::new)
    }

    /// The home directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Download cache: ~/.kiln/cache
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Logs directory: ~/.kiln/logs
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Build work trees: ~/.kiln/work
    pub fn work_dir(&self) -> PathBuf {
        self.root.join("work")
    }

    /// Local recipe overrides (sources.toml, patch files): ~/.kiln/recipes
    pub fn recipes_dir(&self) -> PathBuf {
        self.root.join("recipes")
    }

    /// Generate a build log path for a package
    pub fn build_log_path(&self, package: &str, version: &str) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        self.log_dir()
            .join(format!("build-{package}-{version}-{timestamp}.log"))
    }
}

/// The three directories owned by one recipe invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLayout {
    /// `<work_root>/<name>-<version>`
    pub root: PathBuf,
    /// Extracted and patched sources.
    pub source: PathBuf,
    /// CMake binary directory.
    pub build: PathBuf,
    /// Install prefix; what ends up in the package.
    pub package: PathBuf,
}

impl WorkLayout {
    /// Layout for `name`/`version` under `work_root`.
    pub fn new(work_root: &Path, name: &str, version: &str) -> Self {
        let root = work_root.join(format!("{name}-{version}"));
        Self {
            source: root.join("source"),
            build: root.join("build"),
            package: root.join("package"),
            root,
        }
    }

    /// Where license files are copied.
    pub fn licenses(&self) -> PathBuf {
        self.package.join("licenses")
    }

    /// Package metadata JSON written at the end of a run.
    pub fn metadata_file(&self) -> PathBuf {
        self.package.join("kiln-metadata.json")
    }
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    url.split('/').next_back().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_layout() {
        let layout = WorkLayout::new(Path::new("/w"), "protoc", "3.11.4");
        assert_eq!(layout.root, PathBuf::from("/w/protoc-3.11.4"));
        assert_eq!(layout.source, PathBuf::from("/w/protoc-3.11.4/source"));
        assert_eq!(layout.build, PathBuf::from("/w/protoc-3.11.4/build"));
        assert_eq!(
            layout.licenses(),
            PathBuf::from("/w/protoc-3.11.4/package/licenses")
        );
    }

    #[test]
    fn test_home_dirs() {
        let home = KilnHome::new("/k");
        assert_eq!(home.cache_dir(), PathBuf::from("/k/cache"));
        assert_eq!(home.recipes_dir(), PathBuf::from("/k/recipes"));
        let log = home.build_log_path("sentry-native", "0.4.1");
        assert!(log.starts_with("/k/logs"));
        assert!(
            log.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("build-sentry-native-0.4.1-")
        );
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://github.com/getsentry/sentry-native/archive/0.4.1.tar.gz"),
            "0.4.1.tar.gz"
        );
    }
}
