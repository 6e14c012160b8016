//! Post-build packaging: licenses, cleanup and library discovery.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::process::BuildError;
use crate::recipe::CleanupRule;

/// Library file extensions recognised by [`collect_libs`].
const LIB_EXTENSIONS: &[&str] = &["so", "lib", "a", "dylib", "bc"];

/// Copy each named license file from `source_dir` into `licenses_dir`.
///
/// Names may be glob patterns. A pattern that matches nothing is skipped
/// with a warning; upstream projects rename their license files.
pub fn copy_licenses(
    source_dir: &Path,
    licenses_dir: &Path,
    patterns: &[&str],
) -> Result<Vec<PathBuf>, BuildError> {
    std::fs::create_dir_all(licenses_dir)?;
    let mut copied = Vec::new();

    for pattern in patterns {
        let full = source_dir.join(pattern);
        let matches: Vec<PathBuf> = glob::glob(&full.to_string_lossy())
            .map(|paths| paths.filter_map(Result::ok).filter(|p| p.is_file()).collect())
            .unwrap_or_default();

        if matches.is_empty() {
            tracing::warn!(pattern, "No license file found");
            continue;
        }

        for path in matches {
            let Some(name) = path.file_name() else {
                continue;
            };
            let dest = licenses_dir.join(name);
            std::fs::copy(&path, &dest)?;
            tracing::debug!(file = %dest.display(), "Copied license");
            copied.push(dest);
        }
    }

    Ok(copied)
}

/// Apply cleanup rules under `package_dir`.
///
/// Best effort: missing paths are not errors and removal failures only log.
/// Returns the paths that were removed.
pub fn apply_cleanup(package_dir: &Path, rules: &[CleanupRule]) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    for rule in rules {
        match rule {
            CleanupRule::RemoveDir(rel) => {
                let path = package_dir.join(rel);
                if !path.is_dir() {
                    continue;
                }
                match std::fs::remove_dir_all(&path) {
                    Ok(()) => removed.push(path),
                    Err(e) => tracing::warn!(path = %path.display(), "Cleanup failed: {e}"),
                }
            }
            CleanupRule::RemoveGlob(pattern) => {
                let full = package_dir.join(pattern);
                let Ok(paths) = glob::glob(&full.to_string_lossy()) else {
                    tracing::warn!(pattern, "Invalid cleanup pattern");
                    continue;
                };
                for path in paths.filter_map(Result::ok) {
                    match std::fs::remove_file(&path) {
                        Ok(()) => removed.push(path),
                        Err(e) => tracing::warn!(path = %path.display(), "Cleanup failed: {e}"),
                    }
                }
            }
        }
    }

    removed
}

/// Library names found directly in `lib_dir`, sorted and de-duplicated.
///
/// Only `.so`, `.lib`, `.a`, `.dylib` and `.bc` files count. The `lib`
/// prefix is stripped except from `.lib` files (MSVC import libraries keep
/// their full name). Versioned names such as `libfoo.so.3` or
/// `libfoo.3.dylib` are skipped. A missing directory yields no libraries.
pub fn collect_libs(lib_dir: &Path) -> std::io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(lib_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(dir = %lib_dir.display(), "Library directory does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut libs = BTreeSet::new();
    for entry in entries {
        let entry = entry?;
        // Follows links: shared libraries are usually `libfoo.so -> libfoo.so.1.2`.
        if !entry.path().is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some((stem, ext)) = file_name.rsplit_once('.') else {
            continue;
        };
        if !LIB_EXTENSIONS.contains(&ext) || stem.contains('.') {
            continue;
        }
        let name = match stem.strip_prefix("lib") {
            Some(rest) if ext != "lib" && !rest.is_empty() => rest,
            _ => stem,
        };
        libs.insert(name.to_string());
    }

    Ok(libs.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_collect_libs_unix() {
        let dir = tempdir().unwrap();
        for f in [
            "libprotoc.a",
            "libprotobuf.a",
            "libprotobuf-lite.a",
            "libprotobuf.so",
            "libprotobuf.so.22",
            "libprotobuf.3.11.4.dylib",
            "protobuf.pc",
        ] {
            touch(&dir.path().join(f));
        }
        std::fs::create_dir(dir.path().join("libdir.a")).unwrap();

        let libs = collect_libs(dir.path()).unwrap();
        assert_eq!(libs, vec!["protobuf", "protobuf-lite", "protoc"]);
    }

    #[test]
    fn test_collect_libs_msvc_keeps_lib_prefix() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("libprotobufd.lib"));
        touch(&dir.path().join("libprotocd.lib"));
        let libs = collect_libs(dir.path()).unwrap();
        assert_eq!(libs, vec!["libprotobufd", "libprotocd"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_libs_follows_shared_library_links() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        for lib in ["protobuf", "protoc"] {
            let real = format!("lib{lib}.so.3.11.4.0");
            std::fs::write(dir.path().join(&real), b"").unwrap();
            symlink(&real, dir.path().join(format!("lib{lib}.so.3.11.4"))).unwrap();
            symlink(&real, dir.path().join(format!("lib{lib}.so"))).unwrap();
        }
        symlink("libgone.so.1", dir.path().join("libgone.so")).unwrap();

        assert_eq!(collect_libs(dir.path()).unwrap(), vec!["protobuf", "protoc"]);
    }

    #[test]
    fn test_collect_libs_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(collect_libs(&dir.path().join("lib")).unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_rules() {
        let dir = tempdir().unwrap();
        let pkg = dir.path();
        touch(&pkg.join("lib/cmake/sentry/sentry-config.cmake"));
        touch(&pkg.join("lib/sentry.lib"));
        touch(&pkg.join("bin/sentry.dll"));
        touch(&pkg.join("bin/sentry.pdb"));
        touch(&pkg.join("bin/crashpad_handler.pdb"));

        let removed = apply_cleanup(
            pkg,
            &[
                CleanupRule::RemoveDir("lib/cmake"),
                CleanupRule::RemoveGlob("bin/*.pdb"),
            ],
        );

        assert_eq!(removed.len(), 3);
        assert!(!pkg.join("lib/cmake").exists());
        assert!(pkg.join("lib/sentry.lib").exists());
        assert!(pkg.join("bin/sentry.dll").exists());
        assert!(!pkg.join("bin/sentry.pdb").exists());
    }

    #[test]
    fn test_cleanup_missing_paths_are_fine() {
        let dir = tempdir().unwrap();
        let removed = apply_cleanup(
            dir.path(),
            &[
                CleanupRule::RemoveDir("lib/cmake"),
                CleanupRule::RemoveGlob("bin/*.pdb"),
            ],
        );
        assert!(removed.is_empty());
    }

    #[test]
    fn test_copy_licenses() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        touch(&source.join("LICENSE"));
        let licenses = dir.path().join("package/licenses");

        let copied = copy_licenses(&source, &licenses, &["LICENSE", "COPYING*"]).unwrap();
        assert_eq!(copied, vec![licenses.join("LICENSE")]);
        assert!(licenses.join("LICENSE").is_file());
    }
}
