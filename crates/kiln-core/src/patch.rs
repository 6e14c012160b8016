//! Applying recipe patches to an extracted source tree.

use std::path::{Path, PathBuf};

use crate::process::{BuildError, CommandRunner, CommandSpec};
use crate::recipe::{Export, PatchPhase, PatchSpec};

/// Write a recipe's exports into `dest`.
///
/// A file of the same name in `local_dir` replaces the embedded copy.
/// Returns the staged paths.
pub fn stage_exports(
    exports: &[Export],
    local_dir: Option<&Path>,
    dest: &Path,
) -> std::io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dest)?;
    let mut staged = Vec::with_capacity(exports.len());
    for export in exports {
        let target = dest.join(export.file);
        match local_dir.map(|dir| dir.join(export.file)).filter(|p| p.is_file()) {
            Some(local) => {
                tracing::debug!(path = %local.display(), "Using local export");
                std::fs::copy(&local, &target)?;
            }
            None => std::fs::write(&target, export.contents)?,
        }
        staged.push(target);
    }
    Ok(staged)
}

/// `patch -p<strip> -i <file>`, run from the source directory.
pub fn patch_command(source_dir: &Path, patch_path: &Path, strip: u32) -> CommandSpec {
    CommandSpec::new("patch")
        .args(["-p", &strip.to_string(), "-i"])
        .arg(patch_path.display().to_string())
        .current_dir(source_dir)
}

/// Apply the patches of `phase`, looking each file up in `exports_dir`.
///
/// Returns how many patches were applied. A patch file that is not there is
/// an error; nothing is applied after it.
pub fn apply_patches(
    runner: &dyn CommandRunner,
    source_dir: &Path,
    exports_dir: &Path,
    patches: &[PatchSpec],
    phase: PatchPhase,
) -> Result<usize, BuildError> {
    let mut applied = 0;
    for patch in patches.iter().filter(|p| p.phase == phase) {
        let path = exports_dir.join(patch.file);
        if !path.is_file() {
            return Err(BuildError::MissingFile(path));
        }
        tracing::info!(patch = patch.file, ?phase, "Applying patch");
        runner.run(&patch_command(source_dir, &path, patch.strip))?;
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RecordingRunner;
    use tempfile::tempdir;

    const MUSL: PatchSpec = PatchSpec {
        file: "musl.patch",
        phase: PatchPhase::Source,
        strip: 1,
    };
    const PROTOC: PatchSpec = PatchSpec {
        file: "protoc.patch",
        phase: PatchPhase::Build,
        strip: 1,
    };

    #[test]
    fn test_applies_only_matching_phase() {
        let dir = tempdir().unwrap();
        let exports = dir.path().join("exports");
        std::fs::create_dir_all(&exports).unwrap();
        std::fs::write(exports.join("musl.patch"), "").unwrap();
        std::fs::write(exports.join("protoc.patch"), "").unwrap();
        let source = dir.path().join("source");

        let runner = RecordingRunner::new();
        let n = apply_patches(&runner, &source, &exports, &[MUSL, PROTOC], PatchPhase::Build).unwrap();
        assert_eq!(n, 1);

        let calls = runner.calls();
        assert_eq!(calls[0].program, "patch");
        assert_eq!(calls[0].cwd.as_deref(), Some(source.as_path()));
        assert_eq!(
            calls[0].args,
            vec![
                "-p".to_string(),
                "1".to_string(),
                "-i".to_string(),
                exports.join("protoc.patch").display().to_string()
            ]
        );
    }

    #[test]
    fn test_missing_patch_is_an_error() {
        let dir = tempdir().unwrap();
        let runner = RecordingRunner::new();
        let err = apply_patches(&runner, dir.path(), dir.path(), &[PROTOC], PatchPhase::Build)
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingFile(p) if p.ends_with("protoc.patch")));
        assert!(runner.calls().is_empty());
    }

    const EMBEDDED: &[Export] = &[
        Export {
            file: "protoc.patch",
            contents: "embedded protoc\n",
        },
        Export {
            file: "musl.patch",
            contents: "embedded musl\n",
        },
    ];

    #[test]
    fn test_stage_embedded_exports() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("exports");
        let staged = stage_exports(EMBEDDED, None, &dest).unwrap();
        assert_eq!(staged, vec![dest.join("protoc.patch"), dest.join("musl.patch")]);
        assert_eq!(
            std::fs::read_to_string(dest.join("musl.patch")).unwrap(),
            "embedded musl\n"
        );
    }

    #[test]
    fn test_local_export_replaces_embedded() {
        let dir = tempdir().unwrap();
        let local = dir.path().join("recipes/protoc");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("protoc.patch"), "local protoc\n").unwrap();
        let dest = dir.path().join("exports");

        stage_exports(EMBEDDED, Some(&local), &dest).unwrap();
        assert_eq!(
            std::fs::read_to_string(dest.join("protoc.patch")).unwrap(),
            "local protoc\n"
        );
        assert_eq!(
            std::fs::read_to_string(dest.join("musl.patch")).unwrap(),
            "embedded musl\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_real_patch_tool() {
        use crate::process::SystemRunner;

        if which::which("patch").is_err() {
            return;
        }
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("hello.txt"), "hello\n").unwrap();
        let exports = dir.path().join("exports");
        std::fs::create_dir_all(&exports).unwrap();
        std::fs::write(
            exports.join("protoc.patch"),
            "--- a/hello.txt\n+++ b/hello.txt\n@@ -1 +1 @@\n-hello\n+patched\n",
        )
        .unwrap();

        let runner = SystemRunner::new(dir.path().join("build.log"));
        apply_patches(&runner, &source, &exports, &[PROTOC], PatchPhase::Build).unwrap();
        assert_eq!(
            std::fs::read_to_string(source.join("hello.txt")).unwrap(),
            "patched\n"
        );
    }
}
