//! Sentry Native SDK.
//!
//! Error and crash reporting client for C and C++ applications. Only the
//! `inproc` and `none` backends can be built; `crashpad` and `breakpad`
//! are declared but rejected when requirements are computed.

use std::path::Path;

use kiln_schema::{
    OptionDecl, OptionSchema, OptionSet, Os, PackageMetadata, PackageReference, Requirement,
    Version,
};

use crate::cmake::Definition;
use crate::recipe::{
    CleanupRule, Export, PatchPhase, PatchSpec, Recipe, RecipeContext, RecipeDescriptor,
    RecipeError, SourceTable, SystemPackage,
};

static DESCRIPTOR: RecipeDescriptor = RecipeDescriptor {
    name: "sentry-native",
    description: "The Sentry Native SDK is an error and crash reporting client for native \
                  applications, optimized for C and C++. Sentry allows to add tags, \
                  breadcrumbs and arbitrary custom context to enrich error reports.",
    homepage: "https://github.com/getsentry/sentry-native",
    url: "https://github.com/conan-io/conan-center-index",
    license: "MIT",
    topics: &["breakpad", "crashpad", "error-reporting", "crash-reporting"],
    exports: &[Export {
        file: "musl.patch",
        contents: include_str!("exports/musl.patch"),
    }],
};

const SOURCES: &str = include_str!("sources/sentry-native.toml");

const LIBCURL: &str = "libcurl/7.71.0";

/// First release whose in-process backend works on Windows.
const INPROC_WINDOWS_SINCE: &str = "0.4";

const BUILD_ID_FLAG: &str = "-Wl,-E,--build-id=sha1";

const EXECINFO: SystemPackage = SystemPackage {
    manager: "apk",
    args: &["add", "libexecinfo-dev"],
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SentryNative;

impl Recipe for SentryNative {
    fn descriptor(&self) -> &'static RecipeDescriptor {
        &DESCRIPTOR
    }

    fn options(&self) -> OptionSchema {
        OptionSchema::new(vec![
            OptionDecl::boolean("shared", false),
            OptionDecl::boolean("fPIC", true),
            OptionDecl::tokens(
                "backend",
                &["none", "inproc", "crashpad", "breakpad"],
                "inproc",
            ),
            OptionDecl::tokens("transport", &["none", "curl", "winhttp"], "curl"),
        ])
    }

    fn sources(&self) -> Result<SourceTable, RecipeError> {
        SourceTable::parse(DESCRIPTOR.name, SOURCES)
    }

    fn archive_root(&self, version: &Version) -> String {
        format!("sentry-native-{version}")
    }

    fn config_options(&self, ctx: &RecipeContext, options: &mut OptionSet) {
        if ctx.settings.os == Os::Windows {
            options.remove("fPIC");
        }
    }

    fn configure(&self, ctx: &RecipeContext) -> Result<(), RecipeError> {
        if ctx.options.text("backend") == Some("inproc")
            && ctx.settings.os == Os::Windows
            && ctx.version < Version::from(INPROC_WINDOWS_SINCE)
        {
            return Err(RecipeError::InvalidConfiguration(
                "The in-process backend is not supported on Windows".to_string(),
            ));
        }
        Ok(())
    }

    fn requirements(&self, ctx: &RecipeContext) -> Result<Vec<Requirement>, RecipeError> {
        let mut reqs = Vec::new();
        if ctx.options.text("transport") == Some("curl") {
            let libcurl: PackageReference = LIBCURL.parse().map_err(|e| {
                RecipeError::InvalidConfiguration(format!("bad requirement {LIBCURL}: {e}"))
            })?;
            reqs.push(Requirement::public(libcurl));
        }

        match ctx.options.text("backend") {
            Some("crashpad") => Err(RecipeError::Unavailable(
                "crashpad not available yet in CCI".to_string(),
            )),
            Some("breakpad") => Err(RecipeError::Unavailable(
                "breakpad not available yet in CCI".to_string(),
            )),
            _ => Ok(reqs),
        }
    }

    fn system_requirements(&self, ctx: &RecipeContext) -> Vec<SystemPackage> {
        if ctx.host.is_alpine() {
            vec![EXECINFO]
        } else {
            Vec::new()
        }
    }

    fn patches(&self, ctx: &RecipeContext) -> Vec<PatchSpec> {
        if ctx.host.is_alpine() {
            vec![PatchSpec {
                file: "musl.patch",
                phase: PatchPhase::Source,
                strip: 1,
            }]
        } else {
            Vec::new()
        }
    }

    fn cmake_definitions(&self, ctx: &RecipeContext) -> Vec<(String, Definition)> {
        let text = |name: &str| Definition::from(ctx.options.text(name).unwrap_or_default());
        vec![
            ("SENTRY_BACKEND".to_string(), text("backend")),
            ("SENTRY_ENABLE_INSTALL".to_string(), Definition::Bool(true)),
            ("SENTRY_TRANSPORT".to_string(), text("transport")),
            (
                "SENTRY_PIC".to_string(),
                Definition::Bool(ctx.options.bool("fPIC").unwrap_or(false)),
            ),
        ]
    }

    fn post_package(&self, _ctx: &RecipeContext) -> Vec<CleanupRule> {
        vec![
            CleanupRule::RemoveDir("lib/cmake"),
            CleanupRule::RemoveGlob("bin/*.pdb"),
        ]
    }

    fn package_info(
        &self,
        ctx: &RecipeContext,
        _package_dir: &Path,
    ) -> Result<PackageMetadata, RecipeError> {
        let os = ctx.settings.os;
        let mut info = PackageMetadata {
            libs: vec!["sentry".to_string()],
            ..PackageMetadata::default()
        };

        if matches!(os, Os::Android | Os::Linux) {
            info.exe_link_flags = vec![BUILD_ID_FLAG.to_string()];
            info.shared_link_flags = vec![BUILD_ID_FLAG.to_string()];
        }
        if os == Os::Linux {
            info.system_libs = vec!["pthread".to_string(), "dl".to_string()];
        }
        // Keyed on the build host, not the target.
        if ctx.host.is_alpine() {
            info.system_libs.push("execinfo".to_string());
        } else if os == Os::Windows {
            info.system_libs = ["winhttp", "dbghelp", "pathcch", "shlwapi"]
                .map(String::from)
                .to_vec();
        }

        if ctx.options.bool("shared") == Some(false) {
            info.defines = vec!["SENTRY_BUILD_STATIC".to_string()];
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmake::CMake;
    use crate::paths::WorkLayout;
    use crate::recipe::compatibility_key;
    use crate::recipes::fixtures::{alpine, debian, linux_gcc, resolve, windows_vs, with_os};
    use kiln_schema::{CompatibilityKey, MsvcRuntime};

    const V: &str = "0.4.1";

    fn info(ctx: &RecipeContext) -> PackageMetadata {
        SentryNative.package_info(ctx, Path::new("/unused")).unwrap()
    }

    #[test]
    fn test_fpic_present_off_windows() {
        for os in [Os::Linux, Os::Macos, Os::Android, Os::FreeBsd, Os::Ios] {
            let ctx = resolve(&SentryNative, &with_os(os), &[], V, &debian()).unwrap();
            assert_eq!(ctx.options.bool("fPIC"), Some(true), "{os}");
        }
    }

    #[test]
    fn test_fpic_removed_on_every_windows_compiler() {
        let vs = resolve(&SentryNative, &windows_vs("16", MsvcRuntime::MD), &[], V, &debian()).unwrap();
        assert!(!vs.options.contains("fPIC"));

        let mingw = kiln_schema::Settings {
            os: Os::Windows,
            ..linux_gcc()
        };
        let ctx = resolve(&SentryNative, &mingw, &[], V, &debian()).unwrap();
        assert!(!ctx.options.contains("fPIC"));

        let defs = SentryNative.cmake_definitions(&ctx);
        assert!(defs.contains(&("SENTRY_PIC".to_string(), Definition::Bool(false))));
    }

    #[test]
    fn test_inproc_on_old_windows_rejected() {
        let settings = windows_vs("16", MsvcRuntime::MD);
        let err = resolve(&SentryNative, &settings, &[], "0.3.4", &debian()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: The in-process backend is not supported on Windows"
        );

        // Other backends, newer versions and other targets are fine
        assert!(resolve(&SentryNative, &settings, &[("backend", "none")], "0.3.4", &debian()).is_ok());
        assert!(resolve(&SentryNative, &settings, &[], "0.4", &debian()).is_ok());
        assert!(resolve(&SentryNative, &linux_gcc(), &[], "0.3.4", &debian()).is_ok());
    }

    #[test]
    fn test_unavailable_backends() {
        for (backend, msg) in [
            ("crashpad", "crashpad not available yet in CCI"),
            ("breakpad", "breakpad not available yet in CCI"),
        ] {
            let ctx = resolve(&SentryNative, &linux_gcc(), &[("backend", backend)], V, &debian())
                .unwrap();
            let err = SentryNative.requirements(&ctx).unwrap_err();
            assert!(matches!(&err, RecipeError::Unavailable(m) if m == msg), "{err}");
        }
    }

    #[test]
    fn test_out_of_domain_backend() {
        let err = resolve(&SentryNative, &linux_gcc(), &[("backend", "minidump")], V, &debian())
            .unwrap_err();
        assert!(matches!(err, RecipeError::Option(_)));
    }

    #[test]
    fn test_linux_inproc_curl() {
        let ctx = resolve(&SentryNative, &linux_gcc(), &[], V, &debian()).unwrap();

        let reqs = SentryNative.requirements(&ctx).unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].to_string(), "libcurl/7.71.0");

        let info = info(&ctx);
        assert_eq!(info.libs, vec!["sentry"]);
        assert_eq!(info.system_libs, vec!["pthread", "dl"]);
        for windows_lib in ["winhttp", "dbghelp", "pathcch", "shlwapi"] {
            assert!(!info.system_libs.iter().any(|l| l == windows_lib));
        }
        assert_eq!(info.exe_link_flags, vec!["-Wl,-E,--build-id=sha1"]);
        assert_eq!(info.shared_link_flags, vec!["-Wl,-E,--build-id=sha1"]);
    }

    #[test]
    fn test_no_curl_without_curl_transport() {
        for transport in ["none", "winhttp"] {
            let ctx =
                resolve(&SentryNative, &linux_gcc(), &[("transport", transport)], V, &debian())
                    .unwrap();
            assert!(SentryNative.requirements(&ctx).unwrap().is_empty());
        }
    }

    #[test]
    fn test_static_define() {
        let ctx = resolve(&SentryNative, &linux_gcc(), &[], V, &debian()).unwrap();
        assert_eq!(info(&ctx).defines, vec!["SENTRY_BUILD_STATIC"]);

        let ctx = resolve(&SentryNative, &linux_gcc(), &[("shared", "True")], V, &debian()).unwrap();
        assert!(info(&ctx).defines.is_empty());
    }

    #[test]
    fn test_windows_system_libs() {
        let ctx = resolve(&SentryNative, &windows_vs("16", MsvcRuntime::MD), &[], V, &debian())
            .unwrap();
        let info = info(&ctx);
        assert_eq!(info.system_libs, vec!["winhttp", "dbghelp", "pathcch", "shlwapi"]);
        assert!(info.exe_link_flags.is_empty());
    }

    #[test]
    fn test_android_flags_without_system_libs() {
        let ctx = resolve(&SentryNative, &with_os(Os::Android), &[], V, &debian()).unwrap();
        let info = info(&ctx);
        assert_eq!(info.exe_link_flags, vec!["-Wl,-E,--build-id=sha1"]);
        assert!(info.system_libs.is_empty());
    }

    #[test]
    fn test_alpine_host() {
        let ctx = resolve(&SentryNative, &linux_gcc(), &[], V, &alpine()).unwrap();
        assert_eq!(info(&ctx).system_libs, vec!["pthread", "dl", "execinfo"]);
        assert_eq!(SentryNative.system_requirements(&ctx), vec![EXECINFO]);
        let patches = SentryNative.patches(&ctx);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].file, "musl.patch");
        assert_eq!(patches[0].phase, PatchPhase::Source);

        let ctx = resolve(&SentryNative, &linux_gcc(), &[], V, &debian()).unwrap();
        assert!(SentryNative.system_requirements(&ctx).is_empty());
        assert!(SentryNative.patches(&ctx).is_empty());
    }

    #[test]
    fn test_cmake_definitions() {
        let ctx = resolve(
            &SentryNative,
            &linux_gcc(),
            &[("backend", "none"), ("transport", "none")],
            V,
            &debian(),
        )
        .unwrap();
        let layout = WorkLayout::new(Path::new("/w"), "sentry-native", V);
        let cmake = CMake::for_recipe(&SentryNative, &ctx, &layout);

        assert_eq!(cmake.source_dir, layout.source);
        assert_eq!(cmake.definition("SENTRY_BACKEND"), Some(&Definition::from("none")));
        assert_eq!(cmake.definition("SENTRY_TRANSPORT"), Some(&Definition::from("none")));
        assert_eq!(cmake.definition("SENTRY_ENABLE_INSTALL"), Some(&Definition::Bool(true)));
        assert_eq!(cmake.definition("SENTRY_PIC"), Some(&Definition::Bool(true)));
        assert_eq!(cmake.definition("BUILD_SHARED_LIBS"), Some(&Definition::Bool(false)));
        assert!(
            cmake
                .configure_command()
                .has_arg("-DSENTRY_ENABLE_INSTALL=ON")
        );
    }

    #[test]
    fn test_key_is_unchanged() {
        let ctx = resolve(&SentryNative, &linux_gcc(), &[], V, &debian()).unwrap();
        let reqs = SentryNative.requirements(&ctx).unwrap();
        let key = compatibility_key(&SentryNative, &ctx, &reqs);
        assert_eq!(key, CompatibilityKey::new(&ctx.settings, &ctx.options, &reqs));
        assert!(key.settings.contains_key("compiler"));
        assert_eq!(key.options["backend"], "inproc");
    }
}
