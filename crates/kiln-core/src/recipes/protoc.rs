//! Protocol Buffers compiler, 3.11.x line.

use std::path::Path;

use kiln_schema::{
    CompatibilityKey, OptionDecl, OptionSchema, OptionSet, Os, PackageMetadata,
    PackageReference, Requirement, Version,
};

use crate::cmake::Definition;
use crate::packager::collect_libs;
use crate::recipe::{
    Export, PatchPhase, PatchSpec, Recipe, RecipeContext, RecipeDescriptor, RecipeError,
    SourceTable,
};

static DESCRIPTOR: RecipeDescriptor = RecipeDescriptor {
    name: "protoc",
    description: "Protocol Buffers C/C++ Compiler - Google's data interchange format",
    homepage: "https://github.com/protocolbuffers/protobuf",
    url: "https://github.com/conan-io/conan-center-index",
    license: "BSD-3-Clause",
    topics: &[
        "protobuf",
        "protocol-buffers",
        "protocol-compiler",
        "serialization",
        "rpc",
    ],
    exports: &[Export {
        file: "protoc.patch",
        contents: include_str!("exports/protoc.patch"),
    }],
};

const SOURCES: &str = include_str!("sources/protoc.toml");

/// Minimum Visual Studio major version (2015).
const MIN_VISUAL_STUDIO: &str = "14";

#[derive(Debug, Clone, Copy, Default)]
pub struct Protoc;

impl Protoc {
    fn is_windows_msvc(ctx: &RecipeContext) -> bool {
        ctx.settings.os == Os::Windows && ctx.settings.compiler.is_visual_studio()
    }
}

impl Recipe for Protoc {
    fn descriptor(&self) -> &'static RecipeDescriptor {
        &DESCRIPTOR
    }

    fn options(&self) -> OptionSchema {
        OptionSchema::new(vec![
            OptionDecl::boolean("shared", false),
            OptionDecl::boolean("with_zlib", false),
            OptionDecl::boolean("fPIC", true),
            OptionDecl::boolean("lite", false),
        ])
    }

    fn sources(&self) -> Result<SourceTable, RecipeError> {
        SourceTable::parse(DESCRIPTOR.name, SOURCES)
    }

    fn archive_root(&self, version: &Version) -> String {
        format!("protobuf-{version}")
    }

    fn config_options(&self, ctx: &RecipeContext, options: &mut OptionSet) {
        if Self::is_windows_msvc(ctx) {
            options.remove("fPIC");
        }
    }

    fn configure(&self, ctx: &RecipeContext) -> Result<(), RecipeError> {
        if Self::is_windows_msvc(ctx)
            && *ctx.settings.compiler.version() < Version::from(MIN_VISUAL_STUDIO)
        {
            return Err(RecipeError::InvalidConfiguration(
                "On Windows Protobuf can only be built with Visual Studio 2015 or higher."
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn requirements(&self, ctx: &RecipeContext) -> Result<Vec<Requirement>, RecipeError> {
        let protobuf =
            PackageReference::new("protobuf", ctx.version.as_str()).with_channel("shift5", "stable");
        Ok(vec![Requirement::public(protobuf)])
    }

    fn patches(&self, _ctx: &RecipeContext) -> Vec<PatchSpec> {
        vec![PatchSpec {
            file: "protoc.patch",
            phase: PatchPhase::Build,
            strip: 1,
        }]
    }

    fn cmake_subdir(&self) -> Option<&'static str> {
        Some("cmake")
    }

    fn cmake_definitions(&self, ctx: &RecipeContext) -> Vec<(String, Definition)> {
        let mut defs = vec![
            ("protobuf_BUILD_TESTS".to_string(), Definition::Bool(false)),
            ("protobuf_WITH_ZLIB".to_string(), Definition::Bool(false)),
        ];
        if let Some(runtime) = ctx.settings.compiler.runtime() {
            defs.push((
                "protobuf_MSVC_STATIC_RUNTIME".to_string(),
                Definition::Bool(runtime.is_static()),
            ));
        }
        defs
    }

    fn package_info(
        &self,
        _ctx: &RecipeContext,
        package_dir: &Path,
    ) -> Result<PackageMetadata, RecipeError> {
        let mut libs = collect_libs(&package_dir.join("lib"))?;
        // Published in reverse name order.
        libs.sort_by(|a, b| b.cmp(a));

        let mut info = PackageMetadata {
            libs,
            ..PackageMetadata::default()
        };
        info.names
            .insert("cmake_find_package".to_string(), "protoc".to_string());
        info.names
            .insert("cmake_find_package_multi".to_string(), "protoc".to_string());
        Ok(info)
    }

    fn package_id(&self, ctx: &RecipeContext, key: &mut CompatibilityKey) {
        key.remove_setting("compiler");
        key.remove_setting("arch");
        key.include_build_settings(&ctx.settings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmake::CMake;
    use crate::paths::WorkLayout;
    use crate::recipe::compatibility_key;
    use crate::recipes::fixtures::{debian, linux_gcc, resolve, windows_vs};
    use kiln_schema::{Arch, Compiler, MsvcRuntime, Visibility};
    use tempfile::tempdir;

    #[test]
    fn test_fpic_default_on_linux() {
        let ctx = resolve(&Protoc, &linux_gcc(), &[], "3.11.4", &debian()).unwrap();
        assert_eq!(ctx.options.bool("fPIC"), Some(true));
        assert_eq!(ctx.options.bool("shared"), Some(false));
    }

    #[test]
    fn test_fpic_removed_for_visual_studio() {
        let settings = windows_vs("16", MsvcRuntime::MD);
        let ctx = resolve(&Protoc, &settings, &[("fPIC", "True")], "3.11.4", &debian()).unwrap();
        assert!(!ctx.options.contains("fPIC"));
        assert_eq!(ctx.options.get_safe("fPIC"), None);
    }

    #[test]
    fn test_old_visual_studio_rejected() {
        let settings = windows_vs("12", MsvcRuntime::MD);
        let err = resolve(&Protoc, &settings, &[], "3.11.4", &debian()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: On Windows Protobuf can only be built with Visual Studio 2015 or higher."
        );

        assert!(resolve(&Protoc, &windows_vs("14", MsvcRuntime::MD), &[], "3.11.4", &debian()).is_ok());
    }

    #[test]
    fn test_full_visual_studio_version_checked() {
        for old in ["12.0.40629.0", "13.0.1", "11.0.61030.0"] {
            let settings = windows_vs(old, MsvcRuntime::MD);
            assert!(
                resolve(&Protoc, &settings, &[], "3.11.4", &debian()).is_err(),
                "{old}"
            );
        }
        let settings = windows_vs("14.0.23918.0", MsvcRuntime::MD);
        assert!(resolve(&Protoc, &settings, &[], "3.11.4", &debian()).is_ok());
    }

    #[test]
    fn test_requires_matching_protobuf() {
        let ctx = resolve(&Protoc, &linux_gcc(), &[], "3.11.4", &debian()).unwrap();
        let reqs = Protoc.requirements(&ctx).unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].reference.to_string(), "protobuf/3.11.4@shift5/stable");
        assert_eq!(reqs[0].visibility, Visibility::Public);
    }

    #[test]
    fn test_cmake_definitions() {
        let layout = WorkLayout::new(Path::new("/w"), "protoc", "3.11.4");

        let ctx = resolve(&Protoc, &linux_gcc(), &[], "3.11.4", &debian()).unwrap();
        let cmake = CMake::for_recipe(&Protoc, &ctx, &layout);
        assert_eq!(cmake.source_dir, layout.source.join("cmake"));
        assert_eq!(cmake.definition("protobuf_BUILD_TESTS"), Some(&Definition::Bool(false)));
        assert_eq!(cmake.definition("protobuf_WITH_ZLIB"), Some(&Definition::Bool(false)));
        assert_eq!(cmake.definition("protobuf_MSVC_STATIC_RUNTIME"), None);
        assert_eq!(
            cmake.definition("CMAKE_POSITION_INDEPENDENT_CODE"),
            Some(&Definition::Bool(true))
        );
        assert_eq!(cmake.definition("CMAKE_BUILD_TYPE"), Some(&Definition::from("Release")));

        let ctx = resolve(&Protoc, &windows_vs("16", MsvcRuntime::MTd), &[], "3.11.4", &debian())
            .unwrap();
        let cmake = CMake::for_recipe(&Protoc, &ctx, &layout);
        assert_eq!(
            cmake.definition("protobuf_MSVC_STATIC_RUNTIME"),
            Some(&Definition::Bool(true))
        );
        assert_eq!(cmake.definition("CMAKE_POSITION_INDEPENDENT_CODE"), None);
        assert_eq!(cmake.definition("CMAKE_BUILD_TYPE"), None);

        let ctx = resolve(&Protoc, &windows_vs("16", MsvcRuntime::MD), &[], "3.11.4", &debian())
            .unwrap();
        let cmake = CMake::for_recipe(&Protoc, &ctx, &layout);
        assert_eq!(
            cmake.definition("protobuf_MSVC_STATIC_RUNTIME"),
            Some(&Definition::Bool(false))
        );
    }

    #[test]
    fn test_with_zlib_does_not_enable_zlib() {
        let ctx = resolve(&Protoc, &linux_gcc(), &[("with_zlib", "True")], "3.11.4", &debian())
            .unwrap();
        let defs = Protoc.cmake_definitions(&ctx);
        assert!(defs.contains(&("protobuf_WITH_ZLIB".to_string(), Definition::Bool(false))));
    }

    #[test]
    fn test_package_info_reverse_sorted_libs() {
        let dir = tempdir().unwrap();
        let lib = dir.path().join("lib");
        std::fs::create_dir_all(&lib).unwrap();
        for f in ["libprotobuf.a", "libprotoc.a", "libprotobuf-lite.a"] {
            std::fs::write(lib.join(f), b"").unwrap();
        }

        let ctx = resolve(&Protoc, &linux_gcc(), &[], "3.11.4", &debian()).unwrap();
        let info = Protoc.package_info(&ctx, dir.path()).unwrap();
        assert_eq!(info.libs, vec!["protoc", "protobuf-lite", "protobuf"]);
        assert_eq!(info.names["cmake_find_package"], "protoc");
        assert_eq!(info.names["cmake_find_package_multi"], "protoc");
        assert!(info.system_libs.is_empty());
    }

    #[test]
    fn test_key_ignores_compiler_and_arch() {
        let reqs = [Requirement::public(
            PackageReference::new("protobuf", "3.11.4").with_channel("shift5", "stable"),
        )];

        let gcc = linux_gcc();
        let clang_arm = kiln_schema::Settings {
            arch: Arch::Armv8,
            compiler: Compiler::Clang {
                version: Version::from("10"),
            },
            ..linux_gcc()
        };

        let a = resolve(&Protoc, &gcc, &[], "3.11.4", &debian()).unwrap();
        let b = resolve(&Protoc, &clang_arm, &[], "3.11.4", &debian()).unwrap();
        let key_a = compatibility_key(&Protoc, &a, &reqs);
        let key_b = compatibility_key(&Protoc, &b, &reqs);

        assert_eq!(key_a.digest(), key_b.digest());
        assert!(!key_a.settings.contains_key("compiler"));
        assert!(!key_a.settings.contains_key("compiler.version"));
        assert!(!key_a.settings.contains_key("arch"));
        assert_eq!(key_a.settings["os_build"], "Linux");
        assert_eq!(key_a.settings["arch_build"], "x86_64");

        // Build machine and build type still matter
        let other_build = kiln_schema::Settings {
            arch_build: Arch::Armv8,
            ..linux_gcc()
        };
        let c = resolve(&Protoc, &other_build, &[], "3.11.4", &debian()).unwrap();
        assert_ne!(key_a.digest(), compatibility_key(&Protoc, &c, &reqs).digest());
    }
}
