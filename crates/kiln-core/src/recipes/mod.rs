//! Built-in recipes.

mod protoc;
mod sentry_native;

pub use protoc::Protoc;
pub use sentry_native::SentryNative;

use crate::recipe::Recipe;

static PROTOC: Protoc = Protoc;
static SENTRY_NATIVE: SentryNative = SentryNative;

/// Every built-in recipe, in name order.
pub fn all() -> [&'static dyn Recipe; 2] {
    [&PROTOC, &SENTRY_NATIVE]
}

/// Find a recipe by name (case-insensitive).
pub fn lookup(name: &str) -> Option<&'static dyn Recipe> {
    all()
        .into_iter()
        .find(|r| r.descriptor().name.eq_ignore_ascii_case(name))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("protoc").unwrap().descriptor().name, "protoc");
        assert_eq!(
            lookup("Sentry-Native").unwrap().descriptor().name,
            "sentry-native"
        );
        assert!(lookup("zlib").is_none());
    }

    #[test]
    fn test_embedded_sources_parse() {
        for recipe in all() {
            let table = recipe.sources().unwrap();
            assert!(!table.versions().is_empty(), "{}", recipe.descriptor().name);
        }
    }

    #[test]
    fn test_every_patch_is_exported() {
        use super::fixtures::{alpine, linux_gcc, resolve};

        for recipe in all() {
            let d = recipe.descriptor();
            for export in d.exports {
                assert!(export.contents.starts_with("--- a/"), "{}", export.file);
                assert!(export.contents.contains("\n+++ b/"), "{}", export.file);
                assert!(export.contents.contains("\n@@ "), "{}", export.file);
            }

            let versions = recipe.sources().unwrap().versions();
            let newest = versions.last().unwrap().to_string();
            let ctx = resolve(recipe, &linux_gcc(), &[], &newest, &alpine()).unwrap();
            for patch in recipe.patches(&ctx) {
                assert!(d.export_names().contains(&patch.file), "{}", patch.file);
            }
        }
    }
}
