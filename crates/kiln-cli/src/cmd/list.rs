use anyhow::Result;
use kiln_core::recipe::load_sources;
use kiln_core::recipes;

use crate::ops::Context;
use crate::ui::table::{RecipeRow, recipes_table};

/// List the built-in recipes and the versions they can build
pub fn list(ctx: &Context) -> Result<()> {
    let mut rows = Vec::new();
    for recipe in recipes::all() {
        let descriptor = recipe.descriptor();
        let versions = load_sources(recipe, &ctx.recipes_dir)?
            .versions()
            .iter()
            .map(ToString::to_string)
            .collect();
        rows.push(RecipeRow {
            name: descriptor.name,
            versions,
            license: descriptor.license,
            description: descriptor.description,
        });
    }

    println!("{}", recipes_table(&rows));
    Ok(())
}
