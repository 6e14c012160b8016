//! Tables for `kiln list` and `kiln inspect`.

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use kiln_schema::OptionSchema;

fn base(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

/// One row per declared option: name, legal values, default.
pub fn options_table(schema: &OptionSchema) -> Table {
    let mut table = base(&["Option", "Values", "Default"]);
    for decl in schema.iter() {
        table.add_row(vec![
            decl.name.clone(),
            decl.domain.to_string(),
            decl.default.to_string(),
        ]);
    }
    table
}

/// A row of `kiln list` output.
#[derive(Debug, Clone)]
pub struct RecipeRow {
    pub name: &'static str,
    pub versions: Vec<String>,
    pub license: &'static str,
    pub description: &'static str,
}

pub fn recipes_table(rows: &[RecipeRow]) -> Table {
    let mut table = base(&["Recipe", "Versions", "License", "Description"]);
    for row in rows {
        table.add_row(vec![
            row.name.to_string(),
            row.versions.join(", "),
            row.license.to_string(),
            row.description.to_string(),
        ]);
    }
    table
}
