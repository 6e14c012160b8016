//! Inspect command

use anyhow::Result;
use crossterm::style::Stylize;

use crate::ops::Context;
use crate::ui::table::options_table;

/// Show a recipe's descriptor and option schema
pub fn inspect(name: &str) -> Result<()> {
    let recipe = Context::recipe(name)?;
    let d = recipe.descriptor();
    let lw = 12;

    println!();
    println!("  {}", d.name.white().bold());
    println!("  {}", d.description);
    println!();
    println!("  {:<lw$}{}", "homepage", d.homepage);
    println!("  {:<lw$}{}", "url", d.url);
    println!("  {:<lw$}{}", "license", d.license);
    if !d.topics.is_empty() {
        println!("  {:<lw$}{}", "topics", d.topics.join(", "));
    }
    if !d.exports.is_empty() {
        println!("  {:<lw$}{}", "exports", d.export_names().join(", "));
    }
    println!();
    println!("{}", options_table(&recipe.options()));
    Ok(())
}
