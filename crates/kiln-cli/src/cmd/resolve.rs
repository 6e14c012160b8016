//! Resolve command: everything `create` would do, without doing it.

use anyhow::Result;
use crossterm::style::Stylize;
use kiln_schema::Visibility;

use crate::TargetArgs;
use crate::ops::Context;

pub fn resolve(ctx: &Context, args: &TargetArgs) -> Result<()> {
    let target = ctx.target(args)?;
    let planned = ctx.pipeline(target).resolve()?.requirements()?;
    let rc = planned.context();

    println!(
        "{} {}",
        rc.version.as_str().bold(),
        planned.source().url.as_str().dark_grey()
    );

    section("settings");
    for (key, value) in rc.settings.to_pairs() {
        println!("  {key}={value}");
    }
    println!("  os_build={}", rc.settings.os_build);
    println!("  arch_build={}", rc.settings.arch_build);

    section("options");
    for (key, value) in rc.options.iter() {
        println!("  {key}={value}");
    }

    section("requires");
    for req in planned.requires() {
        let visibility = match req.visibility {
            Visibility::Public => "public",
            Visibility::Private => "private",
        };
        println!("  {} ({visibility})", req.reference);
    }

    let packages = planned.system_packages();
    if !packages.is_empty() {
        section("system requirements");
        for package in &packages {
            println!("  {}", package.command_line(&rc.host));
        }
    }

    let patches = planned.patches();
    if !patches.is_empty() {
        section("patches");
        for patch in &patches {
            println!("  {} ({:?}, -p{})", patch.file, patch.phase, patch.strip);
        }
    }

    section("cmake");
    println!("  {}", planned.cmake().configure_command());

    section("package id");
    println!("  {}", planned.compatibility_key().digest().as_str());
    Ok(())
}

fn section(title: &str) {
    println!();
    println!("{}", format!("[{title}]").cyan());
}
