//! kiln - CMake package recipes CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use kiln_cli::cmd;
use kiln_cli::ops::Context;
use kiln_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => cmd::list::list(&Context::new(cli.recipes_dir, cli.work_dir)?),
        Commands::Inspect { recipe } => cmd::inspect::inspect(&recipe),
        Commands::Resolve { target } => {
            cmd::resolve::resolve(&Context::new(cli.recipes_dir, cli.work_dir)?, &target)
        }
        Commands::Create {
            target,
            verbose,
            dry_run,
        } => {
            let ctx = Context::new(cli.recipes_dir, cli.work_dir)?;
            cmd::create::create(&ctx, &target, verbose, dry_run).await
        }
    }
}
