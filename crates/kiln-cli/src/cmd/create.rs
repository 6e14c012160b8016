//! Create command: run the whole lifecycle for one recipe.

use anyhow::{Context as _, Result};
use kiln_core::io::download::HttpFetcher;
use kiln_core::process::{CommandRunner, RecordingRunner, SystemRunner};
use kiln_core::{PackageReport, Reporter};
use kiln_schema::PackageName;
use std::sync::Arc;

use crate::TargetArgs;
use crate::ops::Context;
use crate::ui::ConsoleReporter;

pub async fn create(ctx: &Context, args: &TargetArgs, verbose: bool, dry_run: bool) -> Result<()> {
    let target = ctx.target(args)?;
    let name = PackageName::new(target.recipe.descriptor().name);
    let version = target.version.clone();

    let reporter = Arc::new(ConsoleReporter::new());
    let recorder = Arc::new(RecordingRunner::new());
    let log_path = ctx.home.build_log_path(name.as_str(), version.as_str());
    let runner: Arc<dyn CommandRunner> = if dry_run {
        recorder.clone()
    } else {
        Arc::new(SystemRunner::new(log_path.clone()).verbose(verbose))
    };
    let fetcher =
        HttpFetcher::new(ctx.home.cache_dir()).context("Failed to create HTTP client")?;

    let pipeline = ctx
        .pipeline(target)
        .with_runner(runner)
        .with_reporter(reporter.clone());

    let result: Result<PackageReport, kiln_core::PipelineError> = async {
        pipeline
            .resolve()?
            .requirements()?
            .system_requirements()?
            .acquire(&fetcher)
            .await?
            .build()?
            .package()?
            .finish()
    }
    .await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            reporter.failed(&name, &version, &e.to_string());
            return Err(e.into());
        }
    };

    if dry_run {
        reporter.info("Commands that would run:");
        for cmd in recorder.calls() {
            println!("{cmd}");
        }
    } else if !verbose {
        reporter.info(&format!("Build log: {}", log_path.display()));
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
