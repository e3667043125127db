mod commands;
mod logging;
mod progress;

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{CommandFactory, Parser};
use collateral_core::audit::{audit_roots, AuditStatus};
use collateral_core::{AppConfig, CrawlEngine, Error, MirrorDriver, ScratchArea};
use colored::*;
use commands::{Cli, Commands, CrawlArgs};
use dotenv::dotenv;
use progress::CliReporter;
use tracing::{error, info};

const EXIT_ERROR: i32 = 1;
const EXIT_INTERRUPTED: i32 = 2;

fn main() {
    dotenv().ok();

    let guard = logging::init_logger(&logging::LogSettings::from_env());
    let args = Cli::parse();

    let code = match run(args) {
        Ok(()) => 0,
        Err(err) => match err.downcast_ref::<Error>() {
            Some(Error::Interrupted) => {
                eprintln!("{}", "Interrupted by user".yellow());
                EXIT_INTERRUPTED
            }
            _ => {
                error!("Error: {:#}", err);
                EXIT_ERROR
            }
        },
    };

    drop(guard);
    process::exit(code);
}

fn run(args: Cli) -> anyhow::Result<()> {
    let config = collateral_core::config::load_configuration(args.config.as_deref())
        .context("loading configuration")?;

    match args.command {
        Some(Commands::Crawl(crawl)) => run_crawl(config, &crawl),
        Some(Commands::Audit { roots }) => run_audit(&roots),
        Some(Commands::PrintConfig) => {
            let mut shown = config;
            if shown.password.is_some() {
                shown.password = Some("********".into());
            }
            println!("Configuration: {:#?}", shown);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    }
}

fn run_crawl(mut config: AppConfig, args: &CrawlArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.validate()?;
    let mirror = config
        .mirror_root
        .clone()
        .ok_or_else(|| anyhow!("no catalog source configured; pass --mirror or set mirror_root"))?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("installing interrupt handler")?;

    let scratch = ScratchArea::create(config.keep_downloads)?;
    let mut driver = MirrorDriver::open(&mirror, &scratch.downloads_dir())
        .with_context(|| format!("opening catalog mirror {}", mirror.display()))?;
    info!("Crawling {} into {}", mirror.display(), config.output_root.display());

    let output_root = config.output_root.clone();
    let engine = CrawlEngine::new(config);
    let reporter = CliReporter::new();
    let result = engine.run(&mut driver, &scratch, &reporter, &cancel);
    reporter.finish();
    let summary = result?;
    scratch.close()?;

    println!();
    println!(
        "Completed {} product(s). Output -> {}",
        format!("{}", summary.completed.len()).green(),
        output_root.display()
    );
    if !summary.failed.is_empty() {
        println!("{} failed:", format!("{}", summary.failed.len()).red());
        for (code, reason) in &summary.failed {
            println!("  * {}: {}", code, reason);
        }
    }
    if !summary.skipped.is_empty() {
        println!(
            "{} skipped (already present)",
            format!("{}", summary.skipped.len()).yellow()
        );
    }
    info!(
        "Run started {} took {:.2}s",
        summary.started_at,
        summary.duration.as_secs_f64()
    );
    Ok(())
}

fn run_audit(roots: &[std::path::PathBuf]) -> anyhow::Result<()> {
    let report = audit_roots(roots)?;
    println!(
        "Validated {} product folders: OK={}, WARN={}",
        report.directories.len(),
        format!("{}", report.ok()).green(),
        format!("{}", report.warn()).yellow(),
    );
    for dir in &report.directories {
        if dir.status != AuditStatus::Ok {
            println!("- {}: {}", dir.product, "WARN".yellow());
            for issue in &dir.issues {
                println!("  * {}", issue);
            }
        }
        for fix in &dir.fixed {
            println!("  fixed: {}", fix);
        }
    }
    Ok(())
}
