//! Laravel E2E - run the acceptance suite against a Laravel application

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use laravel_e2e::{Environment, FileConfig, HarnessConfig, Overrides, TestRunner};

/// Acceptance tests for a Laravel application across device profiles
#[derive(Parser)]
#[command(name = "laravel-e2e")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = "harness.toml")]
    config: PathBuf,

    /// Only run cases whose "suite › case" title contains this text
    #[arg(short, long)]
    grep: Option<String>,

    /// Only run these projects (repeatable)
    #[arg(short, long = "project")]
    projects: Vec<String>,

    /// Number of concurrent workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Retries for failing cases
    #[arg(long)]
    retries: Option<u32>,

    /// Print the planned cases without running them
    #[arg(long)]
    list: bool,

    /// Verbose logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    let filter = if cli.debug {
        tracing_subscriber::EnvFilter::new(log_level)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let overrides = Overrides {
        grep: cli.grep,
        projects: cli.projects,
        workers: cli.workers,
        retries: cli.retries,
    };
    let config = match FileConfig::load(&cli.config)
        .and_then(|file| HarnessConfig::resolve(file, &Environment::from_env(), overrides))
    {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    let mut runner = TestRunner::new(config);

    if cli.list {
        let plan = runner.plan();
        for case in &plan {
            println!("[{}] › {}", case.project.name, case.check.full_title());
        }
        println!("Total: {} test(s)", plan.len());
        return ExitCode::SUCCESS;
    }

    if let Err(e) = runner.start_server().await {
        error!("{}", e);
        return ExitCode::from(2);
    }

    let report = match runner.run().await {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };
    runner.stop_server();

    if let Err(e) = runner.write_reports(&report) {
        error!("Failed to write reports: {}", e);
        return ExitCode::from(2);
    }

    if report.success() {
        info!("All {} test(s) passed", report.total());
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
