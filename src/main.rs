use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use feedwatch::orchestrator::EXIT_CONFIG_ERROR;
use feedwatch::{AppConfig, Credentials, FileStateStore, Orchestrator, RunReport, Sinks};
use feedwatch_adapters::transport::HttpFetcher;

#[derive(Parser, Debug)]
#[command(name = "feedwatch")]
#[command(about = "Watch version manifests and flow forecasts, alert on change")]
#[command(version)]
struct Args {
    /// Path to the configuration file (TOML or YAML)
    #[arg(short, long, default_value = "feedwatch.toml")]
    config: PathBuf,

    /// Detect changes but do not notify or write state
    #[arg(long)]
    dry_run: bool,

    /// Exit with status 1 when any source failed
    #[arg(long)]
    strict: bool,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), "{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match run(config, args.dry_run) {
        Ok(report) => {
            for line in report.status_lines() {
                println!("{}", line);
            }
            if let Some(reason) = &report.aborted {
                error!(%reason, "Run aborted");
            }
            ExitCode::from(report.exit_code(args.strict))
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "feedwatch=debug,feedwatch_adapters=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(config: AppConfig, dry_run: bool) -> Result<RunReport> {
    let mut builder = HttpFetcher::builder().timeout(config.http_timeout);
    if let Some(user_agent) = &config.user_agent {
        builder = builder.user_agent(user_agent.clone());
    }
    let fetcher = builder.build().context("Failed to build HTTP client")?;

    let credentials = Credentials::from_env();
    let sinks = Sinks::from_config(&config, &credentials, &fetcher);
    let store = FileStateStore::new(&config.state_dir);

    info!(
        sources = config.sources.len(),
        forecasts = config.forecasts.len(),
        state_dir = %config.state_dir.display(),
        dry_run,
        "Starting run"
    );

    let orchestrator =
        Orchestrator::new(config, Box::new(fetcher), Box::new(store), sinks).dry_run(dry_run);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let report = rt.block_on(orchestrator.run());

    if let Some(path) = std::env::var_os("GITHUB_OUTPUT") {
        if let Err(e) = report.write_step_outputs(PathBuf::from(path).as_path()) {
            warn!(error = %e, "Failed to write step outputs");
        }
    }

    Ok(report)
}
