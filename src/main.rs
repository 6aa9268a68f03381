//! ARV-SCOUT: listing screener with after-repair-value estimates
//!
//! Entry point. Parses the command line, loads configuration, initialises
//! structured logging, wires the provider stack to the response cache and
//! daily budget, and runs the pipeline once. The exit status tells the
//! caller whether the run finished, ran out of budget, or failed.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chrono::{Local, Utc};
use clap::Parser;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use arv_scout::config::AppConfig;
use arv_scout::engine::{CsvSink, PipelineOrchestrator, RunSummary};
use arv_scout::provider::{
    ProviderClient, RapidApiTransport, RateBudget, RetryPolicy, RetryingGateway,
};
use arv_scout::storage::CacheStore;
use arv_scout::types::{PipelineFailure, EXIT_FATAL};

#[derive(Parser, Debug)]
#[command(name = "arv-scout")]
#[command(version, about = "Screen for-sale listings against comp-based ARV estimates")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml", env = "ARV_SCOUT_CONFIG")]
    config: String,

    /// Output CSV path (default: out/properties_<timestamp>.csv)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Path to a JSON file of settings parsed from a free-text prompt,
    /// layered under the config file
    #[arg(long)]
    overlay: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let span = info_span!("run", run_id = %Uuid::new_v4());
    let result = run(&cli).instrument(span.clone()).await;
    let _enter = span.enter();

    match result {
        Ok(summary) => {
            info!(
                hits = summary.hits,
                rows = summary.rows_written,
                screened_out = summary.screened_out,
                calls = summary.calls_admitted,
                "ARV-SCOUT finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = match e.downcast_ref::<PipelineFailure>() {
                Some(failure) => {
                    error!(
                        property = failure.property.as_deref().unwrap_or("-"),
                        stage = %failure.stage,
                        error = %failure.error,
                        "Run aborted"
                    );
                    eprintln!("arv-scout: {failure}");
                    failure.exit_code()
                }
                None => {
                    error!(error = format!("{e:#}"), "Run aborted");
                    eprintln!("arv-scout: {e:#}");
                    EXIT_FATAL
                }
            };
            ExitCode::from(code)
        }
    }
}

/// Wire everything up and run the pipeline once.
async fn run(cli: &Cli) -> Result<RunSummary> {
    let config = AppConfig::load(&cli.config, cli.overlay.as_deref())?;
    debug!(config = ?config, "Merged configuration");
    if let Some(prompt) = &config.prompt {
        info!(prompt = %prompt, "Run intent");
    }
    info!(
        geos = ?config.filters.geos,
        page_cap = config.filters.page_cap,
        daily_limit = config.provider.daily_limit,
        "ARV-SCOUT starting up"
    );

    let transport = RapidApiTransport::from_env(&config.provider)?;

    let cache = if config.cache.enabled {
        CacheStore::open(&config.cache.path).await?
    } else {
        info!("Response cache disabled; using an in-memory store for this run");
        CacheStore::in_memory().await?
    };
    if config.cache.clear_before_run {
        let removed = cache.clear().await?;
        info!(removed, "Response cache cleared");
    }

    // -- Restore today's call count --------------------------------------

    let today = Utc::now().date_naive();
    let used = cache.calls_on(today).await?;
    let budget = RateBudget::resume(config.provider.daily_limit, today, used);
    info!(
        day = %today,
        used,
        remaining = budget.remaining(),
        "Call budget loaded"
    );

    // -- Pipeline ---------------------------------------------------------

    let gateway = RetryingGateway::new(
        transport,
        cache,
        budget,
        RetryPolicy::from(&config.provider),
    );
    let client = ProviderClient::new(gateway, &config);

    let out = cli.out.clone().unwrap_or_else(default_out_path);
    let sink = CsvSink::create(&out)?;

    let mut orchestrator = PipelineOrchestrator::new(client, &config, sink);
    let summary = orchestrator.run().await?;

    println!("Wrote {} rows → {}", summary.rows_written, out.display());
    Ok(summary)
}

fn default_out_path() -> PathBuf {
    PathBuf::from("out").join(format!(
        "properties_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Initialise the `tracing` subscriber.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = if verbose {
        "arv_scout=debug"
    } else {
        "arv_scout=info"
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let json_logging = std::env::var("ARV_SCOUT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_current_span(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
