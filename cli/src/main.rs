//! cdrimport - one import pass over every configured CDR source

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use cdrimport::{
    init_logging, load_config, EventSink, ImportEvent, LogConfig, LogLevel, Scheduler,
    TracingSink,
};
use clap::Parser;
use tracing::{info, warn};

const EXIT_ERRORS: u8 = 1;
const EXIT_STARTUP: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "cdrimport",
    version,
    about = "Imports fixed-width call-detail records into delimited output files"
)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "CDRIMPORT_CONFIG", default_value = "cdrimport.json")]
    config: PathBuf,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, env = "CDRIMPORT_LOG_LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Number of files processed in parallel; overrides the config file
    #[arg(short, long, env = "CDRIMPORT_WORKERS")]
    workers: Option<i64>,
}

enum Outcome {
    Clean,
    ErrorsOccurred,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(Outcome::Clean) => ExitCode::SUCCESS,
        Ok(Outcome::ErrorsOccurred) => {
            eprintln!("One or more errors occurred. See log for details");
            ExitCode::from(EXIT_ERRORS)
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

fn run(cli: &Cli) -> Result<Outcome> {
    let loaded = load_config(&cli.config);

    // The log file location comes from the config; without one, log to the
    // console only so the failure is still recorded.
    let log_config = LogConfig::new()
        .with_level(cli.log_level)
        .with_logs_directory(loaded.as_ref().ok().and_then(|c| c.logs_path()));
    let log = init_logging(&log_config).context("Failed to initialize logging")?;
    let sink = Arc::new(TracingSink::new(Some(log)));

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            return Err(critical(&sink, "config", e))
                .with_context(|| format!("Failed to load {}", cli.config.display()));
        }
    };

    if let Some(workers) = cli.workers {
        config.worker_count = workers;
    }

    let scheduler = match Scheduler::from_config(&config, sink.clone()) {
        Ok(scheduler) => scheduler,
        Err(e) => return Err(critical(&sink, "registry", e)).context("Invalid configuration"),
    };

    let cancel = scheduler.cancel_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        cancel.store(true, Ordering::Relaxed);
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    info!(
        "Importing {} sources with {} workers",
        scheduler.sources().len(),
        scheduler.worker_count()
    );

    let summary = match scheduler.run() {
        Ok(summary) => summary,
        Err(e) => return Err(critical(&sink, "scheduler", e)).context("Import run failed"),
    };

    if summary.has_errors() || sink.errors_occurred() {
        Ok(Outcome::ErrorsOccurred)
    } else {
        Ok(Outcome::Clean)
    }
}

/// Logs a startup failure at critical severity and hands the error back.
fn critical<E: std::fmt::Display>(sink: &TracingSink, module: &str, error: E) -> E {
    sink.report(ImportEvent::Critical {
        module: module.to_string(),
        message: error.to_string(),
    });
    sink.flush();
    error
}
