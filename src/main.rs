//! Apache Sites Exporter
//!
//! Exposes per-site Apache request metrics read from a named pipe.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Apache Sites Exporter                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  PipeReader  │───▶│   Metric     │◀───│   Metrics    │       │
//! │  │   (FIFO)     │    │   Registry   │    │   Server     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use apache_sites_exporter::config::{DEFAULT_FIFO_PATH, DEFAULT_MAX_LINE_LENGTH};
use apache_sites_exporter::{
    Error, MetricRegistry, MetricsServer, PipeReader, Result, ServiceConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Apache Sites Exporter - Prometheus metrics for per-site access logs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run the client as a (web) service
    #[arg(short, long)]
    service: bool,

    /// FIFO socket path
    #[arg(short, long, env = "APACHE_SITES_FIFO", default_value = DEFAULT_FIFO_PATH)]
    fifo: PathBuf,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9112")]
    metrics_addr: String,

    /// Also open the FIFO for writing so writer restarts are not treated as EOF (Linux only)
    #[arg(long, env = "FIFO_KEEP_OPEN")]
    keep_open: bool,

    /// Longest accepted log line in bytes
    #[arg(long, env = "MAX_LINE_LENGTH", default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    max_line_length: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// The service is the only action; running without it is a usage error.
    fn require_action(&self) -> std::result::Result<(), clap::Error> {
        if self.service {
            return Ok(());
        }
        Err(Args::command().error(
            ErrorKind::MissingRequiredArgument,
            "Please supply an action (--service).",
        ))
    }

    fn service_config(&self) -> Result<ServiceConfig> {
        let config = ServiceConfig {
            fifo_path: self.fifo.clone(),
            metrics_addr: ServiceConfig::parse_addr(&self.metrics_addr)?,
            keep_open: self.keep_open,
            max_line_length: self.max_line_length,
        };
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = args.require_action() {
        e.exit();
    }

    init_logging(&args);

    match run_service(&args).await {
        Ok(()) => {
            info!("Exporter shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_service(args: &Args) -> Result<()> {
    let config = args.service_config()?;

    info!("Starting Apache sites exporter");
    info!("  FIFO path: {}", config.fifo_path.display());
    info!("  Metrics address: {}", config.metrics_addr);
    info!("  Keep FIFO open: {}", config.keep_open);
    info!("  Max line length: {}", config.max_line_length);

    let registry = Arc::new(MetricRegistry::new()?);

    let mut reader = PipeReader::open(&config, Arc::clone(&registry))?;
    let stats = reader.stats();

    let server = MetricsServer::bind(config.metrics_addr, Arc::clone(&registry)).await?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let mut server_task = tokio::spawn(server.run(shutdown.clone()));

    let outcome = tokio::select! {
        res = reader.run(shutdown.clone()) => Stopped::Reader(res),
        res = &mut server_task => Stopped::Server(flatten(res)),
    };

    shutdown.cancel();
    let result = match outcome {
        Stopped::Reader(res) => res.and(flatten(server_task.await)),
        Stopped::Server(res) => res,
    };

    let summary = stats.snapshot();
    info!(
        bytes_read = summary.bytes_read,
        lines = summary.lines,
        events = summary.events,
        rejected = summary.rejected,
        oversized = summary.oversized,
        "Ingestion summary"
    );

    result
}

/// Which task ended the service first.
enum Stopped {
    Reader(Result<()>),
    Server(Result<()>),
}

fn flatten(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined.map_err(|e| Error::Internal(format!("Metrics server task failed: {}", e)))?
}

// =============================================================================
// Signal Handling
// =============================================================================

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => {
                info!("Received {}, shutting down", name);
                shutdown.cancel();
            }
            Err(e) => error!("Failed to install signal handlers: {}", e),
        }
    });
}

async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = terminate.recv() => Ok("SIGTERM"),
        _ = interrupt.recv() => Ok("SIGINT"),
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "hyper_util=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
