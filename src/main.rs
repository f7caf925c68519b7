//! mixgate
//!
//! A check/report mediation gateway between API frontends and policy and
//! telemetry backends.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────────┐
//!                    │                         MIXGATE                          │
//!                    │                                                          │
//!   :check  ─────────┼─▶ http ──▶ Controller ──▶ CheckerManager ──▶ checkers    │
//!                    │                │              ▲  (whitelist, block)      │
//!                    │                │              │                          │
//!   :report ─────────┼─▶ http ──▶ report queue       │ config_change            │
//!                    │                │              │                          │
//!                    │          N workers       ConfigManager ◀── services.yml  │
//!                    │                │          (poll + watch)    or http(s)   │
//!                    │                ▼                                         │
//!                    │   prometheus │ statsd │ log   (optionally batched)       │
//!                    │        │                                                 │
//!   GET /metrics ◀───┼────────┘                                                 │
//!                    └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use mixgate::config::validation::validate_config;
use mixgate::config::{load_config, ConfigError, GatewayConfig};
use mixgate::http::HttpServer;
use mixgate::lifecycle::signals;
use mixgate::observability::{logging, metrics};
use mixgate::{Gateway, Registries};

#[derive(Debug, Parser)]
#[command(name = "mixgate", version, about = "Check/report mediation gateway")]
struct Args {
    /// Gateway settings (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listener port, overriding `listener.bind_address`.
    #[arg(long)]
    port: Option<u16>,

    /// Report worker count.
    #[arg(long)]
    workers: Option<usize>,

    /// Enabled report consumers, comma separated.
    #[arg(long, value_delimiter = ',')]
    report_consumers: Option<Vec<String>>,

    /// Services configuration source: path, file:// or http(s):// URL.
    #[arg(long)]
    services: Option<String>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut GatewayConfig) {
        if let Some(port) = self.port {
            let host = config
                .listener
                .bind_address
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            config.listener.bind_address = format!("{host}:{port}");
        }
        if let Some(workers) = self.workers {
            config.reports.workers = workers;
        }
        if let Some(consumers) = self.report_consumers {
            config.reports.consumers = consumers;
        }
        if let Some(services) = self.services {
            config.services.source = services;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = Args::parse();

    let mut config = match args.config.take() {
        Some(path) => load_config(&path)?,
        None => GatewayConfig::default(),
    };
    args.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mixgate starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = %config.services.source,
        workers = config.reports.workers,
        consumers = ?config.reports.consumers,
        "Configuration loaded"
    );

    let registries = Arc::new(Registries::with_builtins()?);
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = Gateway::start(config, registries).await?;

    let server = HttpServer::new(gateway.router());
    server.run(listener, signals::wait_for_termination()).await?;

    gateway.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
