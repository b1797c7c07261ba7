//! Prometheus exporter for Zyxel GS1200 switches.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gs1200_client::TelemetryCollector;
use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use gs1200_exporter::config::{LogFormat, Overrides};
use gs1200_exporter::{ExporterConfig, HttpServer, ScrapeCollector};

/// Prometheus exporter for Zyxel GS1200 switches.
#[derive(Parser, Debug)]
#[command(name = "gs1200-exporter")]
#[command(about = "Export Zyxel GS1200 switch status as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// IP address or hostname of the GS1200 (overrides config; GS1200_ADDRESS wins).
    #[arg(long)]
    address: Option<String>,

    /// Password to log on to the GS1200 (overrides config; GS1200_PASSWORD wins).
    #[arg(long)]
    password: Option<String>,

    /// Port on which to expose metrics (overrides the listen port; GS1200_PORT wins).
    #[arg(long)]
    port: Option<u16>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error). Defaults to the config value.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    let overrides = Overrides {
        address: args.address,
        password: args.password,
        port: args.port,
        listen: args.listen,
    }
    .with_env(|key| std::env::var(key).ok())?;
    config.apply(overrides)?;
    config.validate()?;

    // Initialize logging
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.logging.level)
        .parse()
        .unwrap_or(Level::INFO);
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("gs1200_exporter={}", log_level).parse()?)
        .add_directive(format!("gs1200_client={}", log_level).parse()?);

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        device = %config.device.address,
        "Starting GS1200 exporter"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let telemetry = TelemetryCollector::new(
        &config.device.address,
        SecretString::from(config.device.password.clone()),
        config.device.request_timeout(),
    )?;
    let collector = Arc::new(ScrapeCollector::new(telemetry, config.prometheus.clone()));

    let listen_addr = config.listen_addr()?;
    let http_server = HttpServer::new(collector.clone(), config.prometheus.path.clone());

    // Bind before waiting for signals so a busy port fails the process.
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", listen_addr, e))?;

    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.serve(listener, shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    wait_for_signal().await?;

    let _ = shutdown_tx.send(true);

    // Give an in-flight scrape time to log out of the switch.
    let _ = tokio::time::timeout(
        config.device.request_timeout() + Duration::from_secs(1),
        http_task,
    )
    .await;

    let stats = collector.stats();
    info!(
        scrapes = stats.scrapes_total,
        failures = stats.scrape_failures_total,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}
