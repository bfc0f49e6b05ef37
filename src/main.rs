//! STX worker entry point.
//!
//! Loads configuration, initialises structured logging, runs the startup
//! sequence against the venue, then cycles cancel-then-place until Ctrl+C.
//! Records go to stdout; logs go to stderr.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use stx_worker::config::AppConfig;
use stx_worker::engine::{spawn_record_writer, Venue, VenueChannels, Worker};
use stx_worker::venue::stx::StxClient;

/// How long to wait for queued records to reach stdout on shutdown.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let cfg = match AppConfig::load("config.toml") {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e).context("loading configuration");
        }
    };

    info!(
        graphql_uri = %cfg.endpoints.graphql_uri,
        channels_uri = %cfg.endpoints.channels_uri,
        orders_per_market = cfg.worker.orders_per_market,
        cycle_delay_ms = cfg.worker.cycle_delay_ms,
        "STX worker starting up"
    );

    // -- Venue -----------------------------------------------------------

    let client = StxClient::new(&cfg.endpoints).context("building venue client")?;
    let channels = VenueChannels {
        market: Box::new(client.market_channel()),
        orders: Box::new(client.orders_channel()),
        trades: Box::new(client.trades_channel()),
        portfolio: Box::new(client.portfolio_channel()),
    };
    let venue = Venue {
        session: Arc::new(client.session),
        catalog: Arc::new(client.markets),
        orders: Arc::new(client.orders),
        channels,
    };

    // -- Startup ---------------------------------------------------------

    let (sink, writer) = spawn_record_writer(cfg.worker.record_buffer, std::io::stdout());
    let worker = Worker::new(venue, cfg.credentials, cfg.worker, sink.clone());

    let running = match worker.start().await {
        Ok(running) => running,
        Err(e) => {
            error!(error = %e, "Startup failed");
            return Err(e).context("worker startup");
        }
    };

    // -- Main loop -------------------------------------------------------

    info!("Entering main loop. Press Ctrl+C to stop.");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };
    let cycles = running.run(shutdown).await;

    // -- Drain -----------------------------------------------------------

    let dropped = sink.dropped();
    drop(sink);
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "Record writer failed"),
        Ok(Err(e)) => warn!(error = %e, "Record writer panicked"),
        Err(_) => warn!("Record writer still busy at shutdown"),
    }

    info!(cycles, dropped_records = dropped, "STX worker shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber on stderr.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stx_worker=info"));

    let json_logging = std::env::var("STX_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
