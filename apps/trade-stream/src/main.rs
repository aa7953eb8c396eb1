//! Trade Stream Binary
//!
//! Connects to a trade feed and logs connection changes, price updates and
//! trade batches until interrupted.
//!
//! # Usage
//!
//! ```bash
//! TRADE_STREAM_URL=wss://feed.example.com/ws cargo run --bin trade-stream
//! ```
//!
//! # Environment Variables
//!
//! - `TRADE_STREAM_URL`: Feed endpoint (default: ws://localhost:8000/ws)
//! - `TRADE_STREAM_DEFAULT_SYMBOL`: Symbol for trades without one (default: BTC/USD)
//! - `TRADE_STREAM_PRICE_SYMBOL`: Only this symbol feeds the price history (default: all)
//! - `TRADE_STREAM_RECONNECT_DELAY_MS`: Reconnect delay (default: 3000)
//! - `TRADE_STREAM_FRAME_INTERVAL_MS`: Batch flush interval (default: 16)
//! - `TRADE_STREAM_HISTORY_CAPACITY`: Price history size (default: 50)
//! - `TRADE_STREAM_DISPLAY_CAPACITY`: Trade log size (default: 100)
//! - `TRADE_STREAM_PENDING_HIGH_WATER`: Backlog warning threshold (default: 10000)
//! - `TRADE_STREAM_FRAME_BUFFER`: Frames queued before socket reads pause (default: 1024)
//! - `TRADE_STREAM_THROUGHPUT_INTERVAL_SECS`: Throughput log interval, 0 disables (default: 60)
//! - `TRADE_STREAM_METRICS_PORT`: Prometheus metrics port, 0 disables (default: 0)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log filter (base: trade_stream=info)

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use trade_stream::application::ports::StreamObserver;
use trade_stream::infrastructure::telemetry;
use trade_stream::{
    ClientConfig, DisplayLog, FlashTrade, HistoryBuffer, IntervalScheduler, PricePoint,
    StreamClient, Transition, WebSocketTransport, init_metrics,
};

/// Logs every notification at debug level, connectivity at info.
struct LoggingObserver;

impl StreamObserver for LoggingObserver {
    fn on_connection_change(&mut self, connected: bool) {
        tracing::info!(connected, "Trade feed connectivity changed");
    }

    fn on_state_change(&mut self, transition: Transition) {
        tracing::debug!(from = %transition.from, to = %transition.to, "Connection state");
    }

    fn on_price_update(&mut self, latest: &PricePoint, history: &HistoryBuffer) {
        tracing::debug!(
            price = %latest.price,
            timestamp = %latest.timestamp,
            history = history.len(),
            "Price update"
        );
    }

    fn on_trade_batch(&mut self, batch: &[FlashTrade], log: &DisplayLog) {
        if let Some(newest) = log.newest() {
            tracing::debug!(
                size = batch.len(),
                log = log.len(),
                symbol = %newest.trade.symbol,
                side = %newest.trade.side,
                price = %newest.trade.price,
                amount = %newest.trade.amount,
                "Trade batch"
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting trade stream");

    let config = ClientConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    if config.metrics_port != 0 {
        init_metrics(config.metrics_port).context("failed to start metrics exporter")?;
    }

    let client = StreamClient::spawn(
        config.stream_client_config(),
        Arc::new(WebSocketTransport::new()),
        Arc::new(IntervalScheduler::new(config.frame_interval)),
    );
    client.register_observer(LoggingObserver).await?;
    client.connect().await?;

    await_shutdown().await;

    client.shutdown().await;
    tracing::info!("Trade stream stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        url = %config.url,
        default_symbol = %config.default_symbol,
        price_symbol = config.price_symbol.as_deref().unwrap_or("*"),
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        reconnect_delay_ms = u64::try_from(config.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
        frame_interval_ms = u64::try_from(config.frame_interval.as_millis()).unwrap_or(u64::MAX),
        history_capacity = config.history_capacity,
        display_capacity = config.display_capacity,
        pending_high_water = config.pending_high_water,
        frame_buffer = config.frame_buffer,
        "Client tuning"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
