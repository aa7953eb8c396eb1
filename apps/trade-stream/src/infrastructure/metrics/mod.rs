//! Prometheus Metrics Module
//!
//! Records client activity through the `metrics` facade. When no recorder is
//! installed every call is a no-op, so the client records unconditionally.
//!
//! # Metrics
//!
//! - **Frames**: frames received and frames that failed to decode
//! - **Trades**: accepted trades, flushed batches and their sizes
//! - **Connection**: connected gauge and reconnection attempts
//!
//! # Integration
//!
//! [`init_metrics`] serves `/metrics` on its own HTTP listener.

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

// =============================================================================
// Metric Names
// =============================================================================

const FRAMES_RECEIVED: &str = "trade_stream_frames_received_total";
const DECODE_FAILURES: &str = "trade_stream_decode_failures_total";
const TRADES_ACCEPTED: &str = "trade_stream_trades_accepted_total";
const BATCHES_FLUSHED: &str = "trade_stream_batches_flushed_total";
const BATCH_SIZE: &str = "trade_stream_batch_size";
const PENDING_TRADES: &str = "trade_stream_pending_trades";
const RECONNECTS: &str = "trade_stream_reconnects_total";
const CONNECTED: &str = "trade_stream_connected";

/// Metrics exporter error.
#[derive(Debug, thiserror::Error)]
#[error("failed to install Prometheus exporter: {0}")]
pub struct MetricsError(String);

// =============================================================================
// Initialization
// =============================================================================

/// Install the Prometheus recorder and serve it on `0.0.0.0:port`.
///
/// Must be called from inside a tokio runtime.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or a recorder is
/// already installed.
pub fn init_metrics(port: u16) -> Result<(), MetricsError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError(e.to_string()))?;

    register_metrics();
    tracing::info!(addr = %addr, "Prometheus metrics listener started");
    Ok(())
}

/// Describe every metric on the installed recorder.
pub fn register_metrics() {
    describe_counter!(FRAMES_RECEIVED, "Frames received from the trade feed");
    describe_counter!(DECODE_FAILURES, "Frames dropped because they did not decode");
    describe_counter!(TRADES_ACCEPTED, "Trades accepted after decoding");
    describe_counter!(BATCHES_FLUSHED, "Trade batches delivered to observers");
    describe_histogram!(BATCH_SIZE, "Trades per flushed batch");
    describe_gauge!(PENDING_TRADES, "Trades queued for the next flush");
    describe_counter!(RECONNECTS, "Reconnection attempts scheduled");
    describe_gauge!(CONNECTED, "1 while the feed session is connected");
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a frame received from the feed.
pub fn record_frame() {
    counter!(FRAMES_RECEIVED).increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_failure() {
    counter!(DECODE_FAILURES).increment(1);
}

/// Record an accepted trade.
pub fn record_accepted() {
    counter!(TRADES_ACCEPTED).increment(1);
}

/// Record a flushed batch.
#[allow(clippy::cast_precision_loss)]
pub fn record_batch(size: usize) {
    counter!(BATCHES_FLUSHED).increment(1);
    histogram!(BATCH_SIZE).record(size as f64);
}

/// Update the pending queue depth.
#[allow(clippy::cast_precision_loss)]
pub fn set_pending(depth: usize) {
    gauge!(PENDING_TRADES).set(depth as f64);
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect() {
    counter!(RECONNECTS).increment(1);
}

/// Update the connected gauge.
pub fn set_connected(connected: bool) {
    gauge!(CONNECTED).set(if connected { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use metrics_exporter_prometheus::PrometheusBuilder;

    use super::*;

    #[test]
    fn recorded_values_are_rendered() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            register_metrics();
            record_frame();
            record_frame();
            record_decode_failure();
            record_accepted();
            record_batch(3);
            set_pending(0);
            record_reconnect();
            set_connected(true);
        });

        let rendered = handle.render();
        for name in [
            FRAMES_RECEIVED,
            DECODE_FAILURES,
            TRADES_ACCEPTED,
            BATCHES_FLUSHED,
            BATCH_SIZE,
            PENDING_TRADES,
            RECONNECTS,
            CONNECTED,
        ] {
            assert!(rendered.contains(name), "missing {name} in:\n{rendered}");
        }
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame();
        record_batch(10);
        set_connected(false);
    }
}
