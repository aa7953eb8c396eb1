#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::similar_names
    )
)]

//! Trade Stream - Streaming Trade Feed Client
//!
//! Maintains one connection to a trade feed, decodes each frame into a
//! typed trade and keeps two views current for a consumer: a bounded price
//! history updated on every trade, and a newest-first trade log updated in
//! batches at most once per frame.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core data types with no I/O
//!   - `trade`: trades, price points, flashed trades
//!   - `connection`: connection state and transitions
//!   - `history`: price history ring and display log
//!   - `batch`: per-frame batch coalescer
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: transport, frame scheduler and observer interfaces
//!   - `services`: stream client actor, connection supervisor, observers
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: wire messages, decoder, reconnect policy, WebSocket transport
//!   - `scheduler`: interval and manual frame schedulers
//!   - `config`: environment configuration
//!   - `telemetry`: tracing and OpenTelemetry setup
//!   - `metrics`: Prometheus metrics
//!
//! # Data Flow
//!
//! ```text
//! WebSocket ──► session task ──► actor ──► TradeCodec ──┬──► HistoryBuffer ──► on_price_update
//!                                                       └──► BatchCoalescer
//!                                                                 │ frame tick
//!                                                                 ▼
//!                                                            DisplayLog ──► on_trade_batch
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core trade types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::batch::BatchCoalescer;
pub use domain::connection::{ConnectionState, Transition};
pub use domain::history::{DisplayLog, HistoryBuffer};
pub use domain::trade::{FlashTrade, PricePoint, TradeEvent, TradeSide};

// Ports
pub use application::ports::{
    FrameScheduler, InboundFrame, StreamObserver, Transport, TransportError, TransportSession,
};

// Client
pub use application::services::{
    ChannelObserver, ClientError, ClientSnapshot, SharedView, StreamClient, StreamClientConfig,
    StreamEvent,
};

// Feed adapters
pub use infrastructure::feed::{DecodeError, TradeCodec, WebSocketTransport};

// Schedulers
pub use infrastructure::scheduler::{IntervalScheduler, ManualScheduler};

// Infrastructure config
pub use infrastructure::config::{ClientConfig, ConfigError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
