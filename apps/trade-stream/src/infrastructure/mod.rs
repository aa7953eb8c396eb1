//! Infrastructure Layer
//!
//! Adapters between the application ports and the outside world.
//!
//! - **feed**: wire format, decoding, reconnect policy, WebSocket transport
//! - **scheduler**: frame boundary sources
//! - **config**: environment configuration
//! - **telemetry**: tracing subscriber and OpenTelemetry export
//! - **metrics**: Prometheus metrics

pub mod config;
pub mod feed;
pub mod metrics;
pub mod scheduler;
pub mod telemetry;
