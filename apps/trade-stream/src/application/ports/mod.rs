//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters and consumers implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Transport`] / [`TransportSession`]: the bidirectional message stream
//! - [`FrameScheduler`]: source of frame boundaries for batch flushes
//!
//! ## Driver Ports (Inbound)
//!
//! - [`StreamObserver`]: notifications delivered to the presentation layer

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::domain::connection::Transition;
use crate::domain::history::{DisplayLog, HistoryBuffer};
use crate::domain::trade::{FlashTrade, PricePoint};

// =============================================================================
// Transport
// =============================================================================

/// One message received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl InboundFrame {
    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transport failures. None of these reach the consumer; they drive the
/// reconnect policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The session could not be opened.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Reading from an open session failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Writing to an open session failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The peer closed the session.
    #[error("connection closed")]
    ConnectionClosed,

    /// No session is open.
    #[error("not connected")]
    NotConnected,
}

/// Opens sessions against a fixed endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new session. Returning `Ok` is the open acknowledgment.
    async fn open(&self, url: &str) -> Result<Box<dyn TransportSession>, TransportError>;
}

/// A single open session.
#[async_trait]
pub trait TransportSession: Send {
    /// Wait for the next data frame.
    ///
    /// Returns `None` once the peer has closed the session. Must be cancel
    /// safe: dropping the future loses no frame.
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>>;

    /// Write a text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the session, ignoring errors.
    async fn close(&mut self);
}

// =============================================================================
// Frame Scheduler
// =============================================================================

/// Source of frame boundaries.
///
/// Each call hands out a future that resolves on the next boundary. In a
/// graphical host that is the next refresh; headless it is a timer tick;
/// in tests it is an explicit call.
pub trait FrameScheduler: Send + Sync {
    /// Future resolving at the next frame boundary.
    fn next_tick(&self) -> BoxFuture<'static, ()>;
}

// =============================================================================
// Observer
// =============================================================================

/// Consumer-facing notifications.
///
/// All methods run on the client's single event loop, one at a time, so
/// implementations need no locking of their own. Every method defaults to
/// doing nothing.
#[cfg_attr(test, mockall::automock)]
pub trait StreamObserver: Send {
    /// Connectivity flag flipped.
    fn on_connection_change(&mut self, _connected: bool) {}

    /// Any connection state transition, including ones that leave the
    /// connectivity flag unchanged.
    fn on_state_change(&mut self, _transition: Transition) {}

    /// A trade was recorded in the price history.
    fn on_price_update(&mut self, _latest: &PricePoint, _history: &HistoryBuffer) {}

    /// A batch was flushed and applied to the display log.
    fn on_trade_batch(&mut self, _batch: &[FlashTrade], _log: &DisplayLog) {}
}
