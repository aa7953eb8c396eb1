//! Stock [`StreamObserver`] implementations.
//!
//! - closure adapters behind `StreamClient::on_*`
//! - [`ChannelObserver`]: forwards notifications into an mpsc channel
//! - [`SharedView`]: keeps a lock-protected copy of the consumer state for
//!   readers on other threads

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::application::ports::StreamObserver;
use crate::domain::connection::{ConnectionState, Transition};
use crate::domain::history::{DisplayLog, HistoryBuffer};
use crate::domain::trade::{FlashTrade, PricePoint};

// =============================================================================
// Closure Adapters
// =============================================================================

pub(crate) struct ConnectionChangeFn<F>(pub(crate) F);

impl<F> StreamObserver for ConnectionChangeFn<F>
where
    F: FnMut(bool) + Send,
{
    fn on_connection_change(&mut self, connected: bool) {
        (self.0)(connected);
    }
}

pub(crate) struct PriceUpdateFn<F>(pub(crate) F);

impl<F> StreamObserver for PriceUpdateFn<F>
where
    F: FnMut(&PricePoint, &HistoryBuffer) + Send,
{
    fn on_price_update(&mut self, latest: &PricePoint, history: &HistoryBuffer) {
        (self.0)(latest, history);
    }
}

pub(crate) struct TradeBatchFn<F>(pub(crate) F);

impl<F> StreamObserver for TradeBatchFn<F>
where
    F: FnMut(&[FlashTrade], &DisplayLog) + Send,
{
    fn on_trade_batch(&mut self, batch: &[FlashTrade], log: &DisplayLog) {
        (self.0)(batch, log);
    }
}

// =============================================================================
// Channel Observer
// =============================================================================

/// Notification forwarded by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Any connection state transition.
    StateChanged(Transition),
    /// Connectivity flag flipped.
    ConnectionChanged(bool),
    /// A trade was recorded in the price history.
    PriceUpdated {
        /// The recorded point.
        latest: PricePoint,
        /// History length after recording.
        history_len: usize,
    },
    /// A batch was applied to the display log.
    TradeBatch {
        /// The flushed trades, oldest first.
        batch: Vec<FlashTrade>,
        /// Display log length after applying the batch.
        log_len: usize,
    },
}

/// Observer that turns notifications into [`StreamEvent`]s.
///
/// Sending never blocks the client; events are dropped once the receiver
/// is gone.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiver it feeds.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }
}

impl StreamObserver for ChannelObserver {
    fn on_connection_change(&mut self, connected: bool) {
        self.emit(StreamEvent::ConnectionChanged(connected));
    }

    fn on_state_change(&mut self, transition: Transition) {
        self.emit(StreamEvent::StateChanged(transition));
    }

    fn on_price_update(&mut self, latest: &PricePoint, history: &HistoryBuffer) {
        self.emit(StreamEvent::PriceUpdated {
            latest: *latest,
            history_len: history.len(),
        });
    }

    fn on_trade_batch(&mut self, batch: &[FlashTrade], log: &DisplayLog) {
        self.emit(StreamEvent::TradeBatch {
            batch: batch.to_vec(),
            log_len: log.len(),
        });
    }
}

// =============================================================================
// Shared View
// =============================================================================

#[derive(Debug, Default)]
struct ViewState {
    state: ConnectionState,
    history: Vec<PricePoint>,
    log: Vec<FlashTrade>,
    batches: u64,
}

/// Mirror of the consumer-facing state behind a read-write lock.
///
/// Clones share the same state: register one clone with the client and
/// read from the others.
#[derive(Debug, Clone, Default)]
pub struct SharedView {
    inner: Arc<RwLock<ViewState>>,
}

impl SharedView {
    /// Create an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last observed connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.read().state
    }

    /// Whether the last observed state is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Latest recorded price point.
    #[must_use]
    pub fn latest(&self) -> Option<PricePoint> {
        self.inner.read().history.last().copied()
    }

    /// Price history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<PricePoint> {
        self.inner.read().history.clone()
    }

    /// Display log, newest first.
    #[must_use]
    pub fn log(&self) -> Vec<FlashTrade> {
        self.inner.read().log.clone()
    }

    /// Number of batches applied so far.
    #[must_use]
    pub fn batches(&self) -> u64 {
        self.inner.read().batches
    }
}

impl StreamObserver for SharedView {
    fn on_state_change(&mut self, transition: Transition) {
        self.inner.write().state = transition.to;
    }

    fn on_price_update(&mut self, _latest: &PricePoint, history: &HistoryBuffer) {
        self.inner.write().history = history.to_vec();
    }

    fn on_trade_batch(&mut self, _batch: &[FlashTrade], log: &DisplayLog) {
        let mut view = self.inner.write();
        view.log = log.to_vec();
        view.batches += 1;
    }
}
