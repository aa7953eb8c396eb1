//! Stream Client
//!
//! Composition root for one trade feed. [`StreamClient::spawn`] starts an
//! actor task that owns every piece of mutable state: the connection
//! supervisor, the price history, the batch coalescer, the display log and
//! the registered observers. [`StreamClient`] is a cheap, cloneable handle
//! that talks to the actor over a command channel.
//!
//! # Data Flow
//!
//! ```text
//! session task ──frame──► actor ──decode──┬──► HistoryBuffer ──► on_price_update
//!                                         └──► BatchCoalescer
//!                                                   │ next frame boundary
//!                                                   ▼
//!                                              DisplayLog ──► on_trade_batch
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::observers::{ConnectionChangeFn, PriceUpdateFn, TradeBatchFn};
use super::supervisor::{
    ConnectionSupervisor, DEFAULT_FRAME_BUFFER, SupervisorEvent, SupervisorUpdate,
};
use super::timer::ScheduledTask;
use crate::application::ports::{
    FrameScheduler, InboundFrame, StreamObserver, Transport, TransportError,
};
use crate::domain::batch::{BatchCoalescer, DEFAULT_PENDING_HIGH_WATER, Enqueued};
use crate::domain::connection::{ConnectionState, Transition};
use crate::domain::history::{
    DEFAULT_DISPLAY_CAPACITY, DEFAULT_HISTORY_CAPACITY, DisplayLog, HistoryBuffer,
};
use crate::domain::trade::{FlashTrade, PricePoint};
use crate::infrastructure::feed::{
    DEFAULT_RECONNECT_DELAY, DEFAULT_SYMBOL, ReconnectConfig, ReconnectPolicy, TradeCodec,
};
use crate::infrastructure::metrics;

/// Default interval between throughput log lines.
pub const DEFAULT_THROUGHPUT_INTERVAL: Duration = Duration::from_secs(60);

/// Command channel depth.
const COMMAND_BUFFER: usize = 64;

// =============================================================================
// Configuration
// =============================================================================

/// Settings for one stream client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamClientConfig {
    /// Feed endpoint.
    pub url: String,
    /// Symbol assigned to trades that arrive without one.
    pub default_symbol: String,
    /// Only trades for this symbol feed the price history. `None` admits all.
    pub price_symbol: Option<String>,
    /// Wait before each reconnection attempt.
    pub reconnect_delay: Duration,
    /// Price history capacity.
    pub history_capacity: usize,
    /// Display log capacity.
    pub display_capacity: usize,
    /// Pending queue size above which a backlog warning is logged.
    pub pending_high_water: usize,
    /// Frames buffered between the socket reader and the client. When full,
    /// the socket is not read until the client catches up.
    pub frame_buffer: usize,
    /// Throughput log interval. Zero disables the reporter.
    pub throughput_interval: Duration,
}

impl StreamClientConfig {
    /// Default settings for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            default_symbol: DEFAULT_SYMBOL.to_string(),
            price_symbol: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            display_capacity: DEFAULT_DISPLAY_CAPACITY,
            pending_high_water: DEFAULT_PENDING_HIGH_WATER,
            frame_buffer: DEFAULT_FRAME_BUFFER,
            throughput_interval: DEFAULT_THROUGHPUT_INTERVAL,
        }
    }
}

// =============================================================================
// Errors and Snapshots
// =============================================================================

/// Errors returned by [`StreamClient`] calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The actor has stopped.
    #[error("stream client has shut down")]
    Closed,

    /// The transport rejected the request.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Point-in-time copy of the client's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    /// Connection state.
    pub state: ConnectionState,
    /// Latest recorded price point.
    pub latest: Option<PricePoint>,
    /// Price history, oldest first.
    pub history: Vec<PricePoint>,
    /// Display log, newest first.
    pub log: Vec<FlashTrade>,
    /// Trades waiting for the next flush.
    pub pending: usize,
    /// Whether a flush is scheduled.
    pub flush_scheduled: bool,
    /// Whether a reconnect attempt is scheduled.
    pub reconnect_pending: bool,
    /// Trades accepted since the client started.
    pub accepted: u64,
}

// =============================================================================
// Handle
// =============================================================================

enum Command {
    Connect,
    Disconnect,
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    Register(Box<dyn StreamObserver>),
    Snapshot(oneshot::Sender<ClientSnapshot>),
    Shutdown,
}

/// Handle to a running stream client.
///
/// The actor stops on [`shutdown`](Self::shutdown) or once every handle has
/// been dropped.
#[derive(Debug, Clone)]
pub struct StreamClient {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl StreamClient {
    /// Start the actor on the current runtime. The client starts
    /// disconnected; call [`connect`](Self::connect) to open the feed.
    #[must_use]
    pub fn spawn(
        config: StreamClientConfig,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn FrameScheduler>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (supervisor_tx, supervisor_rx) = mpsc::channel(config.frame_buffer.max(1));
        let (flush_tx, flush_rx) = mpsc::unbounded_channel();

        let actor = ClientActor::new(&config, transport, scheduler, supervisor_tx, flush_tx, state_tx);
        tokio::spawn(actor.run(command_rx, supervisor_rx, flush_rx));

        Self {
            commands: command_tx,
            state: state_rx,
        }
    }

    /// Open the feed. No-op while connecting or connected.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the client has shut down.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.command(Command::Connect).await
    }

    /// Close the feed, cancel any pending reconnect and discard unflushed
    /// trades.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the client has shut down.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.command(Command::Disconnect).await
    }

    /// Write a text frame on the live session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] with
    /// [`TransportError::NotConnected`] when no session is connected.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), ClientError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Send {
            text: text.into(),
            reply,
        })
        .await?;
        response.await.map_err(|_| ClientError::Closed)??;
        Ok(())
    }

    /// Register an observer. It sees every notification from now on.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the client has shut down.
    pub async fn register_observer<O>(&self, observer: O) -> Result<(), ClientError>
    where
        O: StreamObserver + 'static,
    {
        self.command(Command::Register(Box::new(observer))).await
    }

    /// Call `f` whenever the connectivity flag flips.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the client has shut down.
    pub async fn on_connection_change<F>(&self, f: F) -> Result<(), ClientError>
    where
        F: FnMut(bool) + Send + 'static,
    {
        self.register_observer(ConnectionChangeFn(f)).await
    }

    /// Call `f` with the latest point and full history after every recorded
    /// trade.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the client has shut down.
    pub async fn on_price_update<F>(&self, f: F) -> Result<(), ClientError>
    where
        F: FnMut(&PricePoint, &HistoryBuffer) + Send + 'static,
    {
        self.register_observer(PriceUpdateFn(f)).await
    }

    /// Call `f` with each flushed batch and the updated display log.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the client has shut down.
    pub async fn on_trade_batch<F>(&self, f: F) -> Result<(), ClientError>
    where
        F: FnMut(&[FlashTrade], &DisplayLog) + Send + 'static,
    {
        self.register_observer(TradeBatchFn(f)).await
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether the feed is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Receiver that tracks every connection state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Copy of the client's current state.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the client has shut down.
    pub async fn snapshot(&self) -> Result<ClientSnapshot, ClientError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Snapshot(reply)).await?;
        response.await.map_err(|_| ClientError::Closed)
    }

    /// Stop the actor: close the session, cancel every timer and wait for
    /// the actor to exit. Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
        self.commands.closed().await;
    }

    async fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::Closed)
    }
}

// =============================================================================
// Actor
// =============================================================================

enum Step {
    Command(Option<Command>),
    Supervisor(SupervisorEvent),
    Flush(u64),
    Report,
}

struct ClientActor {
    codec: TradeCodec,
    price_symbol: Option<String>,
    supervisor: ConnectionSupervisor,
    history: HistoryBuffer,
    coalescer: BatchCoalescer,
    display: DisplayLog,
    observers: Vec<Box<dyn StreamObserver>>,
    scheduler: Arc<dyn FrameScheduler>,
    flush: Option<ScheduledTask>,
    flush_epoch: u64,
    flush_tx: mpsc::UnboundedSender<u64>,
    state_tx: watch::Sender<ConnectionState>,
    throughput_interval: Duration,
    accepted_total: u64,
    accepted_since_report: u64,
    backlog_warned: bool,
}

impl ClientActor {
    fn new(
        config: &StreamClientConfig,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn FrameScheduler>,
        supervisor_tx: mpsc::Sender<SupervisorEvent>,
        flush_tx: mpsc::UnboundedSender<u64>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let policy = ReconnectPolicy::new(ReconnectConfig::new(config.reconnect_delay));

        Self {
            codec: TradeCodec::new(config.default_symbol.clone()),
            price_symbol: config.price_symbol.clone(),
            supervisor: ConnectionSupervisor::new(
                config.url.clone(),
                transport,
                policy,
                supervisor_tx,
            ),
            history: HistoryBuffer::new(config.history_capacity),
            coalescer: BatchCoalescer::new(config.pending_high_water),
            display: DisplayLog::new(config.display_capacity),
            observers: Vec::new(),
            scheduler,
            flush: None,
            flush_epoch: 0,
            flush_tx,
            state_tx,
            throughput_interval: config.throughput_interval,
            accepted_total: 0,
            accepted_since_report: 0,
            backlog_warned: false,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut supervisor_events: mpsc::Receiver<SupervisorEvent>,
        mut flush_due: mpsc::UnboundedReceiver<u64>,
    ) {
        let mut report = throughput_timer(self.throughput_interval);
        tracing::debug!("Stream client started");

        loop {
            let step = tokio::select! {
                command = commands.recv() => Step::Command(command),
                Some(event) = supervisor_events.recv() => Step::Supervisor(event),
                Some(epoch) = flush_due.recv() => Step::Flush(epoch),
                () = next_report(&mut report) => Step::Report,
            };

            match step {
                Step::Command(None | Some(Command::Shutdown)) => break,
                Step::Command(Some(command)) => self.handle_command(command),
                Step::Supervisor(event) => self.handle_supervisor(event),
                Step::Flush(epoch) => self.handle_flush(epoch),
                Step::Report => self.report_throughput(),
            }
        }

        self.shutdown().await;
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                if let Some(transition) = self.supervisor.connect() {
                    self.apply_transition(transition);
                }
            }
            Command::Disconnect => {
                let transition = self.supervisor.disconnect();
                self.cancel_flush();
                if let Some(transition) = transition {
                    self.apply_transition(transition);
                }
            }
            Command::Send { text, reply } => {
                let _ = reply.send(self.supervisor.send(text));
            }
            Command::Register(observer) => self.observers.push(observer),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {
                // Handled by the run loop
            }
        }
    }

    fn handle_supervisor(&mut self, event: SupervisorEvent) {
        match self.supervisor.handle(event) {
            Some(SupervisorUpdate::Transition(transition)) => self.apply_transition(transition),
            Some(SupervisorUpdate::Frame(frame)) => self.handle_frame(&frame),
            None => {}
        }
    }

    fn apply_transition(&mut self, transition: Transition) {
        self.state_tx.send_replace(transition.to);
        tracing::debug!(from = %transition.from, to = %transition.to, "Connection state changed");

        for observer in &mut self.observers {
            observer.on_state_change(transition);
        }
        if transition.flips_connected() {
            let connected = transition.to.is_connected();
            for observer in &mut self.observers {
                observer.on_connection_change(connected);
            }
        }
    }

    fn handle_frame(&mut self, frame: &InboundFrame) {
        metrics::record_frame();

        let trade = match self.codec.decode_frame(frame) {
            Ok(trade) => trade,
            Err(e) => {
                metrics::record_decode_failure();
                tracing::warn!(error = %e, bytes = frame.len(), "Dropping malformed trade frame");
                return;
            }
        };

        metrics::record_accepted();
        self.accepted_total += 1;
        self.accepted_since_report += 1;

        if self.tracks_price(&trade.symbol) {
            let point = trade.price_point();
            self.history.record(point);
            for observer in &mut self.observers {
                observer.on_price_update(&point, &self.history);
            }
        }

        if self.coalescer.enqueue(trade) == Enqueued::ScheduleFlush {
            self.schedule_flush();
        }
        metrics::set_pending(self.coalescer.pending_len());

        if self.coalescer.is_over_high_water() && !self.backlog_warned {
            self.backlog_warned = true;
            tracing::warn!(
                pending = self.coalescer.pending_len(),
                "Trade backlog above high-water mark"
            );
        }
    }

    fn tracks_price(&self, symbol: &str) -> bool {
        self.price_symbol
            .as_deref()
            .is_none_or(|tracked| tracked == symbol)
    }

    fn schedule_flush(&mut self) {
        self.flush_epoch = self.flush_epoch.wrapping_add(1);
        let epoch = self.flush_epoch;
        let tick = self.scheduler.next_tick();
        let flush_tx = self.flush_tx.clone();

        self.flush = Some(ScheduledTask::spawn(async move {
            tick.await;
            let _ = flush_tx.send(epoch);
        }));
    }

    fn handle_flush(&mut self, epoch: u64) {
        if epoch != self.flush_epoch || !self.coalescer.is_flush_scheduled() {
            return;
        }

        self.flush = None;
        self.backlog_warned = false;
        let batch = self.coalescer.flush();
        metrics::set_pending(0);
        if batch.is_empty() {
            return;
        }

        self.display.apply_batch(&batch);
        metrics::record_batch(batch.len());
        tracing::trace!(size = batch.len(), "Flushed trade batch");

        for observer in &mut self.observers {
            observer.on_trade_batch(&batch, &self.display);
        }
    }

    fn cancel_flush(&mut self) {
        self.flush = None;
        let discarded = self.coalescer.cancel();
        metrics::set_pending(0);
        if discarded > 0 {
            tracing::debug!(discarded, "Discarded unflushed trades");
        }
    }

    fn report_throughput(&mut self) {
        tracing::info!(
            accepted = self.accepted_since_report,
            interval_secs = self.throughput_interval.as_secs(),
            total = self.accepted_total,
            "Trade throughput"
        );
        self.accepted_since_report = 0;
    }

    fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            state: self.supervisor.state(),
            latest: self.history.latest().copied(),
            history: self.history.to_vec(),
            log: self.display.to_vec(),
            pending: self.coalescer.pending_len(),
            flush_scheduled: self.coalescer.is_flush_scheduled(),
            reconnect_pending: self.supervisor.has_pending_reconnect(),
            accepted: self.accepted_total,
        }
    }

    async fn shutdown(&mut self) {
        let transition = self.supervisor.shutdown().await;
        self.cancel_flush();
        if let Some(transition) = transition {
            self.apply_transition(transition);
        }
        tracing::info!(accepted = self.accepted_total, "Stream client stopped");
    }
}

fn throughput_timer(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn next_report(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

// =============================================================================
// Tests
// =============================================================================
