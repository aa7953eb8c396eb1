//! Connection Supervisor
//!
//! Owns the transport session and drives the connection state machine:
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──open ack──► Connected
//!      ▲                          │                        │
//!      │                          └──── error / close ─────┤
//!      │                                                   ▼
//!      └──────── reconnect after fixed delay ◄──── Disconnected
//! ```
//!
//! Session I/O runs in its own task and reports back through
//! [`SupervisorEvent`]s on a bounded channel. When the consumer falls behind,
//! the session task stops reading the socket until there is room again.
//! Every session gets a new generation number; events carrying an older
//! generation belong to a session that was already torn down and are ignored.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::timer::ScheduledTask;
use crate::application::ports::{InboundFrame, Transport, TransportError, TransportSession};
use crate::domain::connection::{ConnectionState, Transition};
use crate::infrastructure::feed::ReconnectPolicy;
use crate::infrastructure::metrics;

/// Upper bound on waiting for a session task to close during shutdown.
const SESSION_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default depth of the event channel between session tasks and the consumer.
pub const DEFAULT_FRAME_BUFFER: usize = 1024;

// =============================================================================
// Events
// =============================================================================

/// Messages posted by session tasks and the reconnect timer.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// The transport acknowledged the open.
    Opened {
        /// Session generation.
        generation: u64,
    },
    /// A frame arrived.
    Frame {
        /// Session generation.
        generation: u64,
        /// Frame payload.
        frame: InboundFrame,
    },
    /// The session ended without being asked to.
    Closed {
        /// Session generation.
        generation: u64,
        /// Failure that ended it, `None` for a clean close by the peer.
        error: Option<TransportError>,
    },
    /// The reconnect delay elapsed.
    ReconnectDue {
        /// Generation that scheduled the attempt.
        generation: u64,
    },
}

/// Result of handling a [`SupervisorEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorUpdate {
    /// The connection state changed.
    Transition(Transition),
    /// A frame from the live session, ready for decoding.
    Frame(InboundFrame),
}

// =============================================================================
// Supervisor
// =============================================================================

struct ActiveSession {
    session_id: Uuid,
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Connection state machine for one endpoint.
pub struct ConnectionSupervisor {
    url: String,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    state: ConnectionState,
    generation: u64,
    session: Option<ActiveSession>,
    reconnect: Option<ScheduledTask>,
    events: mpsc::Sender<SupervisorEvent>,
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("url", &self.url)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("session_id", &self.session.as_ref().map(|s| s.session_id))
            .field("reconnect_pending", &self.reconnect.is_some())
            .finish_non_exhaustive()
    }
}

impl ConnectionSupervisor {
    /// Create a disconnected supervisor. Session tasks and timers post to
    /// `events`; feed everything received there back into
    /// [`handle`](Self::handle).
    pub fn new(
        url: impl Into<String>,
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
        events: mpsc::Sender<SupervisorEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            transport,
            policy,
            state: ConnectionState::Disconnected,
            generation: 0,
            session: None,
            reconnect: None,
            events,
        }
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Generation of the newest session.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a reconnect attempt is scheduled.
    #[must_use]
    pub const fn has_pending_reconnect(&self) -> bool {
        self.reconnect.is_some()
    }

    /// Reconnect attempts since the last successful open.
    #[must_use]
    pub const fn reconnect_attempts(&self) -> u32 {
        self.policy.attempt_count()
    }

    /// Start a session. No-op while connecting or connected.
    pub fn connect(&mut self) -> Option<Transition> {
        if self.state.is_active() {
            tracing::debug!(state = %self.state, "Connect ignored, session already active");
            return None;
        }

        self.reconnect = None;
        self.generation += 1;

        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        tracing::info!(
            url = %self.url,
            session_id = %session_id,
            generation = self.generation,
            "Connecting to trade stream"
        );

        let task = tokio::spawn(run_session(
            Arc::clone(&self.transport),
            self.url.clone(),
            self.generation,
            cancel.clone(),
            outbound_rx,
            self.events.clone(),
        ));

        self.session = Some(ActiveSession {
            session_id,
            cancel,
            outbound: outbound_tx,
            task,
        });

        Some(self.transition_to(ConnectionState::Connecting))
    }

    /// Tear down the session and any pending reconnect. Never schedules a
    /// reconnect.
    pub fn disconnect(&mut self) -> Option<Transition> {
        self.reconnect = None;
        if let Some(session) = self.session.take() {
            tracing::info!(session_id = %session.session_id, "Disconnecting from trade stream");
        }
        self.retire()
    }

    /// Like [`disconnect`](Self::disconnect), but waits for the session task
    /// to close the transport.
    pub async fn shutdown(&mut self) -> Option<Transition> {
        self.reconnect = None;
        if let Some(mut session) = self.session.take() {
            session.cancel.cancel();
            if tokio::time::timeout(SESSION_CLOSE_TIMEOUT, &mut session.task)
                .await
                .is_err()
            {
                tracing::warn!(
                    session_id = %session.session_id,
                    "Session did not close in time"
                );
                session.task.abort();
            }
        }
        self.retire()
    }

    /// Queue a text frame on the live session.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] unless a session is connected.
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        match (&self.session, self.state) {
            (Some(session), ConnectionState::Connected) => session
                .outbound
                .send(text)
                .map_err(|_| TransportError::NotConnected),
            _ => Err(TransportError::NotConnected),
        }
    }

    /// Apply an event from a session task or the reconnect timer.
    pub fn handle(&mut self, event: SupervisorEvent) -> Option<SupervisorUpdate> {
        match event {
            SupervisorEvent::Opened { generation } => {
                if !self.is_current(generation) || self.state != ConnectionState::Connecting {
                    return None;
                }
                self.policy.reset();
                if let Some(session) = &self.session {
                    tracing::info!(
                        session_id = %session.session_id,
                        generation,
                        "Trade stream connected"
                    );
                }
                metrics::set_connected(true);
                Some(SupervisorUpdate::Transition(
                    self.transition_to(ConnectionState::Connected),
                ))
            }
            SupervisorEvent::Frame { generation, frame } => {
                if !self.is_current(generation) || self.state != ConnectionState::Connected {
                    tracing::trace!(generation, "Dropping frame from stale session");
                    return None;
                }
                Some(SupervisorUpdate::Frame(frame))
            }
            SupervisorEvent::Closed { generation, error } => {
                if !self.is_current(generation) || !self.state.is_active() {
                    return None;
                }
                match &error {
                    Some(e) => tracing::warn!(error = %e, generation, "Trade stream session failed"),
                    None => tracing::warn!(generation, "Trade stream closed by peer"),
                }
                self.session = None;
                let transition = self.transition_to(ConnectionState::Disconnected);
                metrics::set_connected(false);
                self.schedule_reconnect();
                Some(SupervisorUpdate::Transition(transition))
            }
            SupervisorEvent::ReconnectDue { generation } => {
                if !self.is_current(generation)
                    || self.state != ConnectionState::Disconnected
                    || self.reconnect.is_none()
                {
                    return None;
                }
                self.reconnect = None;
                tracing::info!(attempt = self.policy.attempt_count(), "Reconnecting");
                self.connect().map(SupervisorUpdate::Transition)
            }
        }
    }

    const fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.policy.next_delay();
        let generation = self.generation;
        let events = self.events.clone();

        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt = self.policy.attempt_count(),
            "Scheduling reconnect"
        );
        metrics::record_reconnect();

        self.reconnect = Some(ScheduledTask::after(delay, async move {
            let _ = events.send(SupervisorEvent::ReconnectDue { generation }).await;
        }));
    }

    fn retire(&mut self) -> Option<Transition> {
        // Anything still in flight from the old session is now stale.
        self.generation += 1;
        self.policy.reset();
        if self.state == ConnectionState::Disconnected {
            return None;
        }
        metrics::set_connected(false);
        Some(self.transition_to(ConnectionState::Disconnected))
    }

    fn transition_to(&mut self, to: ConnectionState) -> Transition {
        let transition = Transition {
            from: self.state,
            to,
        };
        self.state = to;
        transition
    }
}

// =============================================================================
// Session Task
// =============================================================================

enum SessionStep {
    Cancelled,
    Outbound(Option<String>),
    Inbound(Option<Result<InboundFrame, TransportError>>),
}

async fn run_session(
    transport: Arc<dyn Transport>,
    url: String,
    generation: u64,
    cancel: CancellationToken,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<SupervisorEvent>,
) {
    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        result = transport.open(&url) => result,
    };

    let mut session: Box<dyn TransportSession> = match opened {
        Ok(session) => session,
        Err(e) => {
            let closed = SupervisorEvent::Closed {
                generation,
                error: Some(e),
            };
            post(&events, &cancel, closed).await;
            return;
        }
    };

    if !post(&events, &cancel, SupervisorEvent::Opened { generation }).await {
        session.close().await;
        return;
    }

    let error = loop {
        let step = tokio::select! {
            biased;
            () = cancel.cancelled() => SessionStep::Cancelled,
            text = outbound.recv() => SessionStep::Outbound(text),
            frame = session.next_frame() => SessionStep::Inbound(frame),
        };

        match step {
            SessionStep::Cancelled | SessionStep::Outbound(None) => {
                session.close().await;
                return;
            }
            SessionStep::Outbound(Some(text)) => {
                if let Err(e) = session.send_text(text).await {
                    break Some(e);
                }
            }
            SessionStep::Inbound(Some(Ok(frame))) => {
                // Waits for room in the channel; the socket is not read meanwhile.
                if !post(&events, &cancel, SupervisorEvent::Frame { generation, frame }).await {
                    session.close().await;
                    return;
                }
            }
            SessionStep::Inbound(Some(Err(e))) => break Some(e),
            SessionStep::Inbound(None) => break None,
        }
    };

    session.close().await;
    post(&events, &cancel, SupervisorEvent::Closed { generation, error }).await;
}

/// Deliver `event`, waiting for channel capacity. Returns `false` once the
/// session is cancelled or the consumer is gone.
async fn post(
    events: &mpsc::Sender<SupervisorEvent>,
    cancel: &CancellationToken,
    event: SupervisorEvent,
) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = events.send(event) => sent.is_ok(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    use super::*;
    use crate::infrastructure::feed::ReconnectConfig;

    /// Refuses every open.
    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn open(&self, _url: &str) -> Result<Box<dyn TransportSession>, TransportError> {
            Err(TransportError::ConnectFailed("connection refused".to_string()))
        }
    }

    /// Opens sessions that stay silent until closed.
    struct SilentTransport;

    struct SilentSession;

    #[async_trait]
    impl Transport for SilentTransport {
        async fn open(&self, _url: &str) -> Result<Box<dyn TransportSession>, TransportError> {
            Ok(Box::new(SilentSession))
        }
    }

    #[async_trait]
    impl TransportSession for SilentSession {
        async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
            std::future::pending().await
        }

        async fn send_text(&mut self, _text: String) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&mut self) {}
    }

    /// Opens a single session that serves queued frames and counts reads.
    struct CountingTransport {
        frames: Mutex<Option<mpsc::UnboundedReceiver<InboundFrame>>>,
        reads: Arc<AtomicUsize>,
    }

    struct CountingSession {
        frames: mpsc::UnboundedReceiver<InboundFrame>,
        reads: Arc<AtomicUsize>,
    }

    impl CountingTransport {
        fn new() -> (Self, mpsc::UnboundedSender<InboundFrame>, Arc<AtomicUsize>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let reads = Arc::new(AtomicUsize::new(0));
            let transport = Self {
                frames: Mutex::new(Some(rx)),
                reads: Arc::clone(&reads),
            };
            (transport, tx, reads)
        }
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn open(&self, _url: &str) -> Result<Box<dyn TransportSession>, TransportError> {
            let frames = self
                .frames
                .lock()
                .take()
                .ok_or_else(|| TransportError::ConnectFailed("already opened".to_string()))?;
            Ok(Box::new(CountingSession {
                frames,
                reads: Arc::clone(&self.reads),
            }))
        }
    }

    #[async_trait]
    impl TransportSession for CountingSession {
        async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
            let frame = self.frames.recv().await?;
            self.reads.fetch_add(1, Ordering::SeqCst);
            Some(Ok(frame))
        }

        async fn send_text(&mut self, _text: String) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&mut self) {}
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    fn supervisor(
        transport: Arc<dyn Transport>,
    ) -> (ConnectionSupervisor, mpsc::Receiver<SupervisorEvent>) {
        supervisor_with_buffer(transport, DEFAULT_FRAME_BUFFER)
    }

    fn supervisor_with_buffer(
        transport: Arc<dyn Transport>,
        buffer: usize,
    ) -> (ConnectionSupervisor, mpsc::Receiver<SupervisorEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        let policy = ReconnectPolicy::new(ReconnectConfig::default());
        (
            ConnectionSupervisor::new("ws://feed.test/ws", transport, policy, tx),
            rx,
        )
    }

    fn transition(from: ConnectionState, to: ConnectionState) -> Transition {
        Transition { from, to }
    }

    #[tokio::test]
    async fn connect_opens_and_acknowledges() {
        let (mut sup, mut rx) = supervisor(Arc::new(SilentTransport));

        let started = sup.connect();
        assert_eq!(
            started,
            Some(transition(ConnectionState::Disconnected, ConnectionState::Connecting))
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(
            sup.handle(event),
            Some(SupervisorUpdate::Transition(transition(
                ConnectionState::Connecting,
                ConnectionState::Connected
            )))
        );
        assert!(sup.state().is_connected());
    }

    #[tokio::test]
    async fn connect_is_noop_while_active() {
        let (mut sup, mut rx) = supervisor(Arc::new(SilentTransport));

        assert!(sup.connect().is_some());
        let generation = sup.generation();
        assert!(sup.connect().is_none());
        assert_eq!(sup.generation(), generation);

        let event = rx.recv().await.unwrap();
        sup.handle(event);
        assert!(sup.connect().is_none());
        assert_eq!(sup.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_open_reconnects_after_fixed_delay() {
        let (mut sup, mut rx) = supervisor(Arc::new(RefusingTransport));
        sup.connect();

        let closed = rx.recv().await.unwrap();
        assert!(matches!(
            closed,
            SupervisorEvent::Closed {
                error: Some(TransportError::ConnectFailed(_)),
                ..
            }
        ));
        assert_eq!(
            sup.handle(closed),
            Some(SupervisorUpdate::Transition(transition(
                ConnectionState::Connecting,
                ConnectionState::Disconnected
            )))
        );
        assert!(sup.has_pending_reconnect());

        let start = Instant::now();
        let due = rx.recv().await.unwrap();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(3), "fired early: {waited:?}");
        assert!(waited < Duration::from_millis(3_010), "fired late: {waited:?}");
        assert!(matches!(due, SupervisorEvent::ReconnectDue { .. }));

        assert_eq!(
            sup.handle(due),
            Some(SupervisorUpdate::Transition(transition(
                ConnectionState::Disconnected,
                ConnectionState::Connecting
            )))
        );
        assert_eq!(sup.reconnect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let (mut sup, mut rx) = supervisor(Arc::new(RefusingTransport));
        sup.connect();
        let closed = rx.recv().await.unwrap();
        sup.handle(closed);
        assert!(sup.has_pending_reconnect());

        assert_eq!(sup.disconnect(), None);
        assert!(!sup.has_pending_reconnect());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(sup.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_from_connected_does_not_reconnect() {
        let (mut sup, mut rx) = supervisor(Arc::new(SilentTransport));
        sup.connect();
        let opened = rx.recv().await.unwrap();
        sup.handle(opened);

        assert_eq!(
            sup.disconnect(),
            Some(transition(ConnectionState::Connected, ConnectionState::Disconnected))
        );
        assert!(!sup.has_pending_reconnect());
    }

    #[tokio::test]
    async fn stale_events_are_ignored() {
        let (mut sup, _rx) = supervisor(Arc::new(SilentTransport));
        sup.connect();
        let stale = sup.generation();
        sup.disconnect();
        sup.connect();

        assert_eq!(sup.handle(SupervisorEvent::Opened { generation: stale }), None);
        assert_eq!(
            sup.handle(SupervisorEvent::Frame {
                generation: stale,
                frame: InboundFrame::Text("{}".to_string()),
            }),
            None
        );
        assert_eq!(
            sup.handle(SupervisorEvent::Closed {
                generation: stale,
                error: None,
            }),
            None
        );
        assert!(!sup.has_pending_reconnect());
    }

    #[tokio::test]
    async fn send_requires_connected_session() {
        let (mut sup, mut rx) = supervisor(Arc::new(SilentTransport));
        assert_eq!(
            sup.send("hello".to_string()),
            Err(TransportError::NotConnected)
        );

        sup.connect();
        assert_eq!(
            sup.send("hello".to_string()),
            Err(TransportError::NotConnected)
        );

        let opened = rx.recv().await.unwrap();
        sup.handle(opened);
        assert_eq!(sup.send("hello".to_string()), Ok(()));
    }

    #[tokio::test]
    async fn shutdown_waits_for_session_and_disconnects() {
        let (mut sup, mut rx) = supervisor(Arc::new(SilentTransport));
        sup.connect();
        let opened = rx.recv().await.unwrap();
        sup.handle(opened);

        assert_eq!(
            sup.shutdown().await,
            Some(transition(ConnectionState::Connected, ConnectionState::Disconnected))
        );
        assert_eq!(sup.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn full_event_channel_pauses_socket_reads() {
        let (transport, frames, reads) = CountingTransport::new();
        let (mut sup, mut rx) = supervisor_with_buffer(Arc::new(transport), 2);
        sup.connect();
        let opened = rx.recv().await.unwrap();
        sup.handle(opened);

        for i in 0..10 {
            frames.send(InboundFrame::Text(i.to_string())).unwrap();
        }
        settle().await;

        // Two frames fill the channel; a third is read and waits for room.
        assert_eq!(reads.load(Ordering::SeqCst), 3);

        let mut seen = Vec::new();
        while seen.len() < 10 {
            match sup.handle(rx.recv().await.unwrap()) {
                Some(SupervisorUpdate::Frame(InboundFrame::Text(text))) => seen.push(text),
                other => panic!("unexpected update: {other:?}"),
            }
        }
        let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(seen, expected);
        assert_eq!(reads.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_session_waiting_for_room() {
        let (transport, frames, reads) = CountingTransport::new();
        let (mut sup, mut rx) = supervisor_with_buffer(Arc::new(transport), 1);
        sup.connect();
        let opened = rx.recv().await.unwrap();
        sup.handle(opened);

        for i in 0..5 {
            frames.send(InboundFrame::Text(i.to_string())).unwrap();
        }
        settle().await;
        assert_eq!(reads.load(Ordering::SeqCst), 2);

        let start = Instant::now();
        sup.shutdown().await;
        assert!(start.elapsed() < SESSION_CLOSE_TIMEOUT);
        assert_eq!(sup.state(), ConnectionState::Disconnected);
    }
}
