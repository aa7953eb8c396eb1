//! Shared fixtures for stream client integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout};

use trade_stream::{
    ClientSnapshot, ConnectionState, InboundFrame, StreamClient, StreamEvent, Transport,
    TransportError, TransportSession,
};

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Fake Transport
// =============================================================================

/// Test side of one opened session.
pub struct FakeSessionHandle {
    /// Frames (or failures) delivered to the client. Dropping it closes the session.
    pub frames: mpsc::UnboundedSender<Result<InboundFrame, TransportError>>,
    /// Text the client wrote to the session.
    pub sent: mpsc::UnboundedReceiver<String>,
}

impl FakeSessionHandle {
    /// Deliver a text frame.
    pub fn push_text(&self, text: impl Into<String>) {
        self.frames.send(Ok(InboundFrame::Text(text.into()))).unwrap();
    }

    /// Deliver a binary frame.
    pub fn push_binary(&self, bytes: impl Into<Vec<u8>>) {
        self.frames.send(Ok(InboundFrame::Binary(bytes.into()))).unwrap();
    }

    /// Fail the session with a receive error.
    pub fn fail(&self) {
        self.frames
            .send(Err(TransportError::ReceiveFailed("connection reset".to_string())))
            .unwrap();
    }
}

/// In-memory transport. Every successful open hands a [`FakeSessionHandle`]
/// to the test.
pub struct FakeTransport {
    opened: mpsc::UnboundedSender<FakeSessionHandle>,
    refusing: AtomicBool,
    attempts: Mutex<Vec<Instant>>,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeSessionHandle>) {
        let (opened, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            opened,
            refusing: AtomicBool::new(false),
            attempts: Mutex::new(Vec::new()),
        });
        (transport, rx)
    }

    /// Make subsequent opens fail.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Times at which `open` was called, refused attempts included.
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

struct FakeSession {
    frames: mpsc::UnboundedReceiver<Result<InboundFrame, TransportError>>,
    sent: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, _url: &str) -> Result<Box<dyn TransportSession>, TransportError> {
        self.attempts.lock().push(Instant::now());

        if self.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed("connection refused".to_string()));
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let _ = self.opened.send(FakeSessionHandle {
            frames: frames_tx,
            sent: sent_rx,
        });

        Ok(Box::new(FakeSession {
            frames: frames_rx,
            sent: sent_tx,
        }))
    }
}

#[async_trait]
impl TransportSession for FakeSession {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        self.frames.recv().await
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sent
            .send(text)
            .map_err(|_| TransportError::SendFailed("peer gone".to_string()))
    }

    async fn close(&mut self) {
        self.frames.close();
    }
}

// =============================================================================
// Frames
// =============================================================================

/// A well-formed trade frame.
pub fn trade_json(id: &str, symbol: &str, price: &str) -> String {
    format!(
        r#"{{"id":"{id}","data":{{"symbol":"{symbol}","price":"{price}","side":"buy","timestamp":"2024-05-01T12:00:00Z","amount":"0.25"}}}}"#
    )
}

// =============================================================================
// Waiting
// =============================================================================

pub async fn next_session(
    opened: &mut mpsc::UnboundedReceiver<FakeSessionHandle>,
) -> FakeSessionHandle {
    timeout(WAIT, opened.recv())
        .await
        .expect("timed out waiting for a session")
        .expect("transport dropped")
}

pub async fn wait_for_state(client: &StreamClient, target: ConnectionState) {
    let mut state: watch::Receiver<ConnectionState> = client.watch_state();
    timeout(WAIT, state.wait_for(|s| *s == target))
        .await
        .expect("timed out waiting for state")
        .expect("client stopped");
}

/// Poll snapshots until `done` holds.
pub async fn wait_until<F>(client: &StreamClient, mut done: F) -> ClientSnapshot
where
    F: FnMut(&ClientSnapshot) -> bool,
{
    timeout(WAIT, async {
        loop {
            let snapshot = client.snapshot().await.unwrap();
            if done(&snapshot) {
                return snapshot;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("timed out waiting for client state")
}

/// Drain everything the observer has queued so far.
pub fn drain(events: &mut mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
