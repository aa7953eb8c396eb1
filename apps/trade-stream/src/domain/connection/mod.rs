//! Connection State
//!
//! Lifecycle of the single transport session owned by a stream client.

use std::fmt;

/// Connection lifecycle state.
///
/// The only legal cycle is `Disconnected → Connecting → Connected →
/// Disconnected`, with `Connecting → Disconnected` when opening fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No session and no open attempt in flight.
    #[default]
    Disconnected,
    /// A session is being opened.
    Connecting,
    /// The transport acknowledged the open and frames are flowing.
    Connected,
}

impl ConnectionState {
    /// Whether the consumer-facing connectivity flag is set.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether a session exists or is being established.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// State name for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change applied by the connection supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the change.
    pub from: ConnectionState,
    /// State after the change.
    pub to: ConnectionState,
}

impl Transition {
    /// Whether the consumer-facing connectivity flag flipped.
    #[must_use]
    pub const fn flips_connected(&self) -> bool {
        self.from.is_connected() != self.to.is_connected()
    }
}
