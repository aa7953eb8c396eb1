//! Trade Feed Adapters
//!
//! Everything that touches the feed's wire format or its transport:
//!
//! - **messages**: serde types for trade frames
//! - **codec**: frame → [`TradeEvent`](crate::domain::trade::TradeEvent) decoding
//! - **reconnect**: fixed-delay reconnection policy
//! - **websocket**: `tokio-tungstenite` transport

pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod websocket;

pub use codec::{DEFAULT_SYMBOL, DecodeError, TradeCodec};
pub use messages::{TradeData, TradeMessage, WireNumber};
pub use reconnect::{DEFAULT_RECONNECT_DELAY, ReconnectConfig, ReconnectPolicy};
pub use websocket::{WebSocketSession, WebSocketTransport};
