//! Trade Feed Wire Messages
//!
//! Serde types for the inbound frame format:
//!
//! ```json
//! {
//!   "id": "1700000000000-0",
//!   "data": {
//!     "symbol": "BTC/USD",
//!     "price": "45012.55",
//!     "side": "buy",
//!     "timestamp": "2024-01-15T10:00:00.123456",
//!     "amount": "0.125000"
//!   }
//! }
//! ```
//!
//! Every field inside `data` is optional at this level. Defaulting and
//! validation happen in the codec, so a frame with a bad side or timestamp
//! still deserializes and can be repaired there.

use serde::{Deserialize, Serialize};

/// One trade frame as sent by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Stream entry identifier.
    pub id: String,
    /// Trade payload.
    pub data: TradeData,
}

/// Payload of a trade frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeData {
    /// Instrument identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Trade price as a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<WireNumber>,
    /// `buy` or `sell`; any other value is read as `buy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<serde_json::Value>,
    /// ISO-8601 timestamp, with or without an offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<serde_json::Value>,
    /// Traded quantity as a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<WireNumber>,
}

/// Numeric field as it appears on the wire.
///
/// The feed sends decimal strings, but a bare JSON number is tolerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireNumber {
    /// Decimal string such as `"45012.55"`.
    Text(String),
    /// Bare JSON number.
    Number(serde_json::Number),
}

impl WireNumber {
    /// Text form used for decimal parsing.
    #[must_use]
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Self::Text(s) => std::borrow::Cow::Borrowed(s.trim()),
            Self::Number(n) => std::borrow::Cow::Owned(n.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_full_frame() {
        let json = r#"{"id":"1-0","data":{"symbol":"ETH/USD","price":"2500.10","side":"sell","timestamp":"2024-01-15T10:00:00Z","amount":"1.5"}}"#;
        let msg: TradeMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "1-0");
        assert_eq!(msg.data.symbol.as_deref(), Some("ETH/USD"));
        assert_eq!(msg.data.price, Some(WireNumber::Text("2500.10".to_string())));
        assert_eq!(msg.data.side, Some(serde_json::json!("sell")));
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let msg: TradeMessage = serde_json::from_str(r#"{"id":"1-0","data":{}}"#).unwrap();
        assert_eq!(msg.data, TradeData::default());
    }

    #[test]
    fn numeric_price_is_accepted() {
        let msg: TradeMessage =
            serde_json::from_str(r#"{"id":"1-0","data":{"price":101.5,"amount":2}}"#).unwrap();
        assert_eq!(msg.data.price.unwrap().as_text(), "101.5");
        assert_eq!(msg.data.amount.unwrap().as_text(), "2");
    }

    #[test]
    fn missing_data_is_an_error() {
        assert!(serde_json::from_str::<TradeMessage>(r#"{"id":"1-0"}"#).is_err());
    }
}
