//! Trade Event Types
//!
//! Canonical representation of one market trade as it flows through the
//! client, plus the values derived from it for the two consumer paths.
//! These types are codec-agnostic: the wire format lives in
//! `infrastructure::feed`.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Trade Side
// =============================================================================

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Buyer-initiated trade.
    #[default]
    Buy,
    /// Seller-initiated trade.
    Sell,
}

impl TradeSide {
    /// Parse a wire side value.
    ///
    /// Only the exact string `sell` maps to [`TradeSide::Sell`]; anything
    /// else, including a missing value, is a buy.
    #[must_use]
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("sell") => Self::Sell,
            _ => Self::Buy,
        }
    }

    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Trade Event
// =============================================================================

/// One accepted market trade.
///
/// A `TradeEvent` only exists once its price and amount have been parsed
/// into finite, non-negative decimals. Malformed frames never produce one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Opaque feed identifier, stable per event.
    pub id: String,
    /// Instrument identifier.
    pub symbol: String,
    /// Trade price.
    pub price: Decimal,
    /// Aggressor side.
    pub side: TradeSide,
    /// Traded quantity.
    pub amount: Decimal,
    /// Feed timestamp, or receipt time when the feed omitted it.
    pub timestamp: DateTime<Utc>,
}

impl TradeEvent {
    /// Derive the chart point for this trade.
    #[must_use]
    pub const fn price_point(&self) -> PricePoint {
        PricePoint {
            timestamp: self.timestamp,
            price: self.price,
        }
    }
}

// =============================================================================
// Derived Values
// =============================================================================

/// A single `(timestamp, price)` sample for charting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Time of the trade that produced this point.
    pub timestamp: DateTime<Utc>,
    /// Trade price.
    pub price: Decimal,
}

/// A trade delivered in a flushed batch.
///
/// `flash_key` is assigned at flush time and only drives transient
/// highlighting in the consumer. It says nothing about ordering or identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashTrade {
    /// The delivered trade.
    pub trade: TradeEvent,
    /// Monotonically increasing highlight key.
    pub flash_key: u64,
}
