//! Trade Frame Codec
//!
//! Turns one raw frame into a validated [`TradeEvent`] or rejects it.
//!
//! # Rules
//!
//! - `id` and `data` are required.
//! - `price` and `amount` must parse as finite, non-negative decimals.
//!   Plain decimals and scientific notation are accepted. Values must fit a
//!   `Decimal` exactly: at most 28 significant fractional digits and no more than
//!   `Decimal::MAX` in magnitude.
//! - A missing or empty `symbol` falls back to the configured default.
//! - `side` is `sell` only for the exact string `sell`.
//! - A missing or unparseable `timestamp` falls back to the receipt time.
//!
//! Decoding has no side effects. The receipt time is an explicit argument in
//! the `*_at` variants so results are reproducible.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;

use super::messages::{TradeMessage, WireNumber};
use crate::application::ports::InboundFrame;
use crate::domain::trade::{TradeEvent, TradeSide};

/// Instrument used when a frame carries no symbol.
pub const DEFAULT_SYMBOL: &str = "BTC/USD";

/// Decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not a trade or carries an invalid quantity.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl DecodeError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload(reason.into())
    }
}

/// JSON codec for trade frames.
#[derive(Debug, Clone)]
pub struct TradeCodec {
    default_symbol: String,
}

impl Default for TradeCodec {
    fn default() -> Self {
        Self::new(DEFAULT_SYMBOL)
    }
}

impl TradeCodec {
    /// Create a codec that fills missing symbols with `default_symbol`.
    #[must_use]
    pub fn new(default_symbol: impl Into<String>) -> Self {
        Self {
            default_symbol: default_symbol.into(),
        }
    }

    /// Symbol substituted for frames without one.
    #[must_use]
    pub fn default_symbol(&self) -> &str {
        &self.default_symbol
    }

    /// Decode a transport frame, stamping defaults with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] if the frame is not a valid trade.
    pub fn decode_frame(&self, frame: &InboundFrame) -> Result<TradeEvent, DecodeError> {
        self.decode_frame_at(frame, Utc::now())
    }

    /// Decode a transport frame with an explicit receipt time.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] if the frame is not a valid trade.
    pub fn decode_frame_at(
        &self,
        frame: &InboundFrame,
        received_at: DateTime<Utc>,
    ) -> Result<TradeEvent, DecodeError> {
        match frame {
            InboundFrame::Text(text) => self.decode_text_at(text, received_at),
            InboundFrame::Binary(bytes) => self.decode_bytes_at(bytes, received_at),
        }
    }

    /// Decode a text payload, stamping defaults with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] if the text is not a valid trade.
    pub fn decode_text(&self, text: &str) -> Result<TradeEvent, DecodeError> {
        self.decode_text_at(text, Utc::now())
    }

    /// Decode a binary payload, stamping defaults with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] if the bytes are not a valid trade.
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<TradeEvent, DecodeError> {
        self.decode_bytes_at(bytes, Utc::now())
    }

    /// Decode a binary payload holding UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] if the bytes are not UTF-8
    /// or not a valid trade.
    pub fn decode_bytes_at(
        &self,
        bytes: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<TradeEvent, DecodeError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| DecodeError::malformed(format!("binary frame is not UTF-8: {e}")))?;
        self.decode_text_at(text, received_at)
    }

    /// Decode a text payload with an explicit receipt time.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] if the text is not a valid trade.
    pub fn decode_text_at(
        &self,
        text: &str,
        received_at: DateTime<Utc>,
    ) -> Result<TradeEvent, DecodeError> {
        let message: TradeMessage = serde_json::from_str(text.trim())
            .map_err(|e| DecodeError::malformed(format!("not a trade frame: {e}")))?;
        let data = message.data;

        let price = parse_quantity("price", data.price.as_ref())?;
        let amount = parse_quantity("amount", data.amount.as_ref())?;

        let symbol = data
            .symbol
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.default_symbol.clone());

        let side = TradeSide::from_wire(data.side.as_ref().and_then(serde_json::Value::as_str));

        let timestamp = data
            .timestamp
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .and_then(parse_timestamp)
            .unwrap_or(received_at);

        Ok(TradeEvent {
            id: message.id,
            symbol,
            price,
            side,
            amount,
            timestamp,
        })
    }

    /// Encode a trade back into the wire format.
    #[must_use]
    pub fn encode(&self, trade: &TradeEvent) -> String {
        serde_json::json!({
            "id": trade.id,
            "data": {
                "symbol": trade.symbol,
                "price": trade.price.to_string(),
                "side": trade.side.as_str(),
                "timestamp": trade.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                "amount": trade.amount.to_string(),
            }
        })
        .to_string()
    }
}

/// Largest digit count of a `Decimal` mantissa.
const MAX_DIGITS: usize = 29;

/// Largest scale a `Decimal` supports.
const MAX_SCALE: i64 = 28;

/// Parse a decimal quantity, rejecting missing, non-finite and negative values.
fn parse_quantity(field: &str, value: Option<&WireNumber>) -> Result<Decimal, DecodeError> {
    let value = value.ok_or_else(|| DecodeError::malformed(format!("missing field {field}")))?;
    let text = value.as_text();
    let text = text.trim();
    if text.is_empty() {
        return Err(DecodeError::malformed(format!("empty field {field}")));
    }

    let parsed = parse_decimal(text)
        .map_err(|reason| DecodeError::malformed(format!("invalid {field} {text:?}: {reason}")))?;

    if parsed.is_sign_negative() && !parsed.is_zero() {
        return Err(DecodeError::malformed(format!(
            "negative {field}: {text}"
        )));
    }

    Ok(parsed)
}

/// Exact conversion of a plain or scientific decimal string.
///
/// Accepts `[+-]digits[.digits][(e|E)[+-]digits]` with at least one mantissa
/// digit. Values a `Decimal` cannot hold exactly (more than 28 fractional
/// digits or a magnitude above `Decimal::MAX`) are rejected, never rounded.
fn parse_decimal(text: &str) -> Result<Decimal, &'static str> {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, Some(exponent)),
        None => (unsigned, None),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    if int_part.is_empty() && frac_part.is_empty() {
        return Err("no digits");
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return Err("not a decimal number");
    }
    let exponent = match exponent {
        None => None,
        Some(exp) => {
            let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err("malformed exponent");
            }
            Some(exp.parse::<i32>())
        }
    };

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes())
        .skip_while(|&b| b == b'0')
        .collect();
    if digits.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let exponent = match exponent {
        None => 0,
        Some(Ok(exp)) => i64::from(exp),
        Some(Err(_)) => return Err("exponent out of range"),
    };
    let mut scale = i64::try_from(frac_part.len()).map_err(|_| "too many digits")? - exponent;

    while (scale > MAX_SCALE || digits.len() > MAX_DIGITS)
        && scale > 0
        && digits.last() == Some(&b'0')
    {
        digits.pop();
        scale -= 1;
    }
    if scale > MAX_SCALE {
        return Err("more than 28 decimal places");
    }
    if scale < 0 {
        let zeros = usize::try_from(-scale).map_err(|_| "out of range")?;
        if digits.len().saturating_add(zeros) > MAX_DIGITS {
            return Err("out of range");
        }
        digits.resize(digits.len() + zeros, b'0');
        scale = 0;
    }
    if digits.len() > MAX_DIGITS {
        return Err("out of range");
    }

    let magnitude = digits
        .iter()
        .fold(0i128, |acc, d| acc * 10 + i128::from(d - b'0'));
    let mantissa = if negative { -magnitude } else { magnitude };
    let scale = u32::try_from(scale).map_err(|_| "out of range")?;
    Decimal::try_from_i128_with_scale(mantissa, scale).map_err(|_| "out of range")
}

/// Parse an ISO-8601 timestamp. Values without an offset are read as UTC.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
