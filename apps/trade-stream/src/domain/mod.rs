//! Domain Layer - Core trade types and bookkeeping.
//!
//! Pure types with no I/O: the trade model, connection state, bounded
//! histories and the batch coalescer. Everything here is synchronous and
//! deterministic so it can be tested without a runtime.

/// Trade events and the values derived from them.
pub mod trade;

/// Connection lifecycle state.
pub mod connection;

/// Bounded price history and display log.
pub mod history;

/// Frame-coalesced batching of trades.
pub mod batch;
