//! Batch Coalescer
//!
//! Decouples feed throughput from consumer update cost. Trades are queued as
//! they arrive and handed to the consumer in one batch per frame.
//!
//! The coalescer is pure bookkeeping. The caller owns the timer: when
//! [`BatchCoalescer::enqueue`] reports that a flush must be scheduled, the
//! caller arranges for [`BatchCoalescer::flush`] to run on the next frame
//! boundary. Between two flushes any number of enqueues may happen but only
//! the first one asks for a flush.

use super::trade::{FlashTrade, TradeEvent};

/// Default queue length above which a flush logs a backlog warning.
pub const DEFAULT_PENDING_HIGH_WATER: usize = 10_000;

/// Outcome of enqueueing a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The queue was idle; the caller must schedule exactly one flush.
    ScheduleFlush,
    /// A flush is already scheduled and will pick this trade up.
    AlreadyScheduled,
}

/// Accumulates trades between frame boundaries.
#[derive(Debug)]
pub struct BatchCoalescer {
    pending: Vec<TradeEvent>,
    flush_scheduled: bool,
    next_flash_key: u64,
    high_water: usize,
}

impl Default for BatchCoalescer {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_HIGH_WATER)
    }
}

impl BatchCoalescer {
    /// Create an idle coalescer.
    #[must_use]
    pub const fn new(high_water: usize) -> Self {
        Self {
            pending: Vec::new(),
            flush_scheduled: false,
            next_flash_key: 0,
            high_water,
        }
    }

    /// Queue a trade for the next flush.
    pub fn enqueue(&mut self, trade: TradeEvent) -> Enqueued {
        self.pending.push(trade);
        if self.flush_scheduled {
            Enqueued::AlreadyScheduled
        } else {
            self.flush_scheduled = true;
            Enqueued::ScheduleFlush
        }
    }

    /// Drain the whole queue in arrival order, tagging each trade with a
    /// fresh flash key, and clear the scheduled flag.
    ///
    /// Returns an empty batch when nothing was queued.
    pub fn flush(&mut self) -> Vec<FlashTrade> {
        self.flush_scheduled = false;
        let drained = std::mem::take(&mut self.pending);
        drained
            .into_iter()
            .map(|trade| {
                let flash_key = self.next_flash_key;
                self.next_flash_key = self.next_flash_key.wrapping_add(1);
                FlashTrade { trade, flash_key }
            })
            .collect()
    }

    /// Drop queued trades and forget any scheduled flush.
    ///
    /// Returns the number of discarded trades.
    pub fn cancel(&mut self) -> usize {
        self.flush_scheduled = false;
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }

    /// Number of trades awaiting a flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether a flush has been requested and not yet run.
    #[must_use]
    pub const fn is_flush_scheduled(&self) -> bool {
        self.flush_scheduled
    }

    /// Whether the queue is above its backlog threshold.
    #[must_use]
    pub fn is_over_high_water(&self) -> bool {
        self.pending.len() > self.high_water
    }

    /// Flash key the next flushed trade will receive.
    #[must_use]
    pub const fn next_flash_key(&self) -> u64 {
        self.next_flash_key
    }
}
