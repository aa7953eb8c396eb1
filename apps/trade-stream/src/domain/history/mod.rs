//! Bounded Trade Histories
//!
//! Two fixed-capacity stores sit behind the consumer paths:
//!
//! - [`HistoryBuffer`]: oldest-first ring of price points for charting.
//! - [`DisplayLog`]: newest-first list of delivered trades for the trade table.
//!
//! Both evict instead of growing, so their memory is bounded no matter how
//! long the feed runs.

use std::collections::VecDeque;

use super::trade::{FlashTrade, PricePoint};

/// Default number of price points kept for charting.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Default number of trades kept in the display log.
pub const DEFAULT_DISPLAY_CAPACITY: usize = 100;

// =============================================================================
// History Buffer
// =============================================================================

/// Ring of the most recent price points, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    points: VecDeque<PricePoint>,
    capacity: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append the newest point, evicting the oldest once over capacity.
    pub fn record(&mut self, point: PricePoint) {
        self.points.push_back(point);
        if self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// Most recently recorded point.
    #[must_use]
    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.back()
    }

    /// Number of stored points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no point has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Maximum number of stored points.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Points in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter()
    }

    /// Copy of the points in chronological order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<PricePoint> {
        self.points.iter().copied().collect()
    }
}

// =============================================================================
// Display Log
// =============================================================================

/// Newest-first list of delivered trades.
#[derive(Debug, Clone)]
pub struct DisplayLog {
    trades: VecDeque<FlashTrade>,
    capacity: usize,
}

impl Default for DisplayLog {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_CAPACITY)
    }
}

impl DisplayLog {
    /// Create an empty log. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            trades: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend a flushed batch and truncate to capacity.
    ///
    /// `batch` is in arrival order; its last element is the newest trade
    /// and ends up at the front.
    pub fn apply_batch(&mut self, batch: &[FlashTrade]) {
        // Only the newest `capacity` trades of the batch can survive.
        let skip = batch.len().saturating_sub(self.capacity);
        for trade in &batch[skip..] {
            self.trades.push_front(trade.clone());
        }
        self.trades.truncate(self.capacity);
    }

    /// Newest trade, if any.
    #[must_use]
    pub fn newest(&self) -> Option<&FlashTrade> {
        self.trades.front()
    }

    /// Number of stored trades.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trades.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Maximum number of stored trades.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Trades, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &FlashTrade> {
        self.trades.iter()
    }

    /// Copy of the trades, newest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<FlashTrade> {
        self.trades.iter().cloned().collect()
    }
}
