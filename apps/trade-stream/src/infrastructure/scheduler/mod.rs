//! Frame Schedulers
//!
//! [`FrameScheduler`] implementations. [`IntervalScheduler`] ticks on a
//! fixed timer for headless use; [`ManualScheduler`] ticks only when told
//! to, which lets tests pin down exactly which enqueues share a frame.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{Notify, watch};

use crate::application::ports::FrameScheduler;

/// Default frame interval, roughly one 60 Hz refresh.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

// =============================================================================
// Interval Scheduler
// =============================================================================

/// Frame boundary every `interval` after the request.
#[derive(Debug, Clone, Copy)]
pub struct IntervalScheduler {
    interval: Duration,
}

impl Default for IntervalScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_INTERVAL)
    }
}

impl IntervalScheduler {
    /// Create a scheduler with the given frame interval.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Configured frame interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl FrameScheduler for IntervalScheduler {
    fn next_tick(&self) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(self.interval))
    }
}

// =============================================================================
// Manual Scheduler
// =============================================================================

/// Scheduler driven by explicit [`tick`](Self::tick) calls.
///
/// Clones share state, so a test keeps one clone and hands the other to the
/// client.
#[derive(Debug, Clone)]
pub struct ManualScheduler {
    ticks: Arc<watch::Sender<u64>>,
    requested: Arc<Notify>,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    /// Create a scheduler that has never ticked.
    #[must_use]
    pub fn new() -> Self {
        let (ticks, _) = watch::channel(0);
        Self {
            ticks: Arc::new(ticks),
            requested: Arc::new(Notify::new()),
        }
    }

    /// Mark a frame boundary, resolving every outstanding tick future.
    pub fn tick(&self) {
        self.ticks.send_modify(|count| *count = count.wrapping_add(1));
    }

    /// Number of frame boundaries marked so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        *self.ticks.borrow()
    }

    /// Whether some tick future is still waiting for a boundary.
    #[must_use]
    pub fn has_waiter(&self) -> bool {
        self.ticks.receiver_count() > 0
    }

    /// Wait until a tick future has been requested since the last call.
    pub async fn frame_requested(&self) {
        self.requested.notified().await;
    }
}

impl FrameScheduler for ManualScheduler {
    fn next_tick(&self) -> BoxFuture<'static, ()> {
        let mut ticks = self.ticks.subscribe();
        self.requested.notify_one();
        Box::pin(async move {
            // Sender lives as long as the scheduler; a closed channel also
            // counts as a boundary.
            let _ = ticks.changed().await;
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use tokio::time::Instant;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn interval_scheduler_waits_one_interval() {
        let scheduler = IntervalScheduler::new(Duration::from_millis(16));
        let start = Instant::now();

        scheduler.next_tick().await;

        assert!(start.elapsed() >= Duration::from_millis(16));
        assert!(start.elapsed() < Duration::from_millis(32));
    }

    #[test]
    fn interval_scheduler_default() {
        assert_eq!(IntervalScheduler::default().interval(), DEFAULT_FRAME_INTERVAL);
    }

    #[tokio::test]
    async fn manual_scheduler_resolves_only_on_tick() {
        let scheduler = ManualScheduler::new();
        let mut tick = task::spawn(scheduler.next_tick());

        assert_pending!(tick.poll());
        assert!(scheduler.has_waiter());

        scheduler.tick();

        assert!(tick.is_woken());
        assert_ready!(tick.poll());
        assert_eq!(scheduler.tick_count(), 1);
    }

    #[tokio::test]
    async fn manual_scheduler_ignores_earlier_ticks() {
        let scheduler = ManualScheduler::new();
        scheduler.tick();
        scheduler.tick();

        let mut tick = task::spawn(scheduler.next_tick());
        assert_pending!(tick.poll());

        scheduler.tick();
        assert_ready!(tick.poll());
    }

    #[tokio::test]
    async fn manual_scheduler_reports_requests() {
        let scheduler = ManualScheduler::new();
        let handle = scheduler.clone();

        let tick = scheduler.next_tick();
        handle.frame_requested().await;
        assert!(handle.has_waiter());

        drop(tick);
        assert!(!handle.has_waiter());
    }
}
