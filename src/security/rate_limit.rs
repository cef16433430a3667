//! Token bucket rate limiter with a background refill task.
//!
//! # Design Decisions
//! - One bucket per process, shared by every request
//! - The permit count is a single atomic; refill and acquire never take a lock
//! - Refill adds one permit per `interval / rate`, never beyond `rate`
//! - `try_acquire` never waits; exhaustion is a normal `false`
//! - Zero rate or zero interval fails closed: no task, every acquire denied

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Bounded permit counter.
struct TokenBucket {
    permits: AtomicU32,
    capacity: u32,
}

impl TokenBucket {
    fn new(capacity: u32) -> Self {
        Self {
            permits: AtomicU32::new(0),
            capacity,
        }
    }

    /// Add one permit unless the bucket is full. A refill that finds the
    /// bucket full is discarded.
    fn refill_one(&self) -> bool {
        self.permits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    fn try_acquire(&self) -> bool {
        self.permits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Process-scoped token bucket limiter.
///
/// Created once at startup with [`TokenBucketLimiter::start`]; the refill task
/// ends on the shutdown broadcast, on [`TokenBucketLimiter::stop`], or when the
/// limiter is dropped.
pub struct TokenBucketLimiter {
    bucket: Arc<TokenBucket>,
    refill: Option<JoinHandle<()>>,
}

impl TokenBucketLimiter {
    /// Configure a limiter with `rate` permits replenished every `interval`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(rate: u32, interval: Duration, shutdown: broadcast::Receiver<()>) -> Self {
        let bucket = Arc::new(TokenBucket::new(rate));

        if rate == 0 || interval.is_zero() {
            tracing::warn!(
                rate,
                interval = ?interval,
                "Rate limiter has no replenishment, all requests will be denied"
            );
            return Self { bucket, refill: None };
        }

        let period = (interval / rate).max(Duration::from_nanos(1));
        tracing::info!(rate, interval = ?interval, period = ?period, "Rate limiter refill task starting");

        let refill = tokio::spawn(refill_loop(bucket.clone(), period, shutdown));
        Self {
            bucket,
            refill: Some(refill),
        }
    }

    /// Consume one permit if available. Never blocks.
    pub fn try_acquire(&self) -> bool {
        self.bucket.try_acquire()
    }

    /// Permits currently available.
    pub fn available(&self) -> u32 {
        self.bucket.permits.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> u32 {
        self.bucket.capacity
    }

    /// Stop the refill task. Permits already in the bucket stay usable.
    pub fn stop(&self) {
        if let Some(handle) = &self.refill {
            handle.abort();
        }
    }
}

impl Drop for TokenBucketLimiter {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn refill_loop(bucket: Arc<TokenBucket>, period: Duration, mut shutdown: broadcast::Receiver<()>) {
    // First permit arrives one period after start, not immediately.
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                bucket.refill_one();
            }
            _ = shutdown.recv() => {
                tracing::info!("Rate limiter received shutdown signal, stopping refill");
                break;
            }
        }
    }
}
