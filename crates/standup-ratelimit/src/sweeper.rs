//! Background eviction of stale rate limit counters.
//!
//! Without sweeping, every identifier that ever made a request would keep
//! an entry forever. The sweeper runs [`RateLimiter::sweep`] on a fixed
//! interval for as long as the limiter is alive.

use std::sync::{Arc, Weak};
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

use crate::{RateLimitStore, RateLimiter};

/// Spawns the sweeper for `limiter`.
///
/// Returns `None` when sweeping is disabled (`sweep_interval_secs == 0`).
///
/// The task only holds a `Weak` reference, so it stops by itself once the
/// last `Arc<RateLimiter>` is dropped. The first sweep is delayed by a
/// random fraction of the interval so instances started together don't
/// sweep in lockstep. Missed ticks are skipped rather than replayed.
pub fn spawn_sweeper<S: RateLimitStore>(limiter: &Arc<RateLimiter<S>>) -> Option<JoinHandle<()>> {
    let interval = limiter.config().sweep_interval()?;
    let weak: Weak<RateLimiter<S>> = Arc::downgrade(limiter);

    let jitter_ms = rand::rng().random_range(0..=interval.as_millis() as u64 / 10);
    let start = time::Instant::now() + interval + Duration::from_millis(jitter_ms);

    debug!(interval_secs = interval.as_secs(), "rate limit sweeper started");

    Some(tokio::spawn(async move {
        let mut ticker = time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(limiter) = weak.upgrade() else {
                debug!("rate limiter dropped, sweeper exiting");
                break;
            };
            trace!("sweeping rate limit entries");
            // Failures are logged inside `sweep`; the next tick retries.
            let _ = limiter.sweep().await;
        }
    }))
}
