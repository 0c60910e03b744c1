//! Partial-publish throttle.
//!
//! The incremental build loop can run thousands of units per second;
//! materializing and publishing a render snapshot for each would drown the
//! observer. Partials are therefore rate-limited to one per period.

use std::time::{Duration, Instant};

/// Minimum spacing between two published partial snapshots.
pub(crate) const PUBLISH_INTERVAL: Duration = Duration::from_millis(100);

/// Timing state for throttled publishing.
///
/// The clock starts at construction, i.e. at the publish that precedes the
/// build loop, so the first partial is also spaced a full period away.
pub struct PublishThrottle {
    period: Duration,
    last_publish: Instant,
}

impl PublishThrottle {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_publish: Instant::now(),
        }
    }

    /// True when a full period has elapsed since the last publish.
    ///
    /// A `true` return resets the clock: the caller is expected to publish.
    pub fn ready(&mut self) -> bool {
        if self.last_publish.elapsed() < self.period {
            return false;
        }
        self.last_publish = Instant::now();
        true
    }
}
