//! # Heartbeat Clock
//!
//! Decides when the next liveness message is due. The clock never sends on
//! its own; the session routes the heartbeat through the retry policy and
//! the pooled handle like any other traffic, so it obeys the same failure
//! handling.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct HeartbeatClock {
    interval: Duration,
    last_sent: Instant,
}

impl HeartbeatClock {
    /// Starts the clock as if a heartbeat was just sent, so the first one
    /// goes out a full interval after connecting.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: Instant::now(),
        }
    }

    /// True iff at least one interval has elapsed since the last send.
    pub fn due_at(&self, now: Instant) -> bool {
        now.duration_since(self.last_sent) >= self.interval
    }

    pub fn record_sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    /// Time remaining until the next heartbeat is due (zero when overdue).
    pub fn until_due(&self, now: Instant) -> Duration {
        self.interval
            .saturating_sub(now.duration_since(self.last_sent))
    }
}
