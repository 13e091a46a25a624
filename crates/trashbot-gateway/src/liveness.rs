//! [`Liveness`] – per-connection heartbeat deadline.
//!
//! The session refreshes it on every inbound frame (including pongs to the
//! server's keepalive pings).  A peer that stays silent past the deadline is
//! treated as lost, which stops the robot just like a clean close.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Liveness {
    last_seen: Instant,
    timeout: Duration,
}

impl Liveness {
    /// Start tracking with the deadline counting from now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_seen: Instant::now(),
            timeout,
        }
    }

    /// Record activity from the peer.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn silent_for(&self) -> Duration {
        self.last_seen.elapsed()
    }

    /// The instant at which the peer counts as lost unless it is heard from
    /// again.
    pub fn deadline(&self) -> Instant {
        self.last_seen + self.timeout
    }
}
