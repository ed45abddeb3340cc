//! Keepalive accounting for the per-link ping/pong heartbeat.
//!
//! The outbound writer task sends a Ping every interval and feeds the
//! result of the alive check into [`Heartbeat::tick`]. Once the allowed
//! number of consecutive misses is used up the link is declared dead and
//! torn down like any other socket close.

use std::time::Duration;

/// Outcome of one heartbeat interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatTick {
    /// The client responded since the last check.
    Alive,
    /// No response this interval; more misses are still allowed.
    Missed(u32),
    /// The miss budget is spent — the link is dead.
    Expired,
}

/// Missed-pong counter.
///
/// `max_missed` is `timeout / interval`, clamped to at least 1.
#[derive(Debug)]
pub struct Heartbeat {
    max_missed: u32,
    missed: u32,
}

impl Heartbeat {
    /// Build from the configured ping interval and timeout.
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        let interval_secs = interval.as_secs().max(1);
        #[allow(clippy::cast_possible_truncation)]
        let max_missed = (timeout.as_secs() / interval_secs).max(1) as u32;
        Self {
            max_missed,
            missed: 0,
        }
    }

    /// Record one interval. `was_alive` is the checked-and-reset alive
    /// flag from the link.
    pub fn tick(&mut self, was_alive: bool) -> HeartbeatTick {
        if was_alive {
            self.missed = 0;
            return HeartbeatTick::Alive;
        }
        self.missed += 1;
        if self.missed >= self.max_missed {
            HeartbeatTick::Expired
        } else {
            HeartbeatTick::Missed(self.missed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_missed_from_timeout_and_interval() {
        // 90s timeout / 30s interval = 3 misses allowed
        let mut hb = Heartbeat::new(Duration::from_secs(30), Duration::from_secs(90));
        assert_eq!(hb.tick(false), HeartbeatTick::Missed(1));
        assert_eq!(hb.tick(false), HeartbeatTick::Missed(2));
        assert_eq!(hb.tick(false), HeartbeatTick::Expired);
    }

    #[test]
    fn alive_resets_the_miss_count() {
        let mut hb = Heartbeat::new(Duration::from_secs(30), Duration::from_secs(90));
        assert_eq!(hb.tick(false), HeartbeatTick::Missed(1));
        assert_eq!(hb.tick(false), HeartbeatTick::Missed(2));
        assert_eq!(hb.tick(true), HeartbeatTick::Alive);
        assert_eq!(hb.tick(false), HeartbeatTick::Missed(1));
    }

    #[test]
    fn at_least_one_miss_is_allowed() {
        // Degenerate config: timeout shorter than interval
        let mut hb = Heartbeat::new(Duration::from_secs(60), Duration::from_secs(1));
        assert_eq!(hb.tick(false), HeartbeatTick::Expired);
    }

    #[test]
    fn always_alive_never_expires() {
        let mut hb = Heartbeat::new(Duration::from_secs(30), Duration::from_secs(90));
        for _ in 0..100 {
            assert_eq!(hb.tick(true), HeartbeatTick::Alive);
        }
    }
}
