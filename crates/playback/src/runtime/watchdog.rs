//! Stall detection for the active stream.
//!
//! The viewer beats the watchdog on every accepted frame and polls it on a
//! fixed interval. An armed stream that stays quiet past the threshold is
//! reported once; the next frame clears the report.

use std::time::Duration;

use tokio::time::Instant;

/// Interval between watchdog polls in the viewer loop.
pub const WATCHDOG_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug)]
pub struct StreamWatchdog {
    threshold: Duration,
    last_beat: Option<Instant>,
    reported: bool,
}

impl StreamWatchdog {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            last_beat: None,
            reported: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.last_beat.is_some()
    }

    /// Start watching a freshly opened stream.
    pub fn arm(&mut self, now: Instant) {
        self.last_beat = Some(now);
        self.reported = false;
    }

    /// Stop watching; the stream ended or broke.
    pub fn disarm(&mut self) {
        self.last_beat = None;
        self.reported = false;
    }

    /// Record activity. Returns `true` when this clears a stall report.
    pub fn beat(&mut self, now: Instant) -> bool {
        if self.last_beat.is_none() {
            return false;
        }
        self.last_beat = Some(now);
        std::mem::take(&mut self.reported)
    }

    /// Returns `true` exactly once per quiet period longer than the threshold.
    pub fn check(&mut self, now: Instant) -> bool {
        let Some(last_beat) = self.last_beat else {
            return false;
        };
        if self.reported || now.saturating_duration_since(last_beat) <= self.threshold {
            return false;
        }
        self.reported = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_quiet_period() {
        let mut watchdog = StreamWatchdog::new(Duration::from_secs(2));
        let start = Instant::now();
        assert!(!watchdog.check(start + Duration::from_secs(5)));

        watchdog.arm(start);
        assert!(!watchdog.check(start + Duration::from_secs(2)));
        assert!(watchdog.check(start + Duration::from_secs(3)));
        assert!(!watchdog.check(start + Duration::from_secs(4)));

        assert!(watchdog.beat(start + Duration::from_secs(5)));
        assert!(!watchdog.beat(start + Duration::from_secs(5)));
        assert!(!watchdog.check(start + Duration::from_secs(6)));
        assert!(watchdog.check(start + Duration::from_secs(8)));
    }

    #[test]
    fn disarmed_watchdog_stays_quiet() {
        let mut watchdog = StreamWatchdog::new(Duration::from_millis(10));
        let start = Instant::now();
        watchdog.arm(start);
        watchdog.disarm();
        assert!(!watchdog.is_armed());
        assert!(!watchdog.beat(start));
        assert!(!watchdog.check(start + Duration::from_secs(1)));
    }
}
