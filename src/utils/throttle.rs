//! Log throttling utility
//!
//! Provides a mechanism to limit how often the same log message is recorded,
//! preventing log flooding when a device repeatedly fails to reconnect.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Log throttler that limits how often the same message is logged
///
/// Used by the stream supervisor so a device stuck in a fast restart loop
/// logs once per interval instead of once per attempt.
pub struct LogThrottler {
    last_logged: RwLock<HashMap<String, Instant>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_logged: RwLock::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Returns `true` if the message should be logged (not throttled).
    /// If `true`, the internal timestamp is updated.
    pub fn should_log(&self, key: &str) -> bool {
        let now = Instant::now();
        {
            let map = self.last_logged.read();
            if let Some(last) = map.get(key) {
                if now.duration_since(*last) < self.interval {
                    return false;
                }
            }
        }
        self.last_logged.write().insert(key.to_string(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_logs() {
        let throttler = LogThrottler::with_secs(5);
        assert!(throttler.should_log("dev_A"));
    }

    #[test]
    fn repeated_call_within_window_is_throttled() {
        let throttler = LogThrottler::with_secs(5);
        assert!(throttler.should_log("dev_A"));
        assert!(!throttler.should_log("dev_A"));
    }

    #[test]
    fn distinct_keys_are_independent() {
        let throttler = LogThrottler::with_secs(5);
        assert!(throttler.should_log("dev_A"));
        assert!(throttler.should_log("dev_B"));
    }
}
