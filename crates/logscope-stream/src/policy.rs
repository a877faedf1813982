use std::time::Duration;

/// Default delay before the first reconnect attempt
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(3000);

/// Default number of reconnect attempts before giving up on streaming
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Deterministic exponential backoff with an attempt ceiling
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before 1-indexed `attempt`: `base * 2^(attempt - 1)`.
    ///
    /// Returns `None` when `attempt` is zero or past the ceiling.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<_> = (1..=5)
            .map(|k| policy.delay_for(k).unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![3000, 6000, 12000, 24000, 48000]);
    }

    #[test]
    fn test_no_attempt_past_ceiling() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(6), None);
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn test_large_attempt_saturates() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), u32::MAX);
        assert!(policy.delay_for(40).is_some());
    }
}
