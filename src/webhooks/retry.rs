//! Retry scheduling for webhook deliveries.
//!
//! A fixed ladder, not exponential backoff: the schedule is part of the
//! platform's documented contract with merchants.

use std::time::Duration;

/// Delay before each attempt: immediate, +5 min, +30 min, +2 h, +12 h,
/// +24 h. Six attempts total (one initial + five retries).
const LADDER_SECS: [u64; 6] = [0, 300, 1_800, 7_200, 43_200, 86_400];

/// Decides whether and when a failed delivery attempt is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: LADDER_SECS.iter().map(|s| Duration::from_secs(*s)).collect(),
        }
    }
}

impl RetryPolicy {
    /// A custom schedule. Tests use this to compress hours into
    /// milliseconds; attempt count follows the schedule length.
    pub fn with_delays(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Total number of attempts, including the initial one.
    pub fn max_attempts(&self) -> i64 {
        self.delays.len() as i64
    }

    /// Delay to wait before the given 1-based attempt number, or `None`
    /// once the ladder is exhausted.
    pub fn delay_before(&self, attempt_number: i64) -> Option<Duration> {
        if attempt_number < 1 {
            return None;
        }
        self.delays.get(attempt_number as usize - 1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 6);
        assert_eq!(policy.delay_before(1), Some(Duration::ZERO));
        assert_eq!(policy.delay_before(2), Some(Duration::from_secs(300)));
        assert_eq!(policy.delay_before(3), Some(Duration::from_secs(1_800)));
        assert_eq!(policy.delay_before(4), Some(Duration::from_secs(7_200)));
        assert_eq!(policy.delay_before(5), Some(Duration::from_secs(43_200)));
        assert_eq!(policy.delay_before(6), Some(Duration::from_secs(86_400)));
        assert_eq!(policy.delay_before(7), None);
    }

    #[test]
    fn test_out_of_range() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(0), None);
        assert_eq!(policy.delay_before(-1), None);
    }

    #[test]
    fn test_custom_schedule() {
        let policy = RetryPolicy::with_delays(vec![Duration::ZERO, Duration::from_millis(5)]);
        assert_eq!(policy.max_attempts(), 2);
        assert_eq!(policy.delay_before(2), Some(Duration::from_millis(5)));
        assert_eq!(policy.delay_before(3), None);
    }
}
