use std::time::Duration;

pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Bounded exponential backoff applied to failed polls.
///
/// `max_retries == 0` stops on the first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fail_fast()
    }
}

impl RetryPolicy {
    pub const fn fail_fast() -> Self {
        Self {
            max_retries: 0,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay.max(base_delay);
        self
    }

    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// retry budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        Some(self.pause_for(attempt))
    }

    /// Same doubling schedule as [`delay_for`](Self::delay_for), without the
    /// retry budget. Used to pace failures that are never fatal.
    pub fn pause_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_retries)
            .map_while(|attempt| self.delay_for(attempt))
            .collect()
    }
}

/// Tracks consecutive failures against a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Records a failure and returns the delay before the next attempt.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        self.policy.delay_for(self.failures)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_fast_never_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), None);
        assert!(policy.schedule().is_empty());
    }

    #[test]
    fn delays_double_until_capped() {
        let policy = RetryPolicy::fail_fast()
            .with_max_retries(5)
            .with_delays(Duration::from_millis(100), Duration::from_millis(500));

        assert_eq!(
            policy.schedule(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
    }

    #[test]
    fn large_attempts_saturate_instead_of_overflowing() {
        let policy = RetryPolicy::fail_fast()
            .with_max_retries(u32::MAX)
            .with_delays(Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Some(Duration::from_secs(30)));
    }

    #[test]
    fn max_delay_never_drops_below_base() {
        let policy = RetryPolicy::fail_fast()
            .with_max_retries(1)
            .with_delays(Duration::from_millis(300), Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(300)));
    }

    #[test]
    fn pause_ignores_the_retry_budget() {
        let policy = RetryPolicy::fail_fast()
            .with_delays(Duration::from_millis(100), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), None);
        assert_eq!(policy.pause_for(1), Duration::from_millis(100));
        assert_eq!(policy.pause_for(2), Duration::from_millis(200));
        assert_eq!(policy.pause_for(3), Duration::from_millis(250));
    }

    #[test]
    fn backoff_resets_after_success() {
        let mut backoff = Backoff::new(RetryPolicy::fail_fast().with_max_retries(2));
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.failures(), 3);

        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert!(backoff.next_delay().is_some());
    }
}
