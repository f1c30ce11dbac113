use std::time::Duration;

use converge_api::ConfigError;

/// Bounds for one "wait until" call.
///
/// Both `max_attempts` and `timeout` are enforced; whichever is hit first
/// ends the wait. Immutable and `Copy`: pass it by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    timeout: Duration,
    poll_interval: Duration,
    initial_delay: Duration,
}

impl RetryPolicy {
    /// Fails with `ConfigError::InvalidPolicy` unless `max_attempts >= 1`
    /// and `timeout > 0`.
    pub fn new(
        max_attempts: u32,
        timeout: Duration,
        poll_interval: Duration,
        initial_delay: Duration,
    ) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::InvalidPolicy("max_attempts must be >= 1".into()));
        }
        if timeout.is_zero() {
            return Err(ConfigError::InvalidPolicy("timeout must be > 0".into()));
        }
        Ok(Self { max_attempts, timeout, poll_interval, initial_delay })
    }

    /// No initial delay.
    pub fn attempts(max_attempts: u32, poll_interval: Duration, timeout: Duration) -> Result<Self, ConfigError> {
        Self::new(max_attempts, timeout, poll_interval, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Copy with a different initial delay.
    pub fn with_initial_delay(self, initial_delay: Duration) -> Self {
        Self { initial_delay, ..self }
    }
}

impl Default for RetryPolicy {
    /// 20 attempts, 500ms apart, within 15s.
    fn default() -> Self {
        Self {
            max_attempts: 20,
            timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(500),
            initial_delay: Duration::ZERO,
        }
    }
}

impl std::fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} attempts every {}ms within {}ms (initial delay {}ms)",
            self.max_attempts,
            self.poll_interval.as_millis(),
            self.timeout.as_millis(),
            self.initial_delay.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_attempts_and_zero_timeout() {
        assert!(matches!(
            RetryPolicy::new(0, Duration::from_secs(1), Duration::ZERO, Duration::ZERO),
            Err(ConfigError::InvalidPolicy(_))
        ));
        assert!(matches!(
            RetryPolicy::new(3, Duration::ZERO, Duration::ZERO, Duration::ZERO),
            Err(ConfigError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn zero_interval_and_delay_are_allowed() {
        let p = RetryPolicy::new(1, Duration::from_millis(1), Duration::ZERO, Duration::ZERO).unwrap();
        assert_eq!(p.max_attempts(), 1);
        assert!(p.poll_interval().is_zero());
    }

    #[test]
    fn with_initial_delay_leaves_original_untouched() {
        let base = RetryPolicy::attempts(3, Duration::from_millis(100), Duration::from_secs(10)).unwrap();
        let delayed = base.with_initial_delay(Duration::from_millis(50));
        assert!(base.initial_delay().is_zero());
        assert_eq!(delayed.initial_delay(), Duration::from_millis(50));
        assert_eq!(delayed.max_attempts(), base.max_attempts());
    }
}
