use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};

/// Cap on consecutive non-productive connection attempts, unless infinite
/// retry is requested.
pub(crate) const DEFAULT_MAX_ATTEMPTS: usize = 15;

/// Reconnection backoff: exponential delays with no elapsed-time bound and an
/// optional attempt cap.
///
/// The attempt counter is reset whenever a session manages to receive at
/// least one message, so only sessions that die without delivering anything
/// count against the cap.
pub(crate) struct RetryBackoff {
    builder: ExponentialBuilder,
    delays: ExponentialBackoff,
    attempts: u32,
}

impl RetryBackoff {
    /// Applies the attempt cap policy on top of `base` and starts a fresh
    /// delay sequence.
    pub fn new(base: ExponentialBuilder, infinite_retry: bool) -> Self {
        let builder = if infinite_retry {
            base.without_max_times()
        } else {
            base.with_max_times(DEFAULT_MAX_ATTEMPTS)
        };

        Self { delays: builder.clone().build(), builder, attempts: 0 }
    }

    /// Default reconnection curve: 500ms doubling up to 60s, jittered.
    pub fn default_builder() -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(60))
            .with_jitter()
    }

    /// The next delay to sleep before reconnecting, or `None` once the
    /// attempt cap is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.delays.next();
        if delay.is_some() {
            self.attempts += 1;
        }
        delay
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Restarts the delay sequence; called after any productive session.
    pub fn reset(&mut self) {
        self.delays = self.builder.clone().build();
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_builder() -> ExponentialBuilder {
        // No jitter so delays are deterministic.
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(80))
    }

    #[test]
    fn capped_backoff_stops_after_max_attempts() {
        let mut backoff = RetryBackoff::new(test_builder(), false);

        for attempt in 0..DEFAULT_MAX_ATTEMPTS {
            assert!(backoff.next_delay().is_some(), "attempt {attempt} should still sleep");
        }

        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempts(), u32::try_from(DEFAULT_MAX_ATTEMPTS).unwrap());
    }

    #[test]
    fn infinite_retry_never_stops() {
        let mut backoff = RetryBackoff::new(test_builder(), true);

        for _ in 0..DEFAULT_MAX_ATTEMPTS * 4 {
            assert!(backoff.next_delay().is_some());
        }
    }

    #[test]
    fn delays_grow_exponentially_until_capped() {
        let mut backoff = RetryBackoff::new(test_builder(), false);

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(20)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(40)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(80)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(80)));
    }

    #[test]
    fn reset_restarts_the_sequence_and_counter() {
        let mut backoff = RetryBackoff::new(test_builder(), false);

        for _ in 0..DEFAULT_MAX_ATTEMPTS {
            backoff.next_delay();
        }
        backoff.reset();

        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
    }
}
