use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Doubling reconnect delay for unexpected disconnects.
///
/// Unlike a bounded retry policy this never gives up: the stream is the
/// process's only input, so the consumer keeps trying until cancelled.
#[derive(Debug)]
pub struct ReconnectBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    current_attempt: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            current_attempt: 0,
        }
    }

    pub fn next_delay(&self) -> Duration {
        let factor = 2u32.saturating_pow(self.current_attempt.min(16));
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }

    /// Sleeps for the next delay. Returns `false` if cancelled while waiting.
    pub async fn sleep(&mut self, cancel: &CancellationToken) -> bool {
        let delay = self.next_delay();
        self.current_attempt = self.current_attempt.saturating_add(1);

        log::warn!(
            "⏳ Reconnect attempt {} in {}ms",
            self.current_attempt,
            delay.as_millis()
        );

        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(5));

        let mut delays = Vec::new();
        for _ in 0..5 {
            delays.push(backoff.next_delay().as_secs());
            backoff.current_attempt += 1;
        }

        assert_eq!(delays, vec![1, 2, 4, 5, 5]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_counts_attempts() {
        let mut backoff = ReconnectBackoff::default();
        let cancel = CancellationToken::new();

        assert!(backoff.sleep(&cancel).await);
        assert!(backoff.sleep(&cancel).await);
        assert_eq!(backoff.attempts(), 2);
    }

    #[tokio::test]
    async fn test_sleep_returns_early_when_cancelled() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(3600), Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(!backoff.sleep(&cancel).await);
    }
}
