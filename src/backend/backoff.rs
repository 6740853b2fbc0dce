//! Transport-level retry with exponential backoff and jitter.
//!
//! The pipeline never retries a failed step on its own; [`BackoffConfig`] is
//! the provider-side policy for transient HTTP errors (429, 5xx). The default
//! is [`BackoffConfig::none()`]. For a hosted API with rate limits (Groq,
//! OpenAI) while a user waits, [`BackoffConfig::interactive()`] is a sensible
//! choice.

use std::time::Duration;

/// Configuration for transport-level retry with exponential backoff and jitter.
///
/// # Example
///
/// ```
/// use crew_pipeline::backend::BackoffConfig;
///
/// let none = BackoffConfig::none();
/// assert_eq!(none.max_retries, 0);
///
/// let standard = BackoffConfig::standard();
/// assert_eq!(standard.max_retries, 3);
///
/// let custom = BackoffConfig::interactive().with_max_retries(1);
/// assert_eq!(custom.max_retries, 1);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum number of transport retries. Default: 0 (no retry).
    pub max_retries: u32,

    /// Initial delay before first retry.
    pub initial_delay: Duration,

    /// Multiplier applied to delay after each retry.
    pub multiplier: f64,

    /// Upper bound for a single delay.
    pub max_delay: Duration,

    /// Jitter strategy.
    pub jitter: JitterStrategy,

    /// HTTP status codes that trigger retry. Default: `[429, 500, 502, 503, 504]`.
    pub retryable_statuses: Vec<u16>,

    /// Whether to wait for the provider's `Retry-After` instead of the
    /// computed delay.
    pub respect_retry_after: bool,
}

/// Jitter strategy applied to the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Delay is exactly the calculated value.
    None,

    /// Random value in `[0, calculated_delay]`.
    Full,

    /// `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// No transport retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::standard()
        }
    }

    /// 3 retries, 1s initial, 2x multiplier, 60s max, full jitter.
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }

    /// Short waits for a user sitting in front of a form:
    /// 2 retries, 500ms initial, 10s max.
    pub fn interactive() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            multiplier: 1.5,
            max_delay: Duration::from_secs(10),
            jitter: JitterStrategy::Equal,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }

    /// Override the retry count, keeping the delay schedule.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Calculate the delay for attempt N (0-indexed).
    ///
    /// The base delay is `initial_delay * multiplier^attempt`, capped at
    /// `max_delay`, then jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(multiplier: f64, max_delay: Duration) -> BackoffConfig {
        BackoffConfig {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            multiplier,
            max_delay,
            jitter: JitterStrategy::None,
            retryable_statuses: vec![429],
            respect_retry_after: false,
        }
    }

    #[test]
    fn test_delay_exponential() {
        let config = exact(2.0, Duration::from_secs(60));
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped() {
        let config = exact(10.0, Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(5));
    }

    #[test]
    fn test_full_jitter_within_bounds() {
        let config = BackoffConfig {
            jitter: JitterStrategy::Full,
            ..exact(2.0, Duration::from_secs(60))
        };
        for _ in 0..50 {
            assert!(config.delay_for_attempt(2) <= Duration::from_secs(4));
        }
    }

    #[test]
    fn test_equal_jitter_keeps_half() {
        let config = BackoffConfig {
            jitter: JitterStrategy::Equal,
            ..exact(2.0, Duration::from_secs(60))
        };
        for _ in 0..50 {
            let d = config.delay_for_attempt(1);
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_default_is_none() {
        assert_eq!(BackoffConfig::default().max_retries, 0);
        assert_eq!(BackoffConfig::interactive().max_retries, 2);
    }
}
