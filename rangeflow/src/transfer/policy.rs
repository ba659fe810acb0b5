//! Retry policy for chunk attempts.
//!
//! A chunk is attempted up to [`RetryPolicy::max_attempts`] times. After a
//! retryable failure of attempt `n` the worker waits
//! [`RetryPolicy::delay_for_attempt`]`(n)` before attempt `n + 1`; `None`
//! means the budget is spent.
//!
//! The default is linear backoff: three attempts with waits of 1s then 2s.

use std::time::Duration;

// =============================================================================
// Retry Policy Constants
// =============================================================================

/// Default attempts per chunk, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default linear backoff step (wait = step * failed attempt number).
pub const DEFAULT_RETRY_STEP: Duration = Duration::from_secs(1);

/// Default initial delay for exponential backoff (100ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

/// Default maximum delay for exponential backoff (30 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How a chunk handles transient failures.
///
/// Only errors for which
/// [`TransferError::is_retryable`](crate::error::TransferError::is_retryable)
/// holds are retried; everything else fails the chunk on the spot.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// No retries - fail immediately on error.
    None,

    /// Constant delay between attempts.
    Fixed {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay between retry attempts.
        delay: Duration,
    },

    /// Delay grows by `step` after each failure: `step`, `2 * step`, ...
    Linear {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Increment per failed attempt.
        step: Duration,
    },

    /// Exponential backoff with configurable parameters.
    ExponentialBackoff {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Initial delay after the first failure.
        initial_delay: Duration,
        /// Maximum delay cap (delay won't exceed this).
        max_delay: Duration,
        /// Multiplier applied to delay after each failure (typically 2.0).
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_STEP)
    }
}

impl RetryPolicy {
    /// Creates a linear backoff policy.
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self::Linear { max_attempts, step }
    }

    /// Creates a fixed retry policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Creates a policy that retries without waiting. Mostly useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    /// Creates an exponential backoff policy with sensible defaults.
    ///
    /// Uses:
    /// - Initial delay: 100ms ([`DEFAULT_INITIAL_DELAY_MS`])
    /// - Max delay: 30 seconds ([`DEFAULT_MAX_DELAY_SECS`])
    /// - Multiplier: 2.0 ([`DEFAULT_BACKOFF_MULTIPLIER`])
    pub fn exponential(max_attempts: u32) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Calculates the wait after failed attempt `attempt` (1-based).
    ///
    /// Returns `None` if no more attempts are allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts() {
            return None;
        }

        match self {
            Self::None => None,
            Self::Fixed { delay, .. } => Some(*delay),
            Self::Linear { step, .. } => Some(step.saturating_mul(attempt)),
            Self::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                // initial_delay * multiplier^(attempt-1), capped
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay_ms = initial_delay.as_millis() as f64 * factor;
                let capped = delay_ms.min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(capped as u64).min(*max_delay))
            }
        }
    }

    /// Short name of the backoff shape, as written in the config file.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fixed { .. } => "fixed",
            Self::Linear { .. } => "linear",
            Self::ExponentialBackoff { .. } => "exponential",
        }
    }

    /// Build a policy from its config name.
    ///
    /// `step` is the fixed delay, the linear increment, or the initial
    /// exponential delay; `None` keeps the default for that shape.
    pub fn from_kind(kind: &str, max_attempts: u32, step: Option<Duration>) -> Option<Self> {
        let policy = match kind.trim().to_ascii_lowercase().as_str() {
            "none" => Self::None,
            "fixed" => Self::fixed(max_attempts, step.unwrap_or(DEFAULT_RETRY_STEP)),
            "linear" => Self::linear(max_attempts, step.unwrap_or(DEFAULT_RETRY_STEP)),
            "exponential" => {
                let mut policy = Self::exponential(max_attempts);
                if let (Self::ExponentialBackoff { initial_delay, .. }, Some(step)) =
                    (&mut policy, step)
                {
                    *initial_delay = step;
                }
                policy
            }
            _ => return None,
        };
        Some(policy)
    }

    /// Returns the maximum number of attempts for this policy.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. }
            | Self::Linear { max_attempts, .. }
            | Self::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        }
    }
}
