//! Bounded retry bookkeeping shared by the transport backends

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Attempts made per `send_email` call before giving up
pub const MAX_ATTEMPTS: u32 = 3;

/// Delay between a failed attempt and the next one
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Retry straight away
    Immediate,

    /// `min(base * 2^(attempt - 1), cap)`
    Exponential {
        /// Delay after the first failed attempt
        base: Duration,

        /// Upper bound for any single delay
        cap: Duration,
    },
}

/// How many attempts a backend makes and how long it waits between them
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay between attempts
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// [`MAX_ATTEMPTS`] attempts without delay
    pub const fn immediate() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff: Backoff::Immediate,
        }
    }

    /// [`MAX_ATTEMPTS`] attempts with capped exponential backoff
    pub const fn exponential(base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff: Backoff::Exponential { base, cap },
        }
    }

    /// The delay to observe after attempt number `attempt` (1-based) failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Immediate => Duration::ZERO,
            Backoff::Exponential { base, cap } => {
                let factor = 1u32
                    .checked_shl(attempt.saturating_sub(1))
                    .unwrap_or(u32::MAX);

                base.saturating_mul(factor).min(cap)
            }
        }
    }

    /// The first attempt of a new call
    pub fn first_attempt(&self) -> DeliveryAttempt {
        DeliveryAttempt {
            number: 1,
            max_attempts: self.max_attempts,
            started_at: Utc::now(),
        }
    }
}

/// One attempt at delivering a message, scoped to a single `send_email` call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryAttempt {
    number: u32,
    max_attempts: u32,
    started_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    /// The 1-based attempt number
    pub fn number(&self) -> u32 {
        self.number
    }

    /// The attempt budget of the call
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// When the attempt started
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Milliseconds since the attempt started
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }

    /// Whether the budget is spent once this attempt fails
    pub fn is_last(&self) -> bool {
        self.number >= self.max_attempts
    }

    /// The attempt that follows this one
    pub fn next(&self) -> Self {
        Self {
            number: self.number + 1,
            max_attempts: self.max_attempts,
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy =
            RetryPolicy::exponential(Duration::from_millis(1000), Duration::from_millis(5000));

        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_after(4), Duration::from_millis(5000));
        assert_eq!(policy.delay_after(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_immediate_backoff() {
        assert_eq!(RetryPolicy::immediate().delay_after(2), Duration::ZERO);
    }

    #[test]
    fn test_attempts_count_up_to_budget() {
        let policy = RetryPolicy::immediate();

        let first = policy.first_attempt();
        assert_eq!(first.number(), 1);
        assert!(!first.is_last());

        let third = first.next().next();
        assert_eq!(third.number(), MAX_ATTEMPTS);
        assert!(third.is_last());
    }
}
