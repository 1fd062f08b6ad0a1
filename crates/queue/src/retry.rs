//! Retry policy and dead letter handling.

use chrono::{DateTime, Utc};
use courier_common::DeliveryConfig;

/// Decides what happens to a job after a transient failure.
///
/// Jobs are retried by putting them back at the tail of the queue, with no
/// delay. Without a ceiling a job is retried until the remote gives a final
/// answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed per job, `None` for no limit.
    pub max_attempts: Option<u32>,
    /// Attempt from which each further failure is reported.
    pub report_after_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            report_after_attempts: 10,
        }
    }
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            report_after_attempts: config.report_after_attempts,
        }
    }
}

impl RetryPolicy {
    /// Retry forever.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_attempts: None,
            report_after_attempts: 10,
        }
    }

    /// Whether a job that just failed with the given `attempt` counter has
    /// used up its attempts. The counter is zero for the first try.
    #[must_use]
    pub const fn is_exhausted(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt.saturating_add(1) >= max,
            None => false,
        }
    }

    /// Whether a failure at `attempt` should be reported as persistent.
    #[must_use]
    pub const fn should_report(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) >= self.report_after_attempts
    }
}

/// A job given up on after exhausting its attempts.
#[derive(Debug, Clone)]
pub struct DeadLetterEntry<T> {
    /// The failed job.
    pub job: T,
    /// Number of attempts made.
    pub attempts: u32,
    /// Last failure reason.
    pub last_error: String,
    /// Timestamp of last failure.
    pub failed_at: DateTime<Utc>,
}

impl<T> DeadLetterEntry<T> {
    /// Create a new dead letter entry.
    pub fn new(job: T, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            job,
            attempts,
            last_error: error.into(),
            failed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_never_exhausts() {
        let policy = RetryPolicy::unbounded();

        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(10_000));
        assert!(!policy.is_exhausted(u32::MAX));
    }

    #[test]
    fn test_ceiling_counts_first_try() {
        let policy = RetryPolicy {
            max_attempts: Some(3),
            ..RetryPolicy::default()
        };

        // attempts 0, 1 and 2 are the three tries
        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(1));
        assert!(policy.is_exhausted(2));
    }

    #[test]
    fn test_single_attempt_ceiling() {
        let policy = RetryPolicy {
            max_attempts: Some(1),
            ..RetryPolicy::default()
        };

        assert!(policy.is_exhausted(0));
    }

    #[test]
    fn test_report_threshold() {
        let policy = RetryPolicy {
            report_after_attempts: 3,
            ..RetryPolicy::default()
        };

        assert!(!policy.should_report(1));
        assert!(policy.should_report(2));
        assert!(policy.should_report(7));
    }

    #[test]
    fn test_from_config() {
        let config = DeliveryConfig {
            max_attempts: Some(8),
            report_after_attempts: 4,
            ..DeliveryConfig::default()
        };

        let policy = RetryPolicy::from(&config);

        assert_eq!(policy.max_attempts, Some(8));
        assert_eq!(policy.report_after_attempts, 4);
    }

    #[test]
    fn test_dead_letter_entry() {
        let entry = DeadLetterEntry::new("job", 5, "503 Service Unavailable");

        assert_eq!(entry.attempts, 5);
        assert_eq!(entry.last_error, "503 Service Unavailable");
    }
}
