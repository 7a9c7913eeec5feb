//! Node-level retry policy (spec §4.6 "Failure and retry"). Grounded on the
//! teacher's `graph::RetryPolicy`, narrowed to the one shape the engine needs
//! (exponential backoff) plus `none` for phases that should fail fast.

use std::time::Duration;

#[derive(Debug, Clone)]
pub enum RetryPolicy {
    None,
    Exponential { max_attempts: usize, initial_interval: Duration, max_interval: Duration, multiplier: f64 },
}

impl RetryPolicy {
    /// Default workflow retry policy: up to 2 retries, 10s then 30s backoff
    /// (§4.6 "default is up to 2 retries with exponential backoff (10 s, 30 s)").
    pub fn default_workflow() -> Self {
        RetryPolicy::Exponential {
            max_attempts: 2,
            initial_interval: Duration::from_secs(10),
            max_interval: Duration::from_secs(30),
            multiplier: 3.0,
        }
    }

    pub fn should_retry(&self, attempt: usize) -> bool {
        match self {
            RetryPolicy::None => false,
            RetryPolicy::Exponential { max_attempts, .. } => attempt < *max_attempts,
        }
    }

    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            RetryPolicy::None => Duration::ZERO,
            RetryPolicy::Exponential { initial_interval, max_interval, multiplier, .. } => {
                let secs = initial_interval.as_secs_f64() * multiplier.powi(attempt as i32);
                Duration::from_secs_f64(secs).min(*max_interval)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_workflow_backs_off_ten_then_thirty_seconds() {
        let policy = RetryPolicy::default_workflow();
        assert_eq!(policy.delay(0), Duration::from_secs(10));
        assert_eq!(policy.delay(1), Duration::from_secs(30));
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    #[test]
    fn none_policy_never_retries() {
        let policy = RetryPolicy::None;
        assert!(!policy.should_retry(0));
        assert_eq!(policy.delay(0), Duration::ZERO);
    }
}
