//! Transport-level retry policy.
//!
//! Retries happen below the dispatcher: the exception factory and the result
//! constructors only ever see the final attempt. A request is only retried when
//! its body can be replayed.

use http::StatusCode;
use rand::Rng;
use std::time::Duration;

/// Defines when and how long to wait between attempts.
///
/// # Examples
///
/// ```
/// use restract::RetryStrategy;
/// use std::time::Duration;
///
/// // 100ms, 200ms, 400ms... capped at 5s
/// let backoff = RetryStrategy::ExponentialBackoff {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(5),
///     max_retries: 4,
///     jitter: true,
/// };
/// assert_eq!(backoff.max_retries(), Some(4));
/// ```
#[derive(Debug, Clone, Default)]
pub enum RetryStrategy {
    /// Send once.
    #[default]
    None,

    /// Waits `initial_delay * 2^(retry - 1)`, capped at `max_delay`.
    ExponentialBackoff {
        initial_delay: Duration,
        max_delay: Duration,
        max_retries: usize,
        /// Scale each delay by a random factor in `[0.5, 1.0]`.
        jitter: bool,
    },

    /// Fixed delay between attempts.
    Linear { delay: Duration, max_retries: usize },

    /// `delay_fn(retry)` returns the delay before that retry, or `None` to stop.
    Custom {
        delay_fn: fn(attempt: usize) -> Option<Duration>,
    },
}

impl RetryStrategy {
    /// Delay before the given retry (1 = first retry), or `None` once exhausted.
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        match self {
            RetryStrategy::None => None,
            RetryStrategy::ExponentialBackoff {
                initial_delay,
                max_delay,
                max_retries,
                jitter,
            } => {
                if attempt > *max_retries {
                    return None;
                }
                let exponent = attempt.saturating_sub(1).min(31) as u32;
                let delay = initial_delay
                    .saturating_mul(2u32.saturating_pow(exponent))
                    .min(*max_delay);
                if *jitter {
                    Some(delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0)))
                } else {
                    Some(delay)
                }
            }
            RetryStrategy::Linear { delay, max_retries } => {
                (attempt <= *max_retries).then_some(*delay)
            }
            RetryStrategy::Custom { delay_fn } => delay_fn(attempt),
        }
    }

    pub fn max_retries(&self) -> Option<usize> {
        match self {
            RetryStrategy::None => Some(0),
            RetryStrategy::ExponentialBackoff { max_retries, .. }
            | RetryStrategy::Linear { max_retries, .. } => Some(*max_retries),
            RetryStrategy::Custom { .. } => None,
        }
    }
}

/// What a single transport attempt produced.
#[derive(Debug, Clone, Copy)]
pub enum AttemptOutcome<'a> {
    /// A response arrived with this status.
    Status(StatusCode),
    /// The request failed before a response arrived.
    Failed(&'a reqwest::Error),
}

impl AttemptOutcome<'_> {
    /// Connection failures, timeouts, `408`, `429` and `5xx` are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            AttemptOutcome::Status(status) => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
            AttemptOutcome::Failed(error) => error.is_connect() || error.is_timeout(),
        }
    }
}

/// Decides whether an attempt should be retried.
///
/// # Examples
///
/// ```
/// use restract::retry::{AttemptOutcome, RetryPredicate};
///
/// struct OnlyServiceUnavailable;
///
/// impl RetryPredicate for OnlyServiceUnavailable {
///     fn should_retry(&self, outcome: &AttemptOutcome<'_>, _attempt: usize) -> bool {
///         matches!(outcome, AttemptOutcome::Status(s) if s.as_u16() == 503)
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// `attempt` is 1 for the first try.
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, attempt: usize) -> bool;
}

/// Retries every transient outcome.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTransient;

impl RetryPredicate for RetryOnTransient {
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, _attempt: usize) -> bool {
        outcome.is_transient()
    }
}

/// Retries `5xx` responses only.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn5xx;

impl RetryPredicate for RetryOn5xx {
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, _attempt: usize) -> bool {
        matches!(outcome, AttemptOutcome::Status(s) if s.is_server_error())
    }
}

/// Retries connection failures and timeouts only.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnConnectionError;

impl RetryPredicate for RetryOnConnectionError {
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, _attempt: usize) -> bool {
        matches!(outcome, AttemptOutcome::Failed(e) if e.is_connect() || e.is_timeout())
    }
}

/// Retries when any inner predicate does.
pub struct OrPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl OrPredicate {
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for OrPredicate {
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, attempt: usize) -> bool {
        self.predicates
            .iter()
            .any(|p| p.should_retry(outcome, attempt))
    }
}

/// Retries only when every inner predicate does.
pub struct AndPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl AndPredicate {
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for AndPredicate {
    fn should_retry(&self, outcome: &AttemptOutcome<'_>, attempt: usize) -> bool {
        self.predicates
            .iter()
            .all(|p| p.should_retry(outcome, attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_until_capped() {
        let strategy = RetryStrategy::ExponentialBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            max_retries: 4,
            jitter: false,
        };

        let delays: Vec<_> = (1..=5).map(|a| strategy.delay_for_attempt(a)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(100)),
                Some(Duration::from_millis(200)),
                Some(Duration::from_millis(350)),
                Some(Duration::from_millis(350)),
                None,
            ]
        );
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let strategy = RetryStrategy::ExponentialBackoff {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
            max_retries: 1,
            jitter: true,
        };
        let delay = strategy.delay_for_attempt(1).unwrap();
        assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(200));
    }

    #[test]
    fn linear_and_none() {
        let linear = RetryStrategy::Linear {
            delay: Duration::from_secs(1),
            max_retries: 2,
        };
        assert_eq!(linear.delay_for_attempt(2), Some(Duration::from_secs(1)));
        assert_eq!(linear.delay_for_attempt(3), None);
        assert_eq!(RetryStrategy::None.delay_for_attempt(1), None);
    }

    #[test]
    fn predicates_classify_statuses() {
        let unavailable = AttemptOutcome::Status(StatusCode::SERVICE_UNAVAILABLE);
        let throttled = AttemptOutcome::Status(StatusCode::TOO_MANY_REQUESTS);
        let not_found = AttemptOutcome::Status(StatusCode::NOT_FOUND);

        assert!(RetryOnTransient.should_retry(&throttled, 1));
        assert!(!RetryOnTransient.should_retry(&not_found, 1));
        assert!(RetryOn5xx.should_retry(&unavailable, 1));
        assert!(!RetryOn5xx.should_retry(&throttled, 1));
        assert!(!RetryOnConnectionError.should_retry(&unavailable, 1));

        struct FirstTwo;
        impl RetryPredicate for FirstTwo {
            fn should_retry(&self, _: &AttemptOutcome<'_>, attempt: usize) -> bool {
                attempt <= 2
            }
        }

        let both = AndPredicate::new(vec![Box::new(RetryOn5xx), Box::new(FirstTwo)]);
        assert!(both.should_retry(&unavailable, 2));
        assert!(!both.should_retry(&unavailable, 3));

        let either = OrPredicate::new(vec![Box::new(RetryOn5xx), Box::new(FirstTwo)]);
        assert!(either.should_retry(&not_found, 1));
        assert!(!either.should_retry(&not_found, 3));
    }
}
