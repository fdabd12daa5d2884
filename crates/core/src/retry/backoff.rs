//! Retry backoff policy.

use std::time::Duration;

use super::FailureClass;

/// Parameters of one geometric backoff curve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffParams {
    /// Delay granted after the first failure.
    pub base_delay: Duration,
    /// Geometric growth factor.
    pub multiplier: u32,
    /// Number of retry delays granted before giving up.
    pub max_attempts: u32,
}

impl BackoffParams {
    pub fn new(base_delay: Duration, multiplier: u32, max_attempts: u32) -> Self {
        Self {
            base_delay,
            multiplier,
            max_attempts,
        }
    }
}

/// Outcome of a backoff decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    /// Try again, no earlier than `after` from now.
    Retry { after: Duration },
    /// Retry budget exhausted, or the failure class is never retried.
    GiveUp,
}

/// Pure, stateless retry policy.
///
/// Transient and quota failures run on independent curves and budgets; the
/// quota curve uses a longer base delay and a smaller ceiling. Permanent and
/// unknown failures give up immediately without consuming any budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub transient: BackoffParams,
    pub quota: BackoffParams,
}

impl BackoffPolicy {
    pub fn new(transient: BackoffParams, quota: BackoffParams) -> Self {
        Self { transient, quota }
    }

    /// Decide whether to retry after the next failure of `class`, given how
    /// many retries of that class have already been granted.
    pub fn decide(&self, class: FailureClass, prior_attempts: u32) -> BackoffDecision {
        let params = match class {
            FailureClass::Transient => &self.transient,
            FailureClass::QuotaExceeded => &self.quota,
            FailureClass::Permanent | FailureClass::Unknown => return BackoffDecision::GiveUp,
        };

        if prior_attempts >= params.max_attempts {
            return BackoffDecision::GiveUp;
        }

        let factor = params.multiplier.saturating_pow(prior_attempts);
        BackoffDecision::Retry {
            after: params.base_delay.saturating_mul(factor),
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            transient: BackoffParams::new(Duration::from_secs(2), 2, 5),
            quota: BackoffParams::new(Duration::from_secs(30), 2, 3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            transient: BackoffParams::new(Duration::from_millis(100), 2, 5),
            quota: BackoffParams::new(Duration::from_millis(400), 2, 3),
        }
    }

    #[test]
    fn test_geometric_growth() {
        let p = policy();
        assert_eq!(
            p.decide(FailureClass::Transient, 0),
            BackoffDecision::Retry {
                after: Duration::from_millis(100)
            }
        );
        assert_eq!(
            p.decide(FailureClass::Transient, 1),
            BackoffDecision::Retry {
                after: Duration::from_millis(200)
            }
        );
        assert_eq!(
            p.decide(FailureClass::Transient, 4),
            BackoffDecision::Retry {
                after: Duration::from_millis(1600)
            }
        );
    }

    #[test]
    fn test_ceiling_gives_up() {
        let p = policy();
        assert_eq!(
            p.decide(FailureClass::Transient, 5),
            BackoffDecision::GiveUp
        );
        assert_eq!(
            p.decide(FailureClass::QuotaExceeded, 3),
            BackoffDecision::GiveUp
        );
    }

    #[test]
    fn test_quota_curve_is_independent() {
        let p = policy();
        // d, 2d, 4d with the quota base, then give up.
        assert_eq!(
            p.decide(FailureClass::QuotaExceeded, 0),
            BackoffDecision::Retry {
                after: Duration::from_millis(400)
            }
        );
        assert_eq!(
            p.decide(FailureClass::QuotaExceeded, 1),
            BackoffDecision::Retry {
                after: Duration::from_millis(800)
            }
        );
        assert_eq!(
            p.decide(FailureClass::QuotaExceeded, 2),
            BackoffDecision::Retry {
                after: Duration::from_millis(1600)
            }
        );
        assert_eq!(
            p.decide(FailureClass::QuotaExceeded, 3),
            BackoffDecision::GiveUp
        );
    }

    #[test]
    fn test_permanent_and_unknown_never_retry() {
        let p = policy();
        assert_eq!(p.decide(FailureClass::Permanent, 0), BackoffDecision::GiveUp);
        assert_eq!(p.decide(FailureClass::Unknown, 0), BackoffDecision::GiveUp);
    }

    #[test]
    fn test_delays_are_monotonic_until_give_up() {
        let p = policy();
        let mut last = Duration::ZERO;
        for attempt in 0.. {
            match p.decide(FailureClass::Transient, attempt) {
                BackoffDecision::Retry { after } => {
                    assert!(after >= last, "delay shrank at attempt {}", attempt);
                    last = after;
                }
                BackoffDecision::GiveUp => {
                    assert_eq!(attempt, p.transient.max_attempts);
                    break;
                }
            }
        }
    }
}
