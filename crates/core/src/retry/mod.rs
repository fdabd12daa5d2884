//! Failure classification and retry backoff.
//!
//! Every remote failure in the system funnels through the same pair: the
//! classifier decides *what kind* of failure it was, the backoff policy
//! decides *whether and when* to try again. Attempt counters live on the
//! job record, never in here.

mod backoff;
mod classify;

pub use backoff::{BackoffDecision, BackoffParams, BackoffPolicy};
pub use classify::{classify, FailureClass};
