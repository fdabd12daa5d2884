//! Failure classification.

use serde::{Deserialize, Serialize};

use crate::generation::RawFailure;

/// Class of a remote failure. Drives retry behavior and the credential
/// refresh signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Temporary unavailability; retry with the standard backoff curve.
    Transient,
    /// Rate or quota limiting; retry with the longer quota curve, the job
    /// visibly waits.
    QuotaExceeded,
    /// The referenced project, credential, or resource is gone or invalid.
    /// Not retryable; call sites fire the credential-refresh notification.
    Permanent,
    /// Anything unmatched; conservatively not retryable.
    Unknown,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Transient => "transient",
            FailureClass::QuotaExceeded => "quota_exceeded",
            FailureClass::Permanent => "permanent",
            FailureClass::Unknown => "unknown",
        }
    }
}

/// Classify a raw remote failure.
///
/// Total and pure: any input maps to exactly one class, nothing is thrown,
/// no side effect happens here. Status code wins over message keywords; the
/// keyword scan checks quota markers before transient ones so that
/// "quota exceeded, please retry" lands in the quota class.
pub fn classify(failure: &RawFailure) -> FailureClass {
    match failure.code {
        Some(429) => return FailureClass::QuotaExceeded,
        Some(503) | Some(504) => return FailureClass::Transient,
        Some(401) | Some(403) | Some(404) => return FailureClass::Permanent,
        _ => {}
    }

    let message = failure.message.to_lowercase();

    const QUOTA_MARKERS: [&str; 3] = ["quota", "resource exhausted", "rate limit"];
    const TRANSIENT_MARKERS: [&str; 5] = [
        "overloaded",
        "unavailable",
        "deadline exceeded",
        "gateway timeout",
        "timed out",
    ];
    const PERMANENT_MARKERS: [&str; 5] = [
        "not found",
        "does not exist",
        "unauthenticated",
        "permission denied",
        "invalid credential",
    ];

    if QUOTA_MARKERS.iter().any(|m| message.contains(m)) {
        FailureClass::QuotaExceeded
    } else if TRANSIENT_MARKERS.iter().any(|m| message.contains(m)) {
        FailureClass::Transient
    } else if PERMANENT_MARKERS.iter().any(|m| message.contains(m)) {
        FailureClass::Permanent
    } else {
        FailureClass::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_status_code() {
        assert_eq!(
            classify(&RawFailure::http(429, "too many requests")),
            FailureClass::QuotaExceeded
        );
        assert_eq!(
            classify(&RawFailure::http(503, "service unavailable")),
            FailureClass::Transient
        );
        assert_eq!(
            classify(&RawFailure::http(504, "")),
            FailureClass::Transient
        );
        assert_eq!(
            classify(&RawFailure::http(404, "entity not found")),
            FailureClass::Permanent
        );
        assert_eq!(
            classify(&RawFailure::http(401, "")),
            FailureClass::Permanent
        );
    }

    #[test]
    fn test_classify_by_message() {
        assert_eq!(
            classify(&RawFailure::message("model is overloaded, try later")),
            FailureClass::Transient
        );
        assert_eq!(
            classify(&RawFailure::message("RESOURCE EXHAUSTED: per-minute limit")),
            FailureClass::QuotaExceeded
        );
        assert_eq!(
            classify(&RawFailure::message("project does not exist")),
            FailureClass::Permanent
        );
    }

    #[test]
    fn test_quota_keywords_win_over_transient() {
        // A message that carries both markers is a quota condition.
        assert_eq!(
            classify(&RawFailure::message("quota exceeded, service unavailable")),
            FailureClass::QuotaExceeded
        );
    }

    #[test]
    fn test_unmatched_is_unknown() {
        assert_eq!(
            classify(&RawFailure::message("segfault in the flux capacitor")),
            FailureClass::Unknown
        );
        assert_eq!(
            classify(&RawFailure::http(500, "internal error")),
            FailureClass::Unknown
        );
        assert_eq!(classify(&RawFailure::message("")), FailureClass::Unknown);
    }
}
