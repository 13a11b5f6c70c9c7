//! Tagged outcome of a call to an external generation service.
//!
//! The dialogue and portrait clients translate every provider response
//! into a `GenerationResult`, so nothing downstream inspects raw provider
//! shapes or error strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a generation attempt did not produce a usable payload.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The call did not complete within its timeout.
    #[error("request timed out")]
    Timeout,
    /// The endpoint could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The provider refused because of quota or rate limits.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// The provider failed on its side (5xx).
    #[error("server error: {0}")]
    ServerError(String),
    /// The request itself was rejected as invalid (4xx).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Credentials were missing or rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Content was blocked by a safety or content policy.
    #[error("rejected by content policy: {0}")]
    PolicyRejected(String),
    /// The provider answered but produced nothing usable.
    #[error("empty response")]
    EmptyResponse,
    /// The response body could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// A locally detected defect in the payload, e.g. undecodable image bytes.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl FailureReason {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection(_) | Self::RateLimited(_) | Self::ServerError(_)
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult<T> {
    Success(T),
    /// Eligible for bounded retry by the caller.
    TransientFailure(FailureReason),
    /// Never retried.
    PermanentFailure(FailureReason),
}

impl<T> GenerationResult<T> {
    /// Classify a failure reason into the matching variant.
    pub fn failure(reason: FailureReason) -> Self {
        if reason.is_transient() {
            Self::TransientFailure(reason)
        } else {
            Self::PermanentFailure(reason)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFailure(_))
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::PermanentFailure(_))
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            Self::Success(_) => None,
            Self::TransientFailure(reason) | Self::PermanentFailure(reason) => Some(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> GenerationResult<U> {
        match self {
            Self::Success(value) => GenerationResult::Success(f(value)),
            Self::TransientFailure(reason) => GenerationResult::TransientFailure(reason),
            Self::PermanentFailure(reason) => GenerationResult::PermanentFailure(reason),
        }
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_classifies_by_reason() {
        let timeout: GenerationResult<()> = GenerationResult::failure(FailureReason::Timeout);
        assert!(timeout.is_transient());

        let quota: GenerationResult<()> =
            GenerationResult::failure(FailureReason::RateLimited("429".into()));
        assert!(quota.is_transient());

        let bad: GenerationResult<()> =
            GenerationResult::failure(FailureReason::InvalidRequest("400".into()));
        assert!(bad.is_permanent());

        let invalid_image: GenerationResult<()> =
            GenerationResult::failure(FailureReason::Validation("not a png".into()));
        assert!(invalid_image.is_permanent());
        assert!(invalid_image.reason().is_some_and(FailureReason::is_validation));
    }

    #[test]
    fn map_preserves_failures() {
        let result: GenerationResult<u8> =
            GenerationResult::TransientFailure(FailureReason::Timeout);
        assert_eq!(
            result.map(|v| v + 1),
            GenerationResult::TransientFailure(FailureReason::Timeout)
        );
        assert_eq!(GenerationResult::Success(1u8).map(|v| v + 1).success(), Some(2));
    }
}
