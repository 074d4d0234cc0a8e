//! crates/devotional_core/src/error.rs
//!
//! Error taxonomy for generation. `GenerationError` describes why a single
//! batch attempt failed; `JobError` is what a whole job reports to its caller.

use std::time::Duration;

use crate::ports::PortError;

/// Why one backend call for one batch failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The backend refused the request on content-policy grounds.
    #[error("Content filter rejected the request: {0}")]
    ContentFilter(String),

    #[error("Upstream error (HTTP {status}): {message}")]
    Upstream { status: u16, message: String },

    /// Connection failure or abort.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend rejected credentials: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The response could not be read as a batch, even after recovery.
    #[error("Malformed generation response: {0}")]
    Parse(String),

    #[error("Unexpected generation failure: {0}")]
    Unknown(String),
}

impl GenerationError {
    /// Whether the degraded-retry loop should try this batch again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ContentFilter(_)
            | Self::Upstream { .. }
            | Self::Network(_)
            | Self::Timeout(_) => true,

            Self::Auth(_) | Self::RateLimited(_) | Self::Parse(_) | Self::Unknown(_) => false,
        }
    }

    /// Connectivity-class failures, including deadline expiry.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// The error a generation or continuation job surfaces once local retries are
/// spent. Carries enough classification to render a friendly message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("Could not reach the generation service: {0}")]
    Connectivity(String),

    #[error("Content filter rejected every request profile: {0}")]
    ContentFilterExhausted(String),

    #[error("Generation service is unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Generation is rate limited: {0}")]
    RateLimited(String),

    #[error("Generation service rejected our credentials: {0}")]
    Unauthorized(String),

    #[error("Generation service returned unusable content: {0}")]
    InvalidResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Generation failed: {0}")]
    Failed(String),
}

impl JobError {
    /// Whether an automatic background retry is worthwhile. A manual retry is
    /// always allowed regardless.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Connectivity(_) | Self::ContentFilterExhausted(_) | Self::UpstreamUnavailable(_)
        )
    }

    /// Stable machine-readable tag.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connectivity(_) => "connectivity",
            Self::ContentFilterExhausted(_) => "content_filter",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::RateLimited(_) => "rate_limited",
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidResponse(_) => "invalid_response",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage",
            Self::Failed(_) => "failed",
        }
    }
}

impl From<GenerationError> for JobError {
    fn from(err: GenerationError) -> Self {
        let message = err.to_string();
        match err {
            GenerationError::Network(_) | GenerationError::Timeout(_) => Self::Connectivity(message),
            GenerationError::ContentFilter(_) => Self::ContentFilterExhausted(message),
            GenerationError::Upstream { .. } => Self::UpstreamUnavailable(message),
            GenerationError::RateLimited(_) => Self::RateLimited(message),
            GenerationError::Auth(_) => Self::Unauthorized(message),
            GenerationError::Parse(_) => Self::InvalidResponse(message),
            GenerationError::Unknown(_) => Self::Failed(message),
        }
    }
}

impl From<PortError> for JobError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => Self::NotFound(what),
            PortError::Unexpected(_) => Self::Storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GenerationError::ContentFilter("x".into()).is_transient());
        assert!(GenerationError::Upstream { status: 503, message: "x".into() }.is_transient());
        assert!(GenerationError::Network("reset".into()).is_transient());
        assert!(GenerationError::Timeout(Duration::from_secs(30)).is_transient());

        assert!(!GenerationError::Auth("x".into()).is_transient());
        assert!(!GenerationError::RateLimited("x".into()).is_transient());
        assert!(!GenerationError::Parse("x".into()).is_transient());
        assert!(!GenerationError::Unknown("x".into()).is_transient());
    }

    #[test]
    fn test_job_error_mapping_and_retriability() {
        let cases = [
            (GenerationError::Timeout(Duration::from_secs(1)), "connectivity", true),
            (GenerationError::Network("dns".into()), "connectivity", true),
            (GenerationError::ContentFilter("no".into()), "content_filter", true),
            (GenerationError::Upstream { status: 502, message: "bad gateway".into() }, "upstream_unavailable", true),
            (GenerationError::RateLimited("slow down".into()), "rate_limited", false),
            (GenerationError::Auth("bad key".into()), "unauthorized", false),
            (GenerationError::Parse("not json".into()), "invalid_response", false),
            (GenerationError::Unknown("?".into()), "failed", false),
        ];

        for (err, kind, retriable) in cases {
            let job: JobError = err.into();
            assert_eq!(job.kind(), kind);
            assert_eq!(job.is_retriable(), retriable, "{}", kind);
        }
    }

    #[test]
    fn test_job_error_message_keeps_cause() {
        let job: JobError = GenerationError::Upstream { status: 503, message: "overloaded".into() }.into();
        let display = job.to_string();
        assert!(display.contains("503"));
        assert!(display.contains("overloaded"));
    }

    #[test]
    fn test_storage_errors_are_not_retriable() {
        let job: JobError = PortError::Unexpected("disk full".into()).into();
        assert_eq!(job.kind(), "storage");
        assert!(!job.is_retriable());

        let job: JobError = PortError::NotFound("Series 7 not found".into()).into();
        assert_eq!(job, JobError::NotFound("Series 7 not found".to_string()));
        assert!(!job.is_retriable());
    }
}
