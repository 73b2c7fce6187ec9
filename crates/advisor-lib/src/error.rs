//! Advisor error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the stores, the profiler and the orchestrator.
///
/// A rejected guardrail verification is not an error; see
/// [`crate::guardrail::VerificationOutcome`].
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("policy already exists: {0}")]
    PolicyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("job {job_id} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    #[error("no candidate policies match the requested tags")]
    NoCandidates,

    #[error("telemetry unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("failed to persist {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdvisorError {
    /// Short machine-readable code for API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            AdvisorError::PolicyNotFound(_) => "policy_not_found",
            AdvisorError::JobNotFound(_) => "job_not_found",
            AdvisorError::PolicyExists(_) => "policy_exists",
            AdvisorError::InvalidInput(_) => "invalid_input",
            AdvisorError::InvalidTransition { .. } => "invalid_transition",
            AdvisorError::NoCandidates => "no_candidates",
            AdvisorError::UpstreamUnavailable(_) => "upstream_unavailable",
            AdvisorError::Persistence { .. } => "persistence",
            AdvisorError::Serialization(_) => "serialization",
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AdvisorError::Persistence {
            path: path.into(),
            source,
        }
    }
}

pub type AdvisorResult<T> = Result<T, AdvisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AdvisorError::PolicyNotFound("p1".to_string());
        assert_eq!(err.to_string(), "policy not found: p1");
        assert_eq!(err.code(), "policy_not_found");

        let err = AdvisorError::InvalidTransition {
            job_id: "j1".to_string(),
            from: "succeeded".to_string(),
            to: "running".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "job j1 cannot move from 'succeeded' to 'running'"
        );
    }
}
