//! Error taxonomy for the orchestration engine.
//!
//! Three layers, innermost first:
//!
//! | Type                | Raised by          | Crosses the core boundary?  |
//! |---------------------|--------------------|-----------------------------|
//! | `UpstreamError`     | upstream client    | no (recovered or wrapped)   |
//! | `BranchError`       | fan-out branches   | no (logged, excluded)       |
//! | `OrchestratorError` | orchestrator       | yes (`TotalFailure` only)   |
//! | `EngineError`       | session controller | yes (scoped per operation)  |
//!
//! Plan-stage and synthesize-stage failures are recovered by falling back to
//! a direct call; individual branch failures never abort siblings. Only a
//! failure of the last-resort fallback call surfaces.

use thiserror::Error;

use crate::timeout::TimeoutError;

/// Failure of a single upstream API call.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Non-success HTTP status from the generative API.
    #[error("upstream returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The response carried a non-normal completion reason instead of text.
    #[error("generation finished unexpectedly: {reason}")]
    Incomplete { reason: String },

    /// The upstream service blocked the request (safety / policy feedback).
    #[error("request blocked upstream: {reason}")]
    Blocked { reason: String },

    /// The response parsed but carried neither text nor a diagnostic.
    #[error("could not extract text from upstream response")]
    MalformedResponse,

    /// Connect, DNS, or body-read failure below the HTTP layer.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Failure of one fan-out branch.
///
/// Callers treat all variants identically: the branch failed, its slot is
/// excluded from the synthesis context.
#[derive(Debug, Clone, Error)]
pub enum BranchError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// The spawned branch task died before settling (panic or abort).
    #[error("branch task aborted: {0}")]
    Aborted(String),
}

impl BranchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// The only error the orchestrator surfaces to its caller: every strategy
/// (decompose, synthesize, direct fallback) has been exhausted.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("multi-step strategy failed, and fallback direct call also failed: {cause}")]
    TotalFailure {
        #[source]
        cause: UpstreamError,
    },
}

/// Session-boundary error: a [`OrchestratorError::TotalFailure`] scoped to
/// the operation that failed (scan, a specific dive, or the final synthesis)
/// so callers can retry one branch of work without discarding the rest.
#[derive(Debug, Error)]
#[error("{operation} failed: {source}")]
pub struct EngineError {
    pub operation: String,
    #[source]
    pub source: OrchestratorError,
}

impl EngineError {
    pub fn new(operation: impl Into<String>, source: OrchestratorError) -> Self {
        Self {
            operation: operation.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_error_from_timeout() {
        let err: BranchError = TimeoutError {
            message: "query 2 timed out".into(),
        }
        .into();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "query 2 timed out");
    }

    #[test]
    fn branch_error_from_upstream_is_not_timeout() {
        let err: BranchError = UpstreamError::MalformedResponse.into();
        assert!(!err.is_timeout());
    }

    #[test]
    fn total_failure_carries_cause() {
        let err = OrchestratorError::TotalFailure {
            cause: UpstreamError::Http {
                status: 503,
                message: "overloaded".into(),
            },
        };
        let rendered = err.to_string();
        assert!(rendered.contains("fallback direct call also failed"));
        assert!(rendered.contains("503"));
    }

    #[test]
    fn engine_error_scopes_operation() {
        let err = EngineError::new(
            "deep dive \"quantum sensing\"",
            OrchestratorError::TotalFailure {
                cause: UpstreamError::MalformedResponse,
            },
        );
        assert!(err.to_string().starts_with("deep dive \"quantum sensing\" failed"));
    }
}
