//! Error types for the Relay coordinator.
//!
//! Only `ConfigError` ever reaches a caller as a hard failure, and only at
//! startup. Engine, step and classification errors are folded into session
//! state by the pipeline executor and surface as `StepResult`s or a
//! `failure_reason` on the response.

use serde::{Deserialize, Serialize};

/// Fatal configuration problems detected while loading or validating
/// `CoordinatorConfig`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Endpoint already registered: {0}")]
    Duplicate(String),

    #[error("Endpoint not found: {0}")]
    NotFound(String),
}

/// Errors produced by a single engine call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Engine call timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    /// The engine answered with a well-formed `{status: "error"}` response.
    #[error("Engine rejected request: {0}")]
    Rejected(String),

    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),
}

impl EngineError {
    /// Only network-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Timeout | EngineError::Transport(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classifier request failed: {0}")]
    Request(String),

    #[error("Classifier returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Error taxonomy for a step, recorded on its `StepResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// Health check failed, probe stale, or endpoint missing from the registry.
    EndpointUnavailable,
    /// Every attempt timed out.
    StepTimeout,
    /// The last attempt failed below HTTP: refused, reset, or a bare 5xx.
    TransportFailure,
    /// The engine returned a structured error; never retried.
    StepRejected,
    /// The engine answered with something that is not a valid response.
    InvalidResponse,
    /// The session deadline passed before this step could finish.
    Cancelled,
}

impl StepErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepErrorKind::EndpointUnavailable => "endpoint_unavailable",
            StepErrorKind::StepTimeout => "step_timeout",
            StepErrorKind::TransportFailure => "transport_failure",
            StepErrorKind::StepRejected => "step_rejected",
            StepErrorKind::InvalidResponse => "invalid_response",
            StepErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for StepErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&EngineError> for StepErrorKind {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::Timeout => StepErrorKind::StepTimeout,
            EngineError::Transport(_) => StepErrorKind::TransportFailure,
            EngineError::Rejected(_) => StepErrorKind::StepRejected,
            EngineError::InvalidResponse(_) => StepErrorKind::InvalidResponse,
        }
    }
}

/// Why a request ended in `failed` or `fallback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoMatchingWorkflow,
    CriticalEngineUnreachable,
    CriticalStepFailed,
    SessionTimeout,
    InternalError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NoMatchingWorkflow => "no_matching_workflow",
            FailureReason::CriticalEngineUnreachable => "critical_engine_unreachable",
            FailureReason::CriticalStepFailed => "critical_step_failed",
            FailureReason::SessionTimeout => "session_timeout",
            FailureReason::InternalError => "internal_error",
        }
    }

    /// Whether a caller can reasonably retry the same request later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureReason::CriticalEngineUnreachable | FailureReason::SessionTimeout
        )
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_are_retryable() {
        assert!(EngineError::Timeout.is_retryable());
        assert!(EngineError::Transport("connection reset".into()).is_retryable());
        assert!(!EngineError::Rejected("bad input".into()).is_retryable());
        assert!(!EngineError::InvalidResponse("not json".into()).is_retryable());
    }

    #[test]
    fn test_transport_errors_are_not_reported_as_timeouts() {
        let kind = StepErrorKind::from(&EngineError::Transport("connection refused".into()));
        assert_eq!(kind, StepErrorKind::TransportFailure);
        assert_eq!(kind.as_str(), "transport_failure");
        assert_eq!(
            StepErrorKind::from(&EngineError::Timeout),
            StepErrorKind::StepTimeout
        );
    }

    #[test]
    fn test_failure_reason_serializes_snake_case() {
        let json = serde_json::to_value(FailureReason::NoMatchingWorkflow).unwrap();
        assert_eq!(json, "no_matching_workflow");
        assert_eq!(
            FailureReason::CriticalEngineUnreachable.to_string(),
            "critical_engine_unreachable"
        );
    }
}
