use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FailureReason, StepErrorKind};
use crate::models::workflow::EngineRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    PartialFailure,
    Success,
    Failed,
    Fallback,
}

impl SessionStatus {
    /// `partial_failure` is only terminal once the pipeline has finished;
    /// the session is closed by `ExecutionSession::complete`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Success | SessionStatus::Failed | SessionStatus::Fallback
        )
    }

    fn can_move_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Pending, Running) | (Pending, Fallback) | (Pending, Failed) => true,
            (Running, PartialFailure) | (Running, Success) | (Running, Failed) => true,
            (PartialFailure, Failed) | (PartialFailure, Fallback) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::PartialFailure => "partial_failure",
            SessionStatus::Success => "success",
            SessionStatus::Failed => "failed",
            SessionStatus::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Timeout,
    Error,
}

/// What happened to one workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub engine_role: EngineRole,
    pub endpoint_name: String,
    /// Network attempts made; zero when the call was skipped
    pub attempt_count: u32,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub critical: bool,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn success(
        engine_role: EngineRole,
        endpoint_name: &str,
        attempt_count: u32,
        payload: serde_json::Value,
        critical: bool,
        duration: Duration,
    ) -> Self {
        Self {
            engine_role,
            endpoint_name: endpoint_name.to_string(),
            attempt_count,
            outcome: StepOutcome::Success,
            payload: Some(payload),
            error: None,
            error_detail: None,
            critical,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn failure(
        engine_role: EngineRole,
        endpoint_name: &str,
        attempt_count: u32,
        kind: StepErrorKind,
        detail: impl Into<String>,
        critical: bool,
        duration: Duration,
    ) -> Self {
        let outcome = if kind == StepErrorKind::StepTimeout {
            StepOutcome::Timeout
        } else {
            StepOutcome::Error
        };
        Self {
            engine_role,
            endpoint_name: endpoint_name.to_string(),
            attempt_count,
            outcome,
            payload: None,
            error: Some(kind),
            error_detail: Some(detail.into()),
            critical,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == StepOutcome::Success
    }
}

/// One end-to-end execution of a workflow for a single request.
///
/// Owned and mutated by exactly one task; everyone else sees clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSession {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
    pub status: SessionStatus,
    pub step_results: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionSession {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            workflow_type: None,
            status: SessionStatus::Pending,
            step_results: Vec::new(),
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move to `next` if the state machine allows it. Returns whether the
    /// transition happened.
    pub fn transition(&mut self, next: SessionStatus) -> bool {
        if self.status == next {
            return true;
        }
        if !self.status.can_move_to(next) {
            tracing::warn!(
                "[Session] Ignoring invalid transition {} → {} for {}",
                self.status,
                next,
                self.session_id
            );
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    pub fn start(&mut self, workflow_type: &str) {
        self.workflow_type = Some(workflow_type.to_string());
        self.transition(SessionStatus::Running);
    }

    /// Append a step result; a failed step moves a running session to
    /// `partial_failure`.
    pub fn record(&mut self, result: StepResult) {
        if !result.is_success() && self.status == SessionStatus::Running {
            self.transition(SessionStatus::PartialFailure);
        }
        self.step_results.push(result);
    }

    pub fn fail(&mut self, reason: FailureReason) {
        self.failure_reason = Some(reason);
        self.transition(SessionStatus::Failed);
    }

    pub fn fall_back(&mut self, reason: FailureReason) {
        self.failure_reason = Some(reason);
        self.transition(SessionStatus::Fallback);
    }

    /// Close a session whose pipeline ran to the end.
    pub fn complete(&mut self) {
        match self.status {
            SessionStatus::Running => {
                self.transition(SessionStatus::Success);
            }
            SessionStatus::PartialFailure => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }
    }

    pub fn is_finished(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.step_results.iter().filter(|r| !r.is_success())
    }
}

impl Default for ExecutionSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(role: EngineRole) -> StepResult {
        StepResult::success(
            role,
            role.as_str(),
            1,
            serde_json::json!({}),
            true,
            Duration::from_millis(5),
        )
    }

    fn unavailable(role: EngineRole) -> StepResult {
        StepResult::failure(
            role,
            role.as_str(),
            0,
            StepErrorKind::EndpointUnavailable,
            "endpoint_unavailable",
            false,
            Duration::ZERO,
        )
    }

    #[test]
    fn test_all_success_completes_as_success() {
        let mut session = ExecutionSession::new();
        session.start("bug_fix");
        session.record(ok(EngineRole::Coding));
        session.record(ok(EngineRole::Testing));
        session.complete();
        assert_eq!(session.status, SessionStatus::Success);
        assert!(session.completed_at.is_some());
    }

    #[test]
    fn test_non_critical_failure_stays_partial() {
        let mut session = ExecutionSession::new();
        session.start("web_application");
        session.record(ok(EngineRole::Requirements));
        session.record(unavailable(EngineRole::Architecture));
        session.record(ok(EngineRole::Coding));
        session.complete();
        assert_eq!(session.status, SessionStatus::PartialFailure);
        assert!(session.is_finished());
        assert_eq!(session.failed_steps().count(), 1);
    }

    #[test]
    fn test_terminal_sessions_do_not_move() {
        let mut session = ExecutionSession::new();
        session.start("bug_fix");
        session.fail(FailureReason::CriticalStepFailed);
        assert!(!session.transition(SessionStatus::Running));
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.failure_reason, Some(FailureReason::CriticalStepFailed));
    }

    #[test]
    fn test_step_timeout_maps_to_timeout_outcome() {
        let result = StepResult::failure(
            EngineRole::Testing,
            "testing",
            4,
            StepErrorKind::StepTimeout,
            "timed out after 4 attempts",
            true,
            Duration::from_secs(1),
        );
        assert_eq!(result.outcome, StepOutcome::Timeout);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["error"], "step_timeout");
        assert_eq!(json["outcome"], "timeout");
    }
}
