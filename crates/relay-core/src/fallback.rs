//! Fallback manager — deterministic low-confidence answers and the alerts
//! that go with them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::alerts::AlertStore;
use crate::config::FallbackConfig;
use crate::error::FailureReason;
use crate::models::{AlertSeverity, ExecutionSession, WorkflowDefinition};
use crate::selector::{NoMatch, NoMatchReason};

/// Payload returned in place of (or alongside) pipeline results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackResponse {
    pub reason: FailureReason,
    pub confidence: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
}

pub struct FallbackManager {
    config: FallbackConfig,
    alerts: Arc<AlertStore>,
}

impl FallbackManager {
    pub fn new(config: FallbackConfig, alerts: Arc<AlertStore>) -> Self {
        Self { config, alerts }
    }

    pub fn default_confidence(&self) -> f64 {
        self.config.default_confidence
    }

    /// The selector found nothing suitable.
    pub fn no_match(&self, session_id: &str, no_match: &NoMatch) -> FallbackResponse {
        let confidence = no_match
            .workflow
            .as_ref()
            .map(|wf| wf.fallback_confidence)
            .unwrap_or(self.config.default_confidence);

        let message = match (no_match.reason, &no_match.classification) {
            (NoMatchReason::BelowThreshold, Some(c)) => format!(
                "Request looks like {} but confidence {:.2} is too low to run it automatically; \
                 please add more detail about what you need.",
                c.workflow_type, c.confidence
            ),
            (NoMatchReason::ClassifierUnavailable, _) => {
                "Request could not be classified right now; please try again shortly."
                    .to_string()
            }
            _ => "No workflow matches this request; please describe the project type, \
                  e.g. a web application, an API service, a bug fix or a release."
                .to_string(),
        };

        self.alerts.raise(
            AlertSeverity::Warning,
            session_id,
            format!("Fallback ({}): {}", no_match.reason.as_str(), message),
        );

        FallbackResponse {
            reason: FailureReason::NoMatchingWorkflow,
            confidence,
            message,
            workflow_type: no_match.workflow.as_ref().map(|wf| wf.workflow_type.clone()),
        }
    }

    /// The pipeline ended in `failed`.
    pub fn session_failed(
        &self,
        session: &ExecutionSession,
        workflow: &WorkflowDefinition,
    ) -> FallbackResponse {
        let reason = session
            .failure_reason
            .unwrap_or(FailureReason::InternalError);
        let failed_step = session.failed_steps().find(|r| r.critical);

        let message = match (reason, failed_step) {
            (FailureReason::CriticalEngineUnreachable, Some(step)) => format!(
                "The {} engine is currently unavailable, so the {} workflow was stopped. \
                 Please retry later.",
                step.engine_role, workflow.workflow_type
            ),
            (FailureReason::CriticalStepFailed, Some(step)) => format!(
                "The {} step failed, so the {} workflow was stopped. Partial results are included.",
                step.engine_role, workflow.workflow_type
            ),
            (FailureReason::SessionTimeout, _) => format!(
                "The {} workflow did not finish in time; completed steps are included.",
                workflow.workflow_type
            ),
            _ => format!("The {} workflow could not be completed.", workflow.workflow_type),
        };

        let severity = match reason {
            FailureReason::CriticalEngineUnreachable
            | FailureReason::CriticalStepFailed
            | FailureReason::InternalError => AlertSeverity::Critical,
            _ => AlertSeverity::Warning,
        };
        self.alerts.raise(
            severity,
            session.session_id.clone(),
            format!("Session failed ({}): {}", reason, message),
        );

        FallbackResponse {
            reason,
            confidence: workflow.fallback_confidence,
            message,
            workflow_type: Some(workflow.workflow_type.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepErrorKind;
    use crate::models::{EngineRole, StepResult, WorkflowStep};
    use crate::selector::Classification;
    use std::time::Duration;

    fn manager() -> (FallbackManager, Arc<AlertStore>) {
        let alerts = Arc::new(AlertStore::with_limits(10, Duration::from_secs(3600)));
        (
            FallbackManager::new(FallbackConfig::default(), alerts.clone()),
            alerts,
        )
    }

    fn release() -> Arc<WorkflowDefinition> {
        Arc::new(
            WorkflowDefinition::new("release", vec![WorkflowStep::new(EngineRole::Release)])
                .with_fallback_confidence(0.8),
        )
    }

    #[test]
    fn test_unknown_type_uses_default_confidence() {
        let (manager, alerts) = manager();
        let response = manager.no_match(
            "s-1",
            &NoMatch {
                reason: NoMatchReason::UnknownWorkflow,
                classification: Some(Classification::new("poetry", 0.9)),
                workflow: None,
            },
        );
        assert_eq!(response.reason, FailureReason::NoMatchingWorkflow);
        assert!((response.confidence - 0.75).abs() < 1e-9);
        assert!(response.workflow_type.is_none());

        let raised = alerts.list(None);
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].severity, AlertSeverity::Warning);
        assert_eq!(raised[0].subject, "s-1");
    }

    #[test]
    fn test_below_threshold_uses_workflow_confidence() {
        let (manager, _) = manager();
        let response = manager.no_match(
            "s-2",
            &NoMatch {
                reason: NoMatchReason::BelowThreshold,
                classification: Some(Classification::new("release", 0.79)),
                workflow: Some(release()),
            },
        );
        assert!((response.confidence - 0.8).abs() < 1e-9);
        assert_eq!(response.workflow_type.as_deref(), Some("release"));
    }

    #[test]
    fn test_critical_failure_raises_critical_alert() {
        let (manager, alerts) = manager();
        let mut session = ExecutionSession::new();
        session.start("release");
        session.record(StepResult::failure(
            EngineRole::Release,
            "release",
            0,
            StepErrorKind::EndpointUnavailable,
            "endpoint_unavailable",
            true,
            Duration::ZERO,
        ));
        session.fail(FailureReason::CriticalEngineUnreachable);

        let response = manager.session_failed(&session, &release());
        assert_eq!(response.reason, FailureReason::CriticalEngineUnreachable);
        assert!(response.message.contains("release engine"));
        assert_eq!(alerts.counts().critical_open, 1);
    }
}
