//! End-to-end behaviour of the public `Coordinator` API with scripted
//! engines and classifiers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::engine::{Engine, EngineConnector, EngineRequest, ProbeOutcome};
use relay_core::error::ClassifierError;
use relay_core::models::{
    AlertSeverity, Endpoint, EngineRole, HealthStatus, SessionStatus, StepOutcome,
    WorkflowDefinition, WorkflowStep,
};
use relay_core::selector::{Classification, Classifier};
use relay_core::{Coordinator, CoordinatorConfig, EngineError, FailureReason, StepErrorKind};

struct FixedClassifier(Classification);

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(
        &self,
        _request_text: &str,
        _context: &serde_json::Value,
    ) -> Result<Classification, ClassifierError> {
        Ok(self.0.clone())
    }
}

fn classifier(workflow_type: &str, confidence: f64) -> Arc<dyn Classifier> {
    Arc::new(FixedClassifier(Classification::new(workflow_type, confidence)))
}

/// Engine with a fixed probe outcome that either answers or rejects.
struct FakeEngine {
    probe: ProbeOutcome,
    reject: bool,
    calls: AtomicU32,
}

impl FakeEngine {
    fn live() -> Arc<Self> {
        Arc::new(Self {
            probe: ProbeOutcome::Live,
            reject: false,
            calls: AtomicU32::new(0),
        })
    }

    fn down() -> Arc<Self> {
        Arc::new(Self {
            probe: ProbeOutcome::Unreachable("connection refused".into()),
            reject: false,
            calls: AtomicU32::new(0),
        })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            probe: ProbeOutcome::Live,
            reject: true,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn invoke(&self, request: &EngineRequest) -> Result<serde_json::Value, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(EngineError::Rejected("cannot handle this request".into()));
        }
        Ok(serde_json::json!({ "role": request.role, "ok": true }))
    }

    async fn health_check(&self) -> ProbeOutcome {
        self.probe.clone()
    }
}

/// Connector that hands out live engines for anything not bound explicitly.
struct AllLive;

impl EngineConnector for AllLive {
    fn connect(&self, _endpoint: &Endpoint) -> Arc<dyn Engine> {
        FakeEngine::live()
    }
}

fn builtin_with(
    classifier: Arc<dyn Classifier>,
    engines: HashMap<&str, Arc<FakeEngine>>,
) -> Coordinator {
    let mut builder = Coordinator::builder(CoordinatorConfig::builtin())
        .classifier(classifier)
        .connector(Arc::new(AllLive));
    for (name, engine) in engines {
        builder = builder.engine(name, engine);
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn test_blog_request_with_unhealthy_architecture_is_partial_failure() {
    let architecture = FakeEngine::down();
    let coordinator = builtin_with(
        classifier("web_application", 0.9),
        HashMap::from([("architecture", architecture.clone())]),
    );
    coordinator.health().probe_all().await;

    let response = coordinator
        .process_request("我想開發一個個人部落格網站", serde_json::json!({}))
        .await;

    assert_eq!(response.status, SessionStatus::PartialFailure);
    assert_eq!(response.workflow_type.as_deref(), Some("web_application"));
    assert_eq!(response.confidence, Some(0.9));
    assert!(response.failure_reason.is_none());
    assert!(response.fallback.is_none());

    let roles: Vec<_> = response.steps.iter().map(|s| s.engine_role).collect();
    assert_eq!(
        roles,
        vec![EngineRole::Requirements, EngineRole::Architecture, EngineRole::Coding]
    );
    assert_eq!(response.steps[0].outcome, StepOutcome::Success);
    assert_eq!(
        response.steps[1].error,
        Some(StepErrorKind::EndpointUnavailable)
    );
    assert_eq!(response.steps[1].attempt_count, 0);
    assert_eq!(response.steps[2].outcome, StepOutcome::Success);
    assert_eq!(architecture.calls(), 0);

    let stored = coordinator.get_session(&response.session_id).unwrap();
    assert_eq!(stored.status, SessionStatus::PartialFailure);
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn test_unknown_workflow_type_falls_back() {
    let coordinator = builtin_with(classifier("poetry", 0.95), HashMap::new());
    coordinator.health().probe_all().await;

    let response = coordinator
        .process_request("write me a sonnet", serde_json::Value::Null)
        .await;

    assert_eq!(response.status, SessionStatus::Fallback);
    assert_eq!(
        response.failure_reason,
        Some(FailureReason::NoMatchingWorkflow)
    );
    assert_eq!(response.confidence, Some(0.75));
    assert!(response.steps.is_empty());
    let fallback = response.fallback.unwrap();
    assert_eq!(fallback.reason, FailureReason::NoMatchingWorkflow);
    assert!(!fallback.message.is_empty());

    let warnings = coordinator.get_alerts(Some(AlertSeverity::Warning));
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].subject, response.session_id);
}

#[tokio::test]
async fn test_below_threshold_uses_workflow_fallback_confidence() {
    // release: min_confidence 0.8, fallback_confidence 0.75
    let coordinator = builtin_with(classifier("release", 0.79), HashMap::new());
    let response = coordinator
        .process_request("maybe ship something", serde_json::Value::Null)
        .await;

    assert_eq!(response.status, SessionStatus::Fallback);
    assert_eq!(response.workflow_type.as_deref(), Some("release"));
    assert_eq!(response.confidence, Some(0.75));
}

#[tokio::test]
async fn test_critical_engine_down_fails_session() {
    let requirements = FakeEngine::down();
    let coding = FakeEngine::live();
    let coordinator = builtin_with(
        classifier("web_application", 0.9),
        HashMap::from([("requirements", requirements), ("coding", coding.clone())]),
    );
    coordinator.health().probe_all().await;

    let response = coordinator
        .process_request("build a website", serde_json::json!({}))
        .await;

    assert_eq!(response.status, SessionStatus::Failed);
    assert_eq!(
        response.failure_reason,
        Some(FailureReason::CriticalEngineUnreachable)
    );
    assert_eq!(response.steps.len(), 1);
    assert_eq!(coding.calls(), 0);

    let fallback = response.fallback.unwrap();
    assert_eq!(fallback.confidence, 0.85);
    assert_eq!(fallback.workflow_type.as_deref(), Some("web_application"));

    // One alert from the health monitor, one from the failed session.
    let critical = coordinator.get_alerts(Some(AlertSeverity::Critical));
    let subjects: Vec<_> = critical.iter().map(|a| a.subject.as_str()).collect();
    assert!(subjects.contains(&"requirements"));
    assert!(subjects.contains(&response.session_id.as_str()));
}

#[tokio::test]
async fn test_rejecting_critical_step_is_step_failure() {
    let testing = FakeEngine::rejecting();
    let coordinator = builtin_with(
        classifier("bug_fix", 0.7),
        HashMap::from([("testing", testing.clone())]),
    );
    coordinator.health().probe_all().await;

    let response = coordinator
        .process_request("fix the login crash", serde_json::json!({}))
        .await;

    assert_eq!(response.status, SessionStatus::Failed);
    assert_eq!(
        response.failure_reason,
        Some(FailureReason::CriticalStepFailed)
    );
    assert_eq!(testing.calls(), 1);
    assert_eq!(response.steps[1].error, Some(StepErrorKind::StepRejected));
}

#[tokio::test]
async fn test_engine_status_covers_every_endpoint() {
    let coordinator = builtin_with(
        classifier("bug_fix", 0.9),
        HashMap::from([("operations", FakeEngine::down())]),
    );

    let before = coordinator.get_engine_status().await;
    assert_eq!(before.len(), 6);
    assert!(before.values().all(|r| r.status == HealthStatus::Unknown));

    coordinator.health().probe_all().await;
    let after = coordinator.get_engine_status().await;
    assert_eq!(after["coding"].status, HealthStatus::Healthy);
    assert_eq!(after["operations"].status, HealthStatus::Unhealthy);

    let summary = coordinator.health_summary().await;
    assert_eq!(summary.healthy, 5);
    assert_eq!(summary.unhealthy, 1);
    assert!(summary.critical_path_ok);
    assert_eq!(summary.overall, HealthStatus::Degraded);
}

#[tokio::test]
async fn test_alerts_are_listed_oldest_first() {
    let coordinator = builtin_with(classifier("poetry", 0.9), HashMap::new());
    let first = coordinator
        .process_request("one", serde_json::Value::Null)
        .await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = coordinator
        .process_request("two", serde_json::Value::Null)
        .await;

    let alerts = coordinator.get_alerts(None);
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].subject, first.session_id);
    assert_eq!(alerts[1].subject, second.session_id);
    assert!(alerts[0].created_at <= alerts[1].created_at);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_build() {
    let mut config = CoordinatorConfig::builtin();
    config.workflows.push(WorkflowDefinition::new(
        "docs",
        vec![WorkflowStep::new(EngineRole::Coding).on_endpoint("docs-writer")],
    ));
    let err = Coordinator::from_config(config).err().unwrap();
    assert!(err.to_string().contains("docs-writer"));
}
