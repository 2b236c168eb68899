//! Pipeline executor — runs a selected workflow's steps against the engines.
//!
//! ```text
//! pending ──► running ──┬──► success
//!                       ├──► partial_failure ──┬──► (done, still partial_failure)
//!                       │                      └──► failed
//!                       └──► failed
//! ```
//!
//! Steps run strictly in order. For each step the executor:
//! 1. Resolves the endpoint through the registry
//! 2. Skips it (`endpoint_unavailable`, zero attempts) if the health cache
//!    says it is not operational
//! 3. Invokes the engine under a per-attempt timeout, retrying timeouts and
//!    transport errors with exponential backoff
//! 4. Appends the `StepResult`; a failed critical step aborts the session
//!
//! The whole run sits under a session deadline. When it passes, the
//! in-flight step and everything after it are recorded as `cancelled`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::retry::RetryPolicy;
use crate::config::PipelineConfig;
use crate::engine::{EngineDirectory, EngineRequest, PriorStep};
use crate::error::{EngineError, FailureReason, StepErrorKind};
use crate::health::HealthMonitor;
use crate::models::{ExecutionSession, StepResult, WorkflowDefinition, WorkflowStep};
use crate::registry::EndpointRegistry;
use crate::sessions::SessionStore;

/// Step timeout used when neither the step nor a registered endpoint sets one.
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(60);

/// Input for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub workflow: Arc<WorkflowDefinition>,
    pub request: String,
    pub context: serde_json::Value,
}

#[derive(Clone)]
pub struct PipelineExecutor {
    registry: Arc<EndpointRegistry>,
    engines: Arc<EngineDirectory>,
    health: HealthMonitor,
    sessions: Option<Arc<SessionStore>>,
    config: PipelineConfig,
    retry: RetryPolicy,
}

impl PipelineExecutor {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<EndpointRegistry>,
        engines: Arc<EngineDirectory>,
        health: HealthMonitor,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            registry,
            engines,
            health,
            sessions: None,
            config,
            retry,
        }
    }

    /// Publish a snapshot of every session change to `store`.
    pub fn with_session_store(mut self, store: Arc<SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Run the pipeline on its own task.
    pub fn spawn(
        &self,
        session: ExecutionSession,
        run: PipelineRequest,
    ) -> JoinHandle<ExecutionSession> {
        let executor = self.clone();
        tokio::spawn(async move { executor.execute(session, &run).await })
    }

    /// Drive `session` through every step of `run.workflow` and return it in a
    /// terminal state (or `partial_failure` with `completed_at` set).
    pub async fn execute(
        &self,
        mut session: ExecutionSession,
        run: &PipelineRequest,
    ) -> ExecutionSession {
        let workflow = &run.workflow;
        session.start(&workflow.workflow_type);
        self.publish(&session);

        let deadline = self.session_timeout(workflow);
        tracing::info!(
            "[Pipeline] Session {} started: {} ({} steps, deadline {:?})",
            session.session_id,
            workflow.workflow_type,
            workflow.ordered_steps.len(),
            deadline
        );

        let outcome =
            tokio::time::timeout(deadline, self.run_steps(&mut session, run)).await;

        match outcome {
            Ok(Some(reason)) => session.fail(reason),
            Ok(None) => session.complete(),
            Err(_) => {
                tracing::warn!(
                    "[Pipeline] Session {} exceeded {:?}; cancelling remaining steps",
                    session.session_id,
                    deadline
                );
                for step in workflow.ordered_steps.iter().skip(session.step_results.len()) {
                    let critical = self.is_critical(step);
                    session.record(StepResult::failure(
                        step.role,
                        step.endpoint_name(),
                        0,
                        StepErrorKind::Cancelled,
                        "session deadline exceeded",
                        critical,
                        Duration::ZERO,
                    ));
                }
                session.fail(FailureReason::SessionTimeout);
            }
        }

        tracing::info!(
            "[Pipeline] Session {} finished: {} ({} of {} steps succeeded)",
            session.session_id,
            session.status,
            session.step_results.iter().filter(|r| r.is_success()).count(),
            session.step_results.len()
        );
        self.publish(&session);
        session
    }

    /// Returns the abort reason if a critical step failed.
    async fn run_steps(
        &self,
        session: &mut ExecutionSession,
        run: &PipelineRequest,
    ) -> Option<FailureReason> {
        let mut previous: Vec<PriorStep> = Vec::new();

        for (i, step) in run.workflow.ordered_steps.iter().enumerate() {
            tracing::debug!(
                "[Pipeline] Session {} step {}/{}: {}",
                session.session_id,
                i + 1,
                run.workflow.ordered_steps.len(),
                step.role
            );

            let request = EngineRequest {
                request_type: run.workflow.workflow_type.clone(),
                session_id: session.session_id.clone(),
                role: step.role,
                request: run.request.clone(),
                context: run.context.clone(),
                previous_results: previous.clone(),
                timeout: None,
            };
            let result = self.run_step(step, &request).await;

            if let Some(payload) = result.payload.as_ref().filter(|_| result.is_success()) {
                previous.push(PriorStep {
                    role: step.role,
                    payload: payload.clone(),
                });
            }

            let abort = (!result.is_success() && result.critical).then(|| {
                if result.error == Some(StepErrorKind::EndpointUnavailable) {
                    FailureReason::CriticalEngineUnreachable
                } else {
                    FailureReason::CriticalStepFailed
                }
            });

            if !result.is_success() {
                tracing::warn!(
                    "[Pipeline] Session {} step {} failed: {} ({})",
                    session.session_id,
                    step.role,
                    result.error.map(|e| e.as_str()).unwrap_or("unknown"),
                    if result.critical { "critical" } else { "non-critical" }
                );
            }

            session.record(result);
            self.publish(session);

            if abort.is_some() {
                return abort;
            }
        }
        None
    }

    async fn run_step(&self, step: &WorkflowStep, request: &EngineRequest) -> StepResult {
        let started = Instant::now();
        let endpoint_name = step.endpoint_name();

        let endpoint = match self.registry.lookup(endpoint_name) {
            Ok(ep) => ep,
            Err(e) => {
                return StepResult::failure(
                    step.role,
                    endpoint_name,
                    0,
                    StepErrorKind::EndpointUnavailable,
                    format!("endpoint_unavailable: {}", e),
                    step.critical.unwrap_or(true),
                    started.elapsed(),
                );
            }
        };
        let critical = step.critical.unwrap_or(endpoint.critical);

        if !self.health.is_operational(&endpoint.name).await {
            return StepResult::failure(
                step.role,
                &endpoint.name,
                0,
                StepErrorKind::EndpointUnavailable,
                "endpoint_unavailable",
                critical,
                started.elapsed(),
            );
        }

        let engine = self.engines.engine_for(&endpoint);
        let attempt_timeout = step.timeout.unwrap_or(endpoint.timeout);
        let request = &EngineRequest {
            timeout: Some(attempt_timeout),
            ..request.clone()
        };
        let max_attempts = self.retry.max_attempts();
        let mut last_error = EngineError::Timeout;

        for attempt in 1..=max_attempts {
            let outcome = match tokio::time::timeout(attempt_timeout, engine.invoke(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(EngineError::Timeout),
            };

            match outcome {
                Ok(payload) => {
                    return StepResult::success(
                        step.role,
                        &endpoint.name,
                        attempt,
                        payload,
                        critical,
                        started.elapsed(),
                    );
                }
                Err(e) if e.is_retryable() => {
                    tracing::debug!(
                        "[Pipeline] {} attempt {}/{} failed: {}",
                        endpoint.name,
                        attempt,
                        max_attempts,
                        e
                    );
                    last_error = e;
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                    }
                }
                Err(e) => {
                    return StepResult::failure(
                        step.role,
                        &endpoint.name,
                        attempt,
                        StepErrorKind::from(&e),
                        e.to_string(),
                        critical,
                        started.elapsed(),
                    );
                }
            }
        }

        StepResult::failure(
            step.role,
            &endpoint.name,
            max_attempts,
            StepErrorKind::from(&last_error),
            last_error.to_string(),
            critical,
            started.elapsed(),
        )
    }

    fn is_critical(&self, step: &WorkflowStep) -> bool {
        match step.critical {
            Some(critical) => critical,
            None => self
                .registry
                .lookup(step.endpoint_name())
                .map(|ep| ep.critical)
                .unwrap_or(true),
        }
    }

    /// Configured deadline, or every step's worst case plus the margin.
    pub fn session_timeout(&self, workflow: &WorkflowDefinition) -> Duration {
        if let Some(fixed) = self.config.session_timeout {
            return fixed;
        }
        workflow
            .ordered_steps
            .iter()
            .map(|step| {
                let attempt_timeout = step.timeout.unwrap_or_else(|| {
                    self.registry
                        .lookup(step.endpoint_name())
                        .map(|ep| ep.timeout)
                        .unwrap_or(DEFAULT_STEP_TIMEOUT)
                });
                self.retry.step_budget(attempt_timeout)
            })
            .fold(self.config.session_timeout_margin, |acc, d| {
                acc.saturating_add(d)
            })
    }

    fn publish(&self, session: &ExecutionSession) {
        if let Some(store) = &self.sessions {
            store.publish(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertStore;
    use crate::config::HealthConfig;
    use crate::engine::{Engine, EngineConnector, ProbeOutcome};
    use crate::models::{Endpoint, EngineRole, HealthStatus, SessionStatus, StepOutcome};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone, Copy)]
    enum Behaviour {
        Succeed,
        Hang,
        Reject,
        Refuse,
        Garbage,
    }

    struct Scripted {
        behaviour: Behaviour,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Engine for Scripted {
        async fn invoke(&self, request: &EngineRequest) -> Result<serde_json::Value, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Succeed => Ok(serde_json::json!({
                    "role": request.role,
                    "seen": request.previous_results.len(),
                })),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(serde_json::Value::Null)
                }
                Behaviour::Reject => Err(EngineError::Rejected("bad input".into())),
                Behaviour::Refuse => Err(EngineError::Transport("connection refused".into())),
                Behaviour::Garbage => Err(EngineError::InvalidResponse("not json".into())),
            }
        }

        async fn health_check(&self) -> ProbeOutcome {
            ProbeOutcome::Live
        }
    }

    struct Unused;

    impl EngineConnector for Unused {
        fn connect(&self, _endpoint: &Endpoint) -> Arc<dyn Engine> {
            Scripted::new(Behaviour::Reject)
        }
    }

    struct Fixture {
        executor: PipelineExecutor,
        health: HealthMonitor,
        registry: Arc<EndpointRegistry>,
    }

    impl Fixture {
        fn new(config: PipelineConfig, engines: Vec<(Endpoint, Arc<Scripted>)>) -> Self {
            let registry = Arc::new(EndpointRegistry::new());
            let directory = Arc::new(EngineDirectory::new(Arc::new(Unused)));
            for (ep, engine) in engines {
                directory.insert(ep.name.clone(), engine);
                registry.register(ep).unwrap();
            }
            let health = HealthMonitor::new(
                HealthConfig {
                    ttl: Duration::from_secs(24 * 60 * 60),
                    ..HealthConfig::default()
                },
                registry.clone(),
                directory.clone(),
                Arc::new(AlertStore::with_limits(10, Duration::from_secs(3600))),
            );
            let executor =
                PipelineExecutor::new(config, registry.clone(), directory, health.clone());
            Self {
                executor,
                health,
                registry,
            }
        }

        async fn mark(&self, name: &str, status: HealthStatus) {
            let ep = self.registry.lookup(name).unwrap();
            self.health
                .record_probe(&ep, status, None, None, Utc::now())
                .await;
        }

        async fn mark_all_healthy(&self) {
            for ep in self.registry.all() {
                self.mark(&ep.name, HealthStatus::Healthy).await;
            }
        }

        async fn run(&self, workflow: WorkflowDefinition) -> ExecutionSession {
            let run = PipelineRequest {
                workflow: Arc::new(workflow),
                request: "build it".into(),
                context: serde_json::json!({}),
            };
            self.executor.execute(ExecutionSession::new(), &run).await
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(1),
            ..PipelineConfig::default()
        }
    }

    fn abc() -> WorkflowDefinition {
        WorkflowDefinition::new(
            "abc",
            vec![
                WorkflowStep::new(EngineRole::Requirements).critical(true),
                WorkflowStep::new(EngineRole::Architecture).critical(false),
                WorkflowStep::new(EngineRole::Coding).critical(true),
            ],
        )
    }

    fn ep(name: &str, port: u16) -> Endpoint {
        Endpoint::new(name, "localhost", port).with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let fx = Fixture::new(
            fast_config(),
            vec![
                (ep("requirements", 8001), Scripted::new(Behaviour::Succeed)),
                (ep("architecture", 8002), Scripted::new(Behaviour::Succeed)),
                (ep("coding", 8003), Scripted::new(Behaviour::Succeed)),
            ],
        );
        fx.mark_all_healthy().await;

        let session = fx.run(abc()).await;
        assert_eq!(session.status, SessionStatus::Success);
        assert_eq!(session.step_results.len(), 3);
        assert!(session.is_finished());
        // Each step sees the payloads of the ones before it.
        assert_eq!(session.step_results[2].payload.as_ref().unwrap()["seen"], 2);
    }

    #[tokio::test]
    async fn test_non_critical_failure_continues() {
        let coding = Scripted::new(Behaviour::Succeed);
        let fx = Fixture::new(
            fast_config(),
            vec![
                (ep("requirements", 8001), Scripted::new(Behaviour::Succeed)),
                (ep("architecture", 8002), Scripted::new(Behaviour::Reject)),
                (ep("coding", 8003), coding.clone()),
            ],
        );
        fx.mark_all_healthy().await;

        let session = fx.run(abc()).await;
        assert_eq!(session.status, SessionStatus::PartialFailure);
        assert!(session.is_finished());
        assert_eq!(session.step_results.len(), 3);
        assert_eq!(coding.calls(), 1, "C still runs after B fails");
        assert_eq!(
            session.step_results[1].error,
            Some(StepErrorKind::StepRejected)
        );
        assert!(session.failure_reason.is_none());
    }

    #[tokio::test]
    async fn test_critical_failure_aborts() {
        let architecture = Scripted::new(Behaviour::Succeed);
        let coding = Scripted::new(Behaviour::Succeed);
        let fx = Fixture::new(
            fast_config(),
            vec![
                (ep("requirements", 8001), Scripted::new(Behaviour::Reject)),
                (ep("architecture", 8002), architecture.clone()),
                (ep("coding", 8003), coding.clone()),
            ],
        );
        fx.mark_all_healthy().await;

        let session = fx.run(abc()).await;
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.failure_reason, Some(FailureReason::CriticalStepFailed));
        assert_eq!(session.step_results.len(), 1);
        assert_eq!(architecture.calls(), 0);
        assert_eq!(coding.calls(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_endpoint_is_skipped() {
        let architecture = Scripted::new(Behaviour::Succeed);
        let fx = Fixture::new(
            fast_config(),
            vec![
                (ep("requirements", 8001), Scripted::new(Behaviour::Succeed)),
                (ep("architecture", 8002), architecture.clone()),
                (ep("coding", 8003), Scripted::new(Behaviour::Succeed)),
            ],
        );
        fx.mark("requirements", HealthStatus::Healthy).await;
        fx.mark("architecture", HealthStatus::Unhealthy).await;
        fx.mark("coding", HealthStatus::Degraded).await;

        let session = fx.run(abc()).await;
        assert_eq!(session.status, SessionStatus::PartialFailure);
        let skipped = &session.step_results[1];
        assert_eq!(skipped.attempt_count, 0);
        assert_eq!(skipped.outcome, StepOutcome::Error);
        assert_eq!(skipped.error, Some(StepErrorKind::EndpointUnavailable));
        assert_eq!(skipped.error_detail.as_deref(), Some("endpoint_unavailable"));
        assert_eq!(architecture.calls(), 0);
        assert!(session.step_results[2].is_success());
    }

    #[tokio::test]
    async fn test_unprobed_critical_endpoint_aborts_as_unreachable() {
        let fx = Fixture::new(
            fast_config(),
            vec![
                (ep("requirements", 8001), Scripted::new(Behaviour::Succeed)),
                (ep("architecture", 8002), Scripted::new(Behaviour::Succeed)),
                (ep("coding", 8003), Scripted::new(Behaviour::Succeed)),
            ],
        );

        let session = fx.run(abc()).await;
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(
            session.failure_reason,
            Some(FailureReason::CriticalEngineUnreachable)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_use_every_attempt() {
        let hang = Scripted::new(Behaviour::Hang);
        let fx = Fixture::new(
            fast_config(),
            vec![(ep("coding", 8003), hang.clone())],
        );
        fx.mark_all_healthy().await;

        let workflow = WorkflowDefinition::new(
            "bug_fix",
            vec![WorkflowStep::new(EngineRole::Coding).critical(false)],
        );
        let session = fx.run(workflow).await;

        assert_eq!(hang.calls(), 4);
        let step = &session.step_results[0];
        assert_eq!(step.attempt_count, 4);
        assert_eq!(step.outcome, StepOutcome::Timeout);
        assert_eq!(step.error, Some(StepErrorKind::StepTimeout));
        assert_eq!(session.status, SessionStatus::PartialFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_connections_are_retried_then_reported_as_errors() {
        let refuse = Scripted::new(Behaviour::Refuse);
        let fx = Fixture::new(
            fast_config(),
            vec![(ep("coding", 8003), refuse.clone())],
        );
        fx.mark_all_healthy().await;

        let workflow = WorkflowDefinition::new(
            "bug_fix",
            vec![WorkflowStep::new(EngineRole::Coding).critical(false)],
        );
        let session = fx.run(workflow).await;

        assert_eq!(refuse.calls(), 4);
        let step = &session.step_results[0];
        assert_eq!(step.attempt_count, 4);
        assert_eq!(step.outcome, StepOutcome::Error);
        assert_eq!(step.error, Some(StepErrorKind::TransportFailure));
        assert!(step
            .error_detail
            .as_deref()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_terminal_errors_are_not_retried() {
        let reject = Scripted::new(Behaviour::Reject);
        let garbage = Scripted::new(Behaviour::Garbage);
        let fx = Fixture::new(
            fast_config(),
            vec![
                (ep("testing", 8004), reject.clone()),
                (ep("operations", 8006), garbage.clone()),
            ],
        );
        fx.mark_all_healthy().await;

        let workflow = WorkflowDefinition::new(
            "checks",
            vec![
                WorkflowStep::new(EngineRole::Testing).critical(false),
                WorkflowStep::new(EngineRole::Operations).critical(false),
            ],
        );
        let session = fx.run(workflow).await;
        assert_eq!(reject.calls(), 1);
        assert_eq!(garbage.calls(), 1);
        assert_eq!(
            session.step_results[1].error,
            Some(StepErrorKind::InvalidResponse)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_deadline_cancels_remaining_steps() {
        let config = PipelineConfig {
            session_timeout: Some(Duration::from_secs(8)),
            max_retries: 0,
            ..fast_config()
        };
        let coding = Scripted::new(Behaviour::Succeed);
        let fx = Fixture::new(
            config,
            vec![
                (ep("requirements", 8001), Scripted::new(Behaviour::Succeed)),
                (ep("architecture", 8002), Scripted::new(Behaviour::Hang)),
                (ep("coding", 8003), coding.clone()),
            ],
        );
        fx.mark_all_healthy().await;

        let workflow = WorkflowDefinition::new(
            "abc",
            vec![
                WorkflowStep::new(EngineRole::Requirements),
                WorkflowStep::new(EngineRole::Architecture)
                    .critical(false)
                    .with_timeout(Duration::from_secs(30)),
                WorkflowStep::new(EngineRole::Coding),
            ],
        );
        let session = fx.run(workflow).await;

        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.failure_reason, Some(FailureReason::SessionTimeout));
        assert_eq!(session.step_results.len(), 3);
        assert!(session.step_results[0].is_success());
        assert_eq!(session.step_results[1].error, Some(StepErrorKind::Cancelled));
        assert_eq!(session.step_results[2].error, Some(StepErrorKind::Cancelled));
        assert_eq!(coding.calls(), 0);
    }

    #[test]
    fn test_computed_session_deadline() {
        let fx = Fixture::new(
            PipelineConfig {
                max_retries: 1,
                backoff_base: Duration::from_secs(1),
                backoff_max: Duration::from_secs(30),
                session_timeout_margin: Duration::from_secs(10),
                session_timeout: None,
            },
            vec![(ep("coding", 8003), Scripted::new(Behaviour::Succeed))],
        );
        let workflow = WorkflowDefinition::new(
            "bug_fix",
            vec![WorkflowStep::new(EngineRole::Coding)],
        );
        // 5s * 2 attempts + 1s backoff + 10s margin
        assert_eq!(
            fx.executor.session_timeout(&workflow),
            Duration::from_secs(21)
        );
    }
}
