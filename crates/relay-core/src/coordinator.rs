//! Coordinator — the public entry point tying the components together.
//!
//! ```text
//!                         ┌──────────────────┐
//!  process_request ──────►│ WorkflowSelector │── NoMatch ──► FallbackManager
//!                         └────────┬─────────┘                    ▲
//!                                  │ Selection                    │ failed
//!                                  ▼                              │
//!                         ┌──────────────────┐                    │
//!                         │ PipelineExecutor │────────────────────┘
//!                         └───┬──────────┬───┘
//!                 lookup      │          │ is_operational
//!                 ┌───────────▼──┐   ┌───▼───────────┐
//!                 │   Registry   │   │ HealthMonitor │──► AlertStore
//!                 └──────────────┘   └───────────────┘
//! ```
//!
//! Each request runs its pipeline on a dedicated tokio task; the caller
//! always gets a well-formed `ProcessResponse` back.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::alerts::AlertStore;
use crate::config::CoordinatorConfig;
use crate::engine::http::truncate;
use crate::engine::{Engine, EngineConnector, EngineDirectory, HttpConnector};
use crate::error::{ConfigError, FailureReason};
use crate::fallback::{FallbackManager, FallbackResponse};
use crate::health::HealthMonitor;
use crate::models::{
    Alert, AlertSeverity, ExecutionSession, HealthRecord, HealthSummary, SessionStatus,
    StepResult,
};
use crate::pipeline::{PipelineExecutor, PipelineRequest};
use crate::registry::EndpointRegistry;
use crate::selector::{Classifier, HttpClassifier, KeywordClassifier, WorkflowSelector};
use crate::sessions::SessionStore;
use crate::snapshot::{Snapshot, SnapshotError, SnapshotWriter};

/// What a caller gets back for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub status: SessionStatus,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackResponse>,
}

impl ProcessResponse {
    fn from_session(session: ExecutionSession, confidence: Option<f64>) -> Self {
        Self {
            status: session.status,
            session_id: session.session_id,
            workflow_type: session.workflow_type,
            steps: session.step_results,
            confidence,
            failure_reason: session.failure_reason,
            fallback: None,
        }
    }
}

/// Assembles a `Coordinator`, allowing engines and the classifier to be
/// swapped out.
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    classifier: Option<Arc<dyn Classifier>>,
    connector: Option<Arc<dyn EngineConnector>>,
    engines: Vec<(String, Arc<dyn Engine>)>,
}

impl CoordinatorBuilder {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            classifier: None,
            connector: None,
            engines: Vec::new(),
        }
    }

    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn EngineConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Bind a concrete engine to one endpoint name.
    pub fn engine(mut self, endpoint_name: impl Into<String>, engine: Arc<dyn Engine>) -> Self {
        self.engines.push((endpoint_name.into(), engine));
        self
    }

    pub fn build(self) -> Result<Coordinator, ConfigError> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let registry = Arc::new(EndpointRegistry::from_endpoints(&config.endpoints)?);
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(HttpConnector) as Arc<dyn EngineConnector>);
        let engines = Arc::new(EngineDirectory::new(connector));
        for (name, engine) in self.engines {
            engines.insert(name, engine);
        }

        let classifier: Arc<dyn Classifier> = match (self.classifier, &config.classifier.url) {
            (Some(classifier), _) => classifier,
            (None, Some(url)) => {
                tracing::info!("[Coordinator] Using remote classifier at {}", url);
                Arc::new(HttpClassifier::new(url.clone(), config.classifier.timeout))
            }
            (None, None) => Arc::new(KeywordClassifier::new(&config.workflows)),
        };

        let alerts = Arc::new(AlertStore::new(&config.alerts));
        let sessions = Arc::new(SessionStore::new(config.sessions.retained));
        let health = HealthMonitor::new(
            config.health.clone(),
            registry.clone(),
            engines.clone(),
            alerts.clone(),
        );
        let executor = PipelineExecutor::new(
            config.pipeline.clone(),
            registry.clone(),
            engines,
            health.clone(),
        )
        .with_session_store(sessions.clone());

        tracing::info!(
            "[Coordinator] Ready: {} endpoint(s), {} workflow(s)",
            registry.len(),
            config.workflows.len()
        );

        Ok(Coordinator {
            selector: WorkflowSelector::new(&config.workflows, classifier),
            fallback: FallbackManager::new(config.fallback.clone(), alerts.clone()),
            snapshot: config.snapshot.path.as_ref().map(SnapshotWriter::new),
            snapshot_task: Mutex::new(None),
            config,
            registry,
            health,
            executor,
            alerts,
            sessions,
        })
    }
}

pub struct Coordinator {
    config: Arc<CoordinatorConfig>,
    registry: Arc<EndpointRegistry>,
    health: HealthMonitor,
    selector: WorkflowSelector,
    executor: PipelineExecutor,
    fallback: FallbackManager,
    alerts: Arc<AlertStore>,
    sessions: Arc<SessionStore>,
    snapshot: Option<SnapshotWriter>,
    snapshot_task: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn builder(config: CoordinatorConfig) -> CoordinatorBuilder {
        CoordinatorBuilder::new(config)
    }

    /// Coordinator with HTTP engines and the default classifier.
    pub fn from_config(config: CoordinatorConfig) -> Result<Self, ConfigError> {
        CoordinatorBuilder::new(config).build()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn alerts(&self) -> &AlertStore {
        &self.alerts
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Start background health probing and, if configured, snapshotting.
    pub async fn start(&self) {
        self.health.start().await;

        let Some(writer) = self.snapshot.clone() else {
            return;
        };
        let interval = self.config.snapshot.interval;
        let health = self.health.clone();
        let alerts = self.alerts.clone();
        let sessions = self.sessions.clone();

        tracing::info!(
            "[Coordinator] Writing snapshots to {} every {:?}",
            writer.path().display(),
            interval
        );
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the first
            // snapshot lands one interval after start.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let snapshot = collect_snapshot(&health, &alerts, &sessions).await;
                writer.write_safe(&snapshot).await;
            }
        });
        *self.snapshot_task.lock().await = Some(handle);
    }

    /// Stop background work and write a final snapshot.
    pub async fn shutdown(&self) {
        self.health.stop().await;
        if let Some(handle) = self.snapshot_task.lock().await.take() {
            handle.abort();
        }
        if let Err(e) = self.write_snapshot().await {
            tracing::warn!("[Coordinator] Final snapshot failed: {}", e);
        }
        tracing::info!("[Coordinator] Shut down");
    }

    // ── Requests ───────────────────────────────────────────────────────

    pub async fn process_request(
        &self,
        user_input: &str,
        context: serde_json::Value,
    ) -> ProcessResponse {
        let mut session = ExecutionSession::new();
        let session_id = session.session_id.clone();
        self.sessions.publish(&session);
        tracing::info!(
            "[Coordinator] Session {} received: {}",
            session_id,
            truncate(user_input, 80)
        );

        let selection = match self.selector.select(user_input, &context).await {
            Ok(selection) => selection,
            Err(no_match) => {
                session.workflow_type = no_match
                    .workflow
                    .as_ref()
                    .map(|wf| wf.workflow_type.clone());
                session.fall_back(FailureReason::NoMatchingWorkflow);
                self.sessions.publish(&session);

                let fallback = self.fallback.no_match(&session_id, &no_match);
                let mut response =
                    ProcessResponse::from_session(session, Some(fallback.confidence));
                response.fallback = Some(fallback);
                return response;
            }
        };

        let workflow = selection.workflow.clone();
        let run = PipelineRequest {
            workflow: workflow.clone(),
            request: user_input.to_string(),
            context,
        };
        let session = match self.executor.spawn(session, run).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("[Coordinator] Session {} task failed: {}", session_id, e);
                let mut session = self.sessions.get(&session_id).unwrap_or_else(|| {
                    let mut blank = ExecutionSession::new();
                    blank.session_id = session_id.clone();
                    blank
                });
                session.fail(FailureReason::InternalError);
                self.sessions.publish(&session);
                session
            }
        };

        let fallback = (session.status == SessionStatus::Failed)
            .then(|| self.fallback.session_failed(&session, &workflow));
        let mut response = ProcessResponse::from_session(session, Some(selection.confidence));
        response.fallback = fallback;
        response
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub async fn get_engine_status(&self) -> BTreeMap<String, HealthRecord> {
        self.health.snapshot().await
    }

    pub async fn health_summary(&self) -> HealthSummary {
        self.health.summary().await
    }

    /// Alerts oldest first, optionally filtered by severity.
    pub fn get_alerts(&self, severity: Option<AlertSeverity>) -> Vec<Alert> {
        self.alerts.list(severity)
    }

    pub fn get_session(&self, session_id: &str) -> Option<ExecutionSession> {
        self.sessions.get(session_id)
    }

    pub fn sessions(&self) -> Vec<ExecutionSession> {
        self.sessions.list()
    }

    // ── Snapshots ──────────────────────────────────────────────────────

    pub async fn snapshot(&self) -> Snapshot {
        collect_snapshot(&self.health, &self.alerts, &self.sessions).await
    }

    /// Write a snapshot now. A no-op when no snapshot path is configured.
    pub async fn write_snapshot(&self) -> Result<(), SnapshotError> {
        match &self.snapshot {
            Some(writer) => writer.write(&self.snapshot().await).await,
            None => Ok(()),
        }
    }
}

async fn collect_snapshot(
    health: &HealthMonitor,
    alerts: &AlertStore,
    sessions: &SessionStore,
) -> Snapshot {
    Snapshot {
        written_at: Utc::now(),
        health: health.snapshot().await,
        alert_counts: alerts.counts(),
        alerts: alerts.list(None),
        sessions: sessions.list(),
    }
}
