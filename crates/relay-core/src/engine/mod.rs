//! Engine interface — the single seam between the coordinator and the
//! lifecycle engines it drives.
//!
//! ```text
//! PipelineExecutor ──► EngineDirectory ──► Arc<dyn Engine>
//!                                              │
//! HealthMonitor ───────────────────────────────┤
//!                                              │
//!                                  HttpEngine (reqwest) │ test doubles
//! ```

pub mod http;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::{EngineRole, Endpoint};

pub use http::{HttpConnector, HttpEngine};

/// Payload sent to an engine for one pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRequest {
    /// Workflow type the step belongs to
    #[serde(rename = "type")]
    pub request_type: String,
    pub session_id: String,
    pub role: EngineRole,
    /// The caller's original request text
    pub request: String,
    #[serde(default)]
    pub context: serde_json::Value,
    /// Payloads of earlier successful steps, in order
    #[serde(default)]
    pub previous_results: Vec<PriorStep>,
    /// Deadline for this call; engines fall back to the endpoint timeout.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorStep {
    pub role: EngineRole,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Structured engine reply: `{status, result | error_detail}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl EngineResponse {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            result: Some(result),
            error_detail: None,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            result: None,
            error_detail: Some(detail.into()),
        }
    }

    /// Split into the step payload or a terminal rejection.
    pub fn into_result(self) -> Result<serde_json::Value, EngineError> {
        match self.status {
            ResponseStatus::Success => Ok(self.result.unwrap_or(serde_json::Value::Null)),
            ResponseStatus::Error => Err(EngineError::Rejected(
                self.error_detail
                    .unwrap_or_else(|| "engine reported an error".to_string()),
            )),
        }
    }
}

/// Raw result of one liveness probe. The health monitor turns this plus the
/// measured latency into a `HealthStatus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Health path answered 2xx
    Live,
    TimedOut,
    /// Connection refused, DNS failure and the like
    Unreachable(String),
    /// Health path answered with a non-2xx status
    BadStatus(u16),
}

/// A lifecycle engine. Test doubles implement the same trait.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run one step. Timeouts are enforced by the caller by dropping the
    /// returned future.
    async fn invoke(&self, request: &EngineRequest) -> Result<serde_json::Value, EngineError>;

    async fn health_check(&self) -> ProbeOutcome;
}

/// Creates engine handles for registered endpoints.
pub trait EngineConnector: Send + Sync {
    fn connect(&self, endpoint: &Endpoint) -> Arc<dyn Engine>;
}

/// Engine handles per endpoint name, created lazily through the connector and
/// cached for the life of the coordinator.
pub struct EngineDirectory {
    connector: Arc<dyn EngineConnector>,
    engines: RwLock<HashMap<String, Arc<dyn Engine>>>,
}

impl EngineDirectory {
    pub fn new(connector: Arc<dyn EngineConnector>) -> Self {
        Self {
            connector,
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Bind a specific engine to an endpoint name, replacing any cached one.
    pub fn insert(&self, endpoint_name: impl Into<String>, engine: Arc<dyn Engine>) {
        self.engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(endpoint_name.into(), engine);
    }

    pub fn engine_for(&self, endpoint: &Endpoint) -> Arc<dyn Engine> {
        if let Some(engine) = self
            .engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&endpoint.name)
        {
            return engine.clone();
        }

        let mut engines = self.engines.write().unwrap_or_else(PoisonError::into_inner);
        engines
            .entry(endpoint.name.clone())
            .or_insert_with(|| self.connector.connect(endpoint))
            .clone()
    }
}
