//! HTTP engine client — invokes lifecycle engines over their declared
//! protocol.
//!
//! POST {base_url}{invoke_path}
//!   body: EngineRequest (JSON)
//!   reply: {"status": "success", "result": ...} | {"status": "error", "error_detail": ...}
//!
//! GET {base_url}{health_path}
//!   any 2xx means live

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Engine, EngineConnector, EngineRequest, EngineResponse, ProbeOutcome};
use crate::error::EngineError;
use crate::models::Endpoint;

/// Calls one engine endpoint via HTTP.
pub struct HttpEngine {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl HttpEngine {
    /// Only connecting is bounded by the client; each call carries its own
    /// deadline so a step timeout longer than the endpoint's still applies.
    pub fn new(endpoint: Endpoint) -> Self {
        let client = build_client(
            reqwest::Client::builder().connect_timeout(endpoint.timeout),
            &endpoint.name,
        );
        Self { endpoint, client }
    }

    fn call_timeout(&self, request: &EngineRequest) -> Duration {
        request.timeout.unwrap_or(self.endpoint.timeout)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Engine for HttpEngine {
    async fn invoke(&self, request: &EngineRequest) -> Result<serde_json::Value, EngineError> {
        let url = self.endpoint.invoke_url();
        tracing::debug!(
            "[HttpEngine] POST {} (session: {}, role: {})",
            url,
            request.session_id,
            request.role
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.call_timeout(request))
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;

        // Engines answer structured errors with a non-2xx code too; a
        // parseable body wins over the status line.
        match serde_json::from_str::<EngineResponse>(&body) {
            Ok(parsed) => parsed.into_result(),
            Err(_) if status.is_server_error() => Err(EngineError::Transport(format!(
                "{} returned {}",
                self.endpoint.name, status
            ))),
            Err(_) if !status.is_success() => Err(EngineError::Rejected(format!(
                "{} returned {}: {}",
                self.endpoint.name,
                status,
                truncate(&body, 200)
            ))),
            Err(e) => Err(EngineError::InvalidResponse(format!(
                "failed to parse response from {}: {}",
                self.endpoint.name, e
            ))),
        }
    }

    async fn health_check(&self) -> ProbeOutcome {
        let probe = self
            .client
            .get(self.endpoint.health_url())
            .timeout(self.endpoint.timeout)
            .send()
            .await;
        match probe {
            Ok(resp) if resp.status().is_success() => ProbeOutcome::Live,
            Ok(resp) => ProbeOutcome::BadStatus(resp.status().as_u16()),
            Err(e) if e.is_timeout() => ProbeOutcome::TimedOut,
            Err(e) if e.is_connect() => ProbeOutcome::Unreachable("connection refused".to_string()),
            Err(e) => ProbeOutcome::Unreachable(e.to_string()),
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::Timeout
    } else {
        EngineError::Transport(e.to_string())
    }
}

/// Build a reqwest client, falling back to the defaults (and saying so) if
/// the configured builder is rejected.
pub(crate) fn build_client(builder: reqwest::ClientBuilder, owner: &str) -> reqwest::Client {
    match builder.build() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(
                "[HttpEngine] Failed to build HTTP client for {}, using defaults without timeouts: {}",
                owner,
                e
            );
            reqwest::Client::new()
        }
    }
}

/// Shorten `s` to at most `max` characters, marking the cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Default connector: one `HttpEngine` per endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl EngineConnector for HttpConnector {
    fn connect(&self, endpoint: &Endpoint) -> Arc<dyn Engine> {
        Arc::new(HttpEngine::new(endpoint.clone()))
    }
}
