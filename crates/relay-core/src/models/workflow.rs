//! Workflow definitions — ordered engine roles per classified request type.
//!
//! Definitions are loaded once from the `workflows` section of the config:
//!
//! ```yaml
//! workflows:
//!   - type: web_application
//!     min_confidence: 0.7
//!     fallback_confidence: 0.85
//!     keywords: ["website", "網站", "blog"]
//!     ordered_steps:
//!       - role: requirements
//!         critical: true
//!       - role: architecture
//!         critical: false
//!       - role: coding
//!         endpoint: coding-primary
//!         timeout: 90
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::serde_secs;

/// Lifecycle stage an engine implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineRole {
    Requirements,
    Architecture,
    Coding,
    Testing,
    Release,
    Operations,
}

impl EngineRole {
    pub const ALL: [EngineRole; 6] = [
        EngineRole::Requirements,
        EngineRole::Architecture,
        EngineRole::Coding,
        EngineRole::Testing,
        EngineRole::Release,
        EngineRole::Operations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineRole::Requirements => "requirements",
            EngineRole::Architecture => "architecture",
            EngineRole::Coding => "coding",
            EngineRole::Testing => "testing",
            EngineRole::Release => "release",
            EngineRole::Operations => "operations",
        }
    }
}

impl std::fmt::Display for EngineRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a workflow pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub role: EngineRole,

    /// Endpoint serving this step; defaults to the role name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Whether a failure aborts the session; defaults to the endpoint's flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<bool>,

    /// Overrides the endpoint timeout for this step
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_secs::option"
    )]
    pub timeout: Option<Duration>,
}

impl WorkflowStep {
    pub fn new(role: EngineRole) -> Self {
        Self {
            role,
            endpoint: None,
            critical: None,
            timeout: None,
        }
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = Some(critical);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn endpoint_name(&self) -> &str {
        self.endpoint.as_deref().unwrap_or_else(|| self.role.as_str())
    }
}

/// Static description of a workflow type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(rename = "type")]
    pub workflow_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(alias = "steps")]
    pub ordered_steps: Vec<WorkflowStep>,

    /// Classifier scores below this are treated as no match
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Confidence reported on fallback responses for this workflow
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f64,

    /// Hints for the offline keyword classifier
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

fn default_min_confidence() -> f64 {
    0.7
}

fn default_fallback_confidence() -> f64 {
    0.8
}

impl WorkflowDefinition {
    pub fn new(workflow_type: impl Into<String>, ordered_steps: Vec<WorkflowStep>) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            description: None,
            ordered_steps,
            min_confidence: default_min_confidence(),
            fallback_confidence: default_fallback_confidence(),
            keywords: Vec::new(),
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_fallback_confidence(mut self, fallback_confidence: f64) -> Self {
        self.fallback_confidence = fallback_confidence;
        self
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn accepts(&self, confidence: f64) -> bool {
        confidence >= self.min_confidence
    }
}
