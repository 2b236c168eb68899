//! Coordinator configuration — loaded once at startup, immutable afterwards.
//!
//! ```yaml
//! endpoints:
//!   - name: requirements
//!     host: "${REQUIREMENTS_HOST:-localhost}"
//!     port: 8001
//!     critical: true
//! workflows:
//!   - type: bug_fix
//!     ordered_steps:
//!       - role: coding
//!       - role: testing
//! health:
//!   interval: 30
//!   probe_timeout: 5
//!   ttl: 60
//! pipeline:
//!   max_retries: 3
//!   backoff_base: 1
//! alerts:
//!   capacity: 100
//!   max_age: 86400
//! fallback:
//!   default_confidence: 0.75
//! ```
//!
//! Durations are written in seconds; fractions are allowed. `${VAR}` and
//! `${VAR:-default}` references are expanded before parsing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::{EngineRole, Endpoint, WorkflowDefinition, WorkflowStep};

/// Serde helpers for durations written as (fractional) seconds.
pub mod serde_secs {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        from_secs(secs).map_err(D::Error::custom)
    }

    pub(crate) fn from_secs(secs: f64) -> Result<Duration, String> {
        Duration::try_from_secs_f64(secs)
            .map_err(|e| format!("invalid duration: {} seconds ({})", secs, e))
    }

    pub mod option {
        use std::time::Duration;

        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&d.as_secs_f64()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            match Option::<f64>::deserialize(deserializer)? {
                Some(secs) => super::from_secs(secs).map(Some).map_err(D::Error::custom),
                None => Ok(None),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Time between probe cycles
    #[serde(with = "serde_secs")]
    pub interval: Duration,
    #[serde(with = "serde_secs")]
    pub probe_timeout: Duration,
    /// How long a probe result stays usable
    #[serde(with = "serde_secs")]
    pub ttl: Duration,
    /// Successful probes slower than this report `degraded`
    #[serde(with = "serde_secs")]
    pub degraded_latency: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            ttl: Duration::from_secs(60),
            degraded_latency: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    #[serde(with = "serde_secs")]
    pub backoff_base: Duration,
    #[serde(with = "serde_secs")]
    pub backoff_max: Duration,
    /// Added to the computed step budget to form the session deadline
    #[serde(with = "serde_secs")]
    pub session_timeout_margin: Duration,
    /// Fixed session deadline; computed from step timeouts when unset
    #[serde(with = "serde_secs::option", skip_serializing_if = "Option::is_none")]
    pub session_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            session_timeout_margin: Duration::from_secs(10),
            session_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub capacity: usize,
    /// Open alerts older than this are resolved automatically
    #[serde(with = "serde_secs")]
    pub max_age: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Confidence reported when no workflow matched at all
    pub default_confidence: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            default_confidence: 0.75,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Remote classification service; the keyword classifier is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(with = "serde_secs")]
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Finished sessions kept for status queries
    pub retained: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { retained: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(with = "serde_secs")]
    pub interval: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: None,
            interval: Duration::from_secs(300),
        }
    }
}

/// Everything the coordinator needs, passed by `Arc` into each component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub endpoints: Vec<Endpoint>,
    pub workflows: Vec<WorkflowDefinition>,
    pub health: HealthConfig,
    pub pipeline: PipelineConfig,
    pub alerts: AlertConfig,
    pub fallback: FallbackConfig,
    pub classifier: ClassifierConfig,
    pub sessions: SessionConfig,
    pub snapshot: SnapshotConfig,
}

impl CoordinatorConfig {
    /// Parse and validate a configuration from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = resolve_env_vars(yaml);
        let config: CoordinatorConfig = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// The six lifecycle engines on localhost and the stock workflows.
    pub fn builtin() -> Self {
        let endpoints = vec![
            Endpoint::new("requirements", "localhost", 8001).critical(true),
            Endpoint::new("architecture", "localhost", 8002),
            Endpoint::new("coding", "localhost", 8003)
                .critical(true)
                .with_timeout(Duration::from_secs(90)),
            Endpoint::new("testing", "localhost", 8004),
            Endpoint::new("release", "localhost", 8005).critical(true),
            Endpoint::new("operations", "localhost", 8006),
        ];

        let workflows = vec![
            WorkflowDefinition::new(
                "web_application",
                vec![
                    WorkflowStep::new(EngineRole::Requirements),
                    WorkflowStep::new(EngineRole::Architecture).critical(false),
                    WorkflowStep::new(EngineRole::Coding),
                ],
            )
            .with_fallback_confidence(0.85)
            .with_keywords(&[
                "website", "web app", "web application", "blog", "frontend", "網站", "網頁",
                "部落格", "博客", "网站",
            ]),
            WorkflowDefinition::new(
                "api_service",
                vec![
                    WorkflowStep::new(EngineRole::Requirements),
                    WorkflowStep::new(EngineRole::Architecture).critical(false),
                    WorkflowStep::new(EngineRole::Coding),
                    WorkflowStep::new(EngineRole::Testing).critical(false),
                ],
            )
            .with_keywords(&["api", "rest", "endpoint", "backend", "microservice", "後端", "接口"]),
            WorkflowDefinition::new(
                "bug_fix",
                vec![
                    WorkflowStep::new(EngineRole::Coding),
                    WorkflowStep::new(EngineRole::Testing).critical(true),
                ],
            )
            .with_min_confidence(0.6)
            .with_keywords(&["bug", "fix", "crash", "error", "修復", "修复", "錯誤"]),
            WorkflowDefinition::new(
                "release",
                vec![
                    WorkflowStep::new(EngineRole::Testing).critical(true),
                    WorkflowStep::new(EngineRole::Release),
                    WorkflowStep::new(EngineRole::Operations).critical(false),
                ],
            )
            .with_min_confidence(0.8)
            .with_fallback_confidence(0.75)
            .with_keywords(&["deploy", "release", "ship", "rollout", "部署", "發布", "发布"]),
            WorkflowDefinition::new(
                "full_lifecycle",
                EngineRole::ALL.iter().map(|role| WorkflowStep::new(*role)).collect(),
            )
            .with_min_confidence(0.75)
            .with_fallback_confidence(0.75)
            .with_keywords(&["end-to-end", "full lifecycle", "from scratch", "完整", "全流程"]),
        ];

        Self {
            endpoints,
            workflows,
            ..Self::default()
        }
    }

    /// Reject configurations the coordinator cannot run safely.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for ep in &self.endpoints {
            if ep.name.trim().is_empty() {
                return Err(invalid("endpoint with empty name"));
            }
            if !names.insert(ep.name.as_str()) {
                return Err(invalid(format!("duplicate endpoint '{}'", ep.name)));
            }
            if ep.timeout.is_zero() {
                return Err(invalid(format!("endpoint '{}' has a zero timeout", ep.name)));
            }
        }

        let mut types = HashSet::new();
        for wf in &self.workflows {
            if !types.insert(wf.workflow_type.as_str()) {
                return Err(invalid(format!("duplicate workflow '{}'", wf.workflow_type)));
            }
            if wf.ordered_steps.is_empty() {
                return Err(invalid(format!("workflow '{}' has no steps", wf.workflow_type)));
            }
            check_unit_interval(&wf.workflow_type, "min_confidence", wf.min_confidence)?;
            check_unit_interval(&wf.workflow_type, "fallback_confidence", wf.fallback_confidence)?;
            for step in &wf.ordered_steps {
                if !names.contains(step.endpoint_name()) {
                    return Err(invalid(format!(
                        "workflow '{}' step '{}' references unknown endpoint '{}'",
                        wf.workflow_type,
                        step.role,
                        step.endpoint_name()
                    )));
                }
            }
        }

        check_unit_interval("fallback", "default_confidence", self.fallback.default_confidence)?;
        if self.health.interval.is_zero() || self.health.ttl.is_zero() {
            return Err(invalid("health interval and ttl must be positive"));
        }
        if self.health.probe_timeout.is_zero() {
            return Err(invalid("health probe_timeout must be positive"));
        }
        if self.alerts.capacity == 0 {
            return Err(invalid("alerts capacity must be at least 1"));
        }
        if self.sessions.retained == 0 {
            return Err(invalid("sessions retained must be at least 1"));
        }
        Ok(())
    }

    pub fn workflow(&self, workflow_type: &str) -> Option<&WorkflowDefinition> {
        self.workflows.iter().find(|w| w.workflow_type == workflow_type)
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

fn check_unit_interval(owner: &str, field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!(
            "{}.{} must be within [0, 1], got {}",
            owner, field, value
        )))
    }
}

/// Expand `${VAR}` and `${VAR:-default}` references from the environment.
/// Unset variables without a default are left untouched.
pub fn resolve_env_vars(input: &str) -> String {
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let var_expr = &caps[1];
        if let Some(idx) = var_expr.find(":-") {
            let var_name = &var_expr[..idx];
            let default_val = &var_expr[idx + 2..];
            std::env::var(var_name).unwrap_or_else(|_| default_val.to_string())
        } else {
            std::env::var(var_expr).unwrap_or_else(|_| format!("${{{}}}", var_expr))
        }
    })
    .to_string()
}
