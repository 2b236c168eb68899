use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cached health of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Degraded engines still take traffic; unknown ones do not.
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub endpoint_name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_until: Option<DateTime<Utc>>,
    /// Probe failure reason, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HealthRecord {
    /// Record for an endpoint that has never been probed.
    pub fn unknown(endpoint_name: &str) -> Self {
        Self {
            endpoint_name: endpoint_name.to_string(),
            status: HealthStatus::Unknown,
            last_checked_at: None,
            latency_ms: None,
            cached_until: None,
            detail: None,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.cached_until.map(|until| now < until).unwrap_or(false)
    }

    /// The record as consumers should see it at `now`: past its TTL the
    /// status reads as `unknown`, while the probe timestamps are kept.
    pub fn effective(&self, now: DateTime<Utc>) -> HealthRecord {
        if self.is_fresh(now) {
            return self.clone();
        }
        HealthRecord {
            status: HealthStatus::Unknown,
            detail: Some("stale".to_string()),
            ..self.clone()
        }
    }
}

/// Fleet-wide health derived from the cached records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    /// `unhealthy` if a critical endpoint is down, `degraded` if anything
    /// else is, `healthy` otherwise
    pub overall: HealthStatus,
    pub critical_path_ok: bool,
}
