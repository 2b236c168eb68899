//! Health monitor — periodic liveness probes with a TTL-cached status table.
//!
//! Every cycle fans out one task per registered endpoint; each task writes its
//! own record as soon as its probe finishes, so a slow engine never holds up
//! the others. Consumers read through `status_of` / `is_operational`, which
//! treat records past their TTL as `unknown`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};

use crate::alerts::AlertStore;
use crate::config::HealthConfig;
use crate::engine::{EngineDirectory, ProbeOutcome};
use crate::models::{AlertSeverity, Endpoint, HealthRecord, HealthStatus, HealthSummary};
use crate::registry::EndpointRegistry;

/// Probes registered endpoints and caches their health.
#[derive(Clone)]
pub struct HealthMonitor {
    config: HealthConfig,
    registry: Arc<EndpointRegistry>,
    engines: Arc<EngineDirectory>,
    alerts: Arc<AlertStore>,
    records: Arc<RwLock<HashMap<String, HealthRecord>>>,
    running: Arc<AtomicBool>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl HealthMonitor {
    pub fn new(
        config: HealthConfig,
        registry: Arc<EndpointRegistry>,
        engines: Arc<EngineDirectory>,
        alerts: Arc<AlertStore>,
    ) -> Self {
        Self {
            config,
            registry,
            engines,
            alerts,
            records: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            handle: Arc::new(Mutex::new(None)),
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Current view of one endpoint; `unknown` if never probed or expired.
    pub async fn status_of(&self, name: &str) -> HealthRecord {
        let now = Utc::now();
        self.records
            .read()
            .await
            .get(name)
            .map(|r| r.effective(now))
            .unwrap_or_else(|| HealthRecord::unknown(name))
    }

    /// True only for fresh `healthy` or `degraded` records.
    pub async fn is_operational(&self, name: &str) -> bool {
        self.status_of(name).await.status.is_operational()
    }

    /// Effective records for every registered endpoint.
    pub async fn snapshot(&self) -> BTreeMap<String, HealthRecord> {
        let now = Utc::now();
        let records = self.records.read().await;
        self.registry
            .all()
            .iter()
            .map(|ep| {
                let record = records
                    .get(&ep.name)
                    .map(|r| r.effective(now))
                    .unwrap_or_else(|| HealthRecord::unknown(&ep.name));
                (ep.name.clone(), record)
            })
            .collect()
    }

    pub async fn summary(&self) -> HealthSummary {
        let snapshot = self.snapshot().await;
        let mut summary = HealthSummary {
            total: snapshot.len(),
            healthy: 0,
            degraded: 0,
            unhealthy: 0,
            unknown: 0,
            overall: HealthStatus::Healthy,
            critical_path_ok: true,
        };

        let mut any_down = false;
        for ep in self.registry.all() {
            let status = snapshot
                .get(&ep.name)
                .map(|r| r.status)
                .unwrap_or_default();
            match status {
                HealthStatus::Healthy => summary.healthy += 1,
                HealthStatus::Degraded => summary.degraded += 1,
                HealthStatus::Unhealthy => summary.unhealthy += 1,
                HealthStatus::Unknown => summary.unknown += 1,
            }
            if !status.is_operational() {
                any_down = true;
                if ep.critical {
                    summary.critical_path_ok = false;
                }
            }
        }

        summary.overall = if !summary.critical_path_ok {
            HealthStatus::Unhealthy
        } else if any_down || summary.degraded > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        summary
    }

    // ── Probing ────────────────────────────────────────────────────────

    /// Run one probe cycle over every registered endpoint concurrently.
    pub async fn probe_all(&self) -> Vec<HealthRecord> {
        let mut tasks = JoinSet::new();
        for ep in self.registry.all() {
            let monitor = self.clone();
            tasks.spawn(async move { monitor.probe_endpoint(&ep).await });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(record) => results.push(record),
                Err(e) => tracing::error!("[HealthMonitor] Probe task failed: {}", e),
            }
        }
        results.sort_by(|a, b| a.endpoint_name.cmp(&b.endpoint_name));
        results
    }

    /// Probe a single endpoint and store the result.
    pub async fn probe_endpoint(&self, endpoint: &Endpoint) -> HealthRecord {
        let engine = self.engines.engine_for(endpoint);
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.config.probe_timeout, engine.health_check())
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::TimedOut,
        };
        let latency = started.elapsed();

        let (status, detail) = self.classify(&outcome, latency);
        self.record_probe(endpoint, status, Some(latency), detail, Utc::now())
            .await
    }

    fn classify(&self, outcome: &ProbeOutcome, latency: Duration) -> (HealthStatus, Option<String>) {
        match outcome {
            ProbeOutcome::Live if latency > self.config.degraded_latency => (
                HealthStatus::Degraded,
                Some(format!("slow response ({} ms)", latency.as_millis())),
            ),
            ProbeOutcome::Live => (HealthStatus::Healthy, None),
            ProbeOutcome::TimedOut => (HealthStatus::Degraded, Some("probe timeout".to_string())),
            ProbeOutcome::BadStatus(code) => {
                (HealthStatus::Unhealthy, Some(format!("HTTP {}", code)))
            }
            ProbeOutcome::Unreachable(reason) => (HealthStatus::Unhealthy, Some(reason.clone())),
        }
    }

    /// Store a probe result and raise or resolve alerts on transitions.
    pub async fn record_probe(
        &self,
        endpoint: &Endpoint,
        status: HealthStatus,
        latency: Option<Duration>,
        detail: Option<String>,
        checked_at: DateTime<Utc>,
    ) -> HealthRecord {
        let ttl = chrono::Duration::from_std(self.config.ttl).unwrap_or(chrono::Duration::MAX);
        let record = HealthRecord {
            endpoint_name: endpoint.name.clone(),
            status,
            last_checked_at: Some(checked_at),
            latency_ms: latency.map(|l| l.as_millis() as u64),
            cached_until: Some(
                checked_at
                    .checked_add_signed(ttl)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
            detail,
        };

        let previous = {
            let mut records = self.records.write().await;
            records
                .insert(endpoint.name.clone(), record.clone())
                .map(|r| r.status)
        };

        if previous != Some(status) {
            tracing::info!(
                "[HealthMonitor] {} is now {}{}",
                endpoint.name,
                status,
                record
                    .detail
                    .as_deref()
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default()
            );
        }

        // An outage that outlives its expired alert is raised again.
        let alert_open = self.alerts.has_open_at(&endpoint.name, checked_at);
        if status == HealthStatus::Unhealthy
            && endpoint.critical
            && (previous != Some(HealthStatus::Unhealthy) || !alert_open)
        {
            self.alerts.raise_at(
                AlertSeverity::Critical,
                endpoint.name.clone(),
                format!(
                    "Critical engine {} is unhealthy: {}",
                    endpoint.name,
                    record.detail.as_deref().unwrap_or("probe failed")
                ),
                checked_at,
            );
        } else if status.is_operational() && alert_open {
            self.alerts.resolve_subject(&endpoint.name);
        }

        record
    }

    // ── Background loop ────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the background probe loop. Calling it twice is a no-op.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("[HealthMonitor] Already running");
            return;
        }

        tracing::info!(
            "[HealthMonitor] Starting with {:?} interval, {:?} probe timeout, {:?} ttl",
            self.config.interval,
            self.config.probe_timeout,
            self.config.ttl
        );

        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            while monitor.running.load(Ordering::SeqCst) {
                ticker.tick().await;
                let records = monitor.probe_all().await;
                let down = records
                    .iter()
                    .filter(|r| !r.status.is_operational())
                    .count();
                tracing::debug!(
                    "[HealthMonitor] Cycle complete: {} endpoint(s), {} not operational",
                    records.len(),
                    down
                );
                monitor.alerts.sweep();
            }
            tracing::info!("[HealthMonitor] Stopped");
        });

        *self.handle.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("[HealthMonitor] Stopping");
        }
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }
}
