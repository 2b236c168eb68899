//! Bounded, auto-expiring alert store.
//!
//! Shared by the health monitor and the fallback manager; every mutation goes
//! through one mutex. Alerts are kept oldest first. When the store is full the
//! oldest resolved alert is evicted, and only if none is resolved the oldest
//! open one.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AlertConfig;
use crate::models::{Alert, AlertSeverity};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    pub open: usize,
    pub resolved: usize,
    pub critical_open: usize,
}

pub struct AlertStore {
    alerts: Mutex<VecDeque<Alert>>,
    capacity: usize,
    max_age: chrono::Duration,
}

impl AlertStore {
    pub fn new(config: &AlertConfig) -> Self {
        Self::with_limits(config.capacity, config.max_age)
    }

    pub fn with_limits(capacity: usize, max_age: Duration) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            max_age: chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn raise(
        &self,
        severity: AlertSeverity,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Alert {
        self.raise_at(severity, subject, message, Utc::now())
    }

    pub fn raise_at(
        &self,
        severity: AlertSeverity,
        subject: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Alert {
        let alert = Alert::new(severity, subject, message, now);
        let mut alerts = self.lock();
        expire(&mut alerts, self.max_age, now);
        alerts.push_back(alert.clone());
        while alerts.len() > self.capacity {
            let evicted = match alerts.iter().position(Alert::is_resolved) {
                Some(idx) => alerts.remove(idx),
                None => alerts.pop_front(),
            };
            if let Some(evicted) = evicted {
                tracing::debug!(
                    "[Alerts] Evicted {} alert {} ({})",
                    evicted.severity,
                    evicted.id,
                    evicted.subject
                );
            }
        }
        drop(alerts);

        match severity {
            AlertSeverity::Critical => tracing::error!(
                "[Alerts] CRITICAL {}: {}",
                alert.subject,
                alert.message
            ),
            AlertSeverity::Warning => {
                tracing::warn!("[Alerts] {}: {}", alert.subject, alert.message)
            }
            AlertSeverity::Info => {
                tracing::info!("[Alerts] {}: {}", alert.subject, alert.message)
            }
        }
        alert
    }

    /// Resolve one alert by id. Returns false if it is unknown or already
    /// resolved.
    pub fn resolve(&self, id: &str) -> bool {
        let now = Utc::now();
        let mut alerts = self.lock();
        match alerts.iter_mut().find(|a| a.id == id && !a.is_resolved()) {
            Some(alert) => {
                alert.resolved_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Resolve every open alert about `subject`. Returns how many changed.
    pub fn resolve_subject(&self, subject: &str) -> usize {
        let now = Utc::now();
        let mut alerts = self.lock();
        let mut resolved = 0;
        for alert in alerts
            .iter_mut()
            .filter(|a| a.subject == subject && !a.is_resolved())
        {
            alert.resolved_at = Some(now);
            resolved += 1;
        }
        if resolved > 0 {
            tracing::info!("[Alerts] Resolved {} alert(s) for {}", resolved, subject);
        }
        resolved
    }

    pub fn has_open(&self, subject: &str) -> bool {
        self.has_open_at(subject, Utc::now())
    }

    /// Whether `subject` has an open alert at `now`, after expiring stale ones.
    pub fn has_open_at(&self, subject: &str, now: DateTime<Utc>) -> bool {
        let mut alerts = self.lock();
        expire(&mut alerts, self.max_age, now);
        alerts
            .iter()
            .any(|a| a.subject == subject && !a.is_resolved())
    }

    /// Auto-resolve alerts that outlived the configured age.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        expire(&mut self.lock(), self.max_age, now)
    }

    /// Alerts oldest first, optionally filtered by severity.
    pub fn list(&self, severity: Option<AlertSeverity>) -> Vec<Alert> {
        self.list_at(severity, Utc::now())
    }

    pub fn list_at(&self, severity: Option<AlertSeverity>, now: DateTime<Utc>) -> Vec<Alert> {
        let mut alerts = self.lock();
        expire(&mut alerts, self.max_age, now);
        alerts
            .iter()
            .filter(|a| severity.map(|s| a.severity == s).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> AlertCounts {
        let alerts = self.lock();
        let mut counts = AlertCounts::default();
        for alert in alerts.iter() {
            if alert.is_resolved() {
                counts.resolved += 1;
            } else {
                counts.open += 1;
                if alert.severity == AlertSeverity::Critical {
                    counts.critical_open += 1;
                }
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Alert>> {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn expire(alerts: &mut VecDeque<Alert>, max_age: chrono::Duration, now: DateTime<Utc>) -> usize {
    let mut expired = 0;
    for alert in alerts.iter_mut().filter(|a| !a.is_resolved()) {
        let deadline = alert
            .created_at
            .checked_add_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if now >= deadline {
            alert.resolved_at = Some(deadline);
            expired += 1;
        }
    }
    expired
}
