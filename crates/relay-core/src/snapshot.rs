//! SnapshotWriter — periodic JSON dump of in-memory coordinator state.
//!
//! The file is replaced atomically: the snapshot is written to a sibling
//! `.tmp` file first and then renamed over the target, so readers never see
//! a half-written document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::alerts::AlertCounts;
use crate::models::{Alert, ExecutionSession, HealthRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub written_at: DateTime<Utc>,
    pub health: BTreeMap<String, HealthRecord>,
    pub alert_counts: AlertCounts,
    pub alerts: Vec<Alert>,
    pub sessions: Vec<ExecutionSession>,
}

#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SnapshotError::Io(format!("Failed to create snapshot dir: {}", e)))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, &json)
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))?;

        tracing::debug!(
            "[Snapshot] Wrote {} session(s), {} alert(s) to {}",
            snapshot.sessions.len(),
            snapshot.alerts.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Write, logging failures instead of returning them.
    pub async fn write_safe(&self, snapshot: &Snapshot) {
        if let Err(e) = self.write(snapshot).await {
            tracing::warn!("[Snapshot] Failed to write {}: {}", self.path.display(), e);
        }
    }

    pub async fn read(&self) -> Result<Snapshot, SnapshotError> {
        let bytes = fs::read(&self.path)
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| SnapshotError::Serialization(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
