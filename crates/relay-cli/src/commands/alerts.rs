//! `relay alerts` — list alerts from the last snapshot, or from a fresh probe
//! cycle when no snapshot is configured.

use relay_core::models::{Alert, AlertSeverity};
use relay_core::snapshot::SnapshotWriter;

use super::{init_coordinator, truncate};

pub async fn list(config_path: Option<&str>, severity: Option<&str>) -> Result<(), String> {
    let severity = match severity {
        Some(s) => Some(AlertSeverity::from_str(s).ok_or_else(|| {
            format!("Unknown severity '{}': expected info, warning or critical", s)
        })?),
        None => None,
    };

    let coordinator = init_coordinator(config_path)?;

    let alerts: Vec<Alert> = match &coordinator.config().snapshot.path {
        Some(path) if path.exists() => {
            let snapshot = SnapshotWriter::new(path)
                .read()
                .await
                .map_err(|e| e.to_string())?;
            println!("Alerts from snapshot {} ({})", path.display(), snapshot.written_at);
            snapshot
                .alerts
                .into_iter()
                .filter(|a| severity.map(|s| a.severity == s).unwrap_or(true))
                .collect()
        }
        _ => {
            coordinator.health().probe_all().await;
            coordinator.get_alerts(severity)
        }
    };

    if alerts.is_empty() {
        println!("No alerts.");
        return Ok(());
    }

    for alert in &alerts {
        println!(
            "{} [{:<8}] {:<24} {}{}",
            alert.created_at.format("%Y-%m-%d %H:%M:%S"),
            alert.severity.as_str(),
            truncate(&alert.subject, 24),
            alert.message,
            if alert.is_resolved() { " (resolved)" } else { "" }
        );
    }
    Ok(())
}
