//! `relay monitor` — keep the health monitor (and snapshots) running in the
//! foreground, printing a summary after every probe interval.

use super::init_coordinator;

pub async fn run(config_path: Option<&str>) -> Result<(), String> {
    let coordinator = init_coordinator(config_path)?;
    let interval = coordinator.config().health.interval;

    coordinator.start().await;
    println!("Monitoring {} engine(s); press Ctrl-C to stop.", coordinator.registry().len());

    let mut ticker = tokio::time::interval(interval);
    // Give the first probe cycle a moment to land before the first report.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let summary = coordinator.health_summary().await;
                let alerts = coordinator.alerts().counts();
                println!(
                    "[{}] overall={} healthy={} degraded={} unhealthy={} unknown={} open_alerts={} (critical {})",
                    chrono::Local::now().format("%H:%M:%S"),
                    summary.overall,
                    summary.healthy,
                    summary.degraded,
                    summary.unhealthy,
                    summary.unknown,
                    alerts.open,
                    alerts.critical_open
                );
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!("[CLI] Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
        }
    }

    coordinator.shutdown().await;
    Ok(())
}
