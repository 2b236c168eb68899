//! `relay status` — probe every engine once and show the health table.

use super::{init_coordinator, print_json, truncate};

pub async fn run(config_path: Option<&str>, json: bool) -> Result<(), String> {
    let coordinator = init_coordinator(config_path)?;
    coordinator.health().probe_all().await;

    let status = coordinator.get_engine_status().await;
    let summary = coordinator.health_summary().await;

    if json {
        return print_json(&serde_json::json!({
            "engines": status,
            "summary": summary,
        }));
    }

    println!("┌──────────────────┬───────────┬──────────┬──────────┬──────────────────────────┐");
    println!("│ Engine           │ Status    │ Latency  │ Critical │ Detail                   │");
    println!("├──────────────────┼───────────┼──────────┼──────────┼──────────────────────────┤");
    for endpoint in coordinator.registry().all() {
        let Some(record) = status.get(&endpoint.name) else {
            continue;
        };
        println!(
            "│ {:<16} │ {:<9} │ {:<8} │ {:<8} │ {:<24} │",
            truncate(&endpoint.name, 16),
            record.status.as_str(),
            record
                .latency_ms
                .map(|ms| format!("{} ms", ms))
                .unwrap_or_else(|| "-".to_string()),
            if endpoint.critical { "yes" } else { "no" },
            truncate(record.detail.as_deref().unwrap_or(""), 24)
        );
    }
    println!("└──────────────────┴───────────┴──────────┴──────────┴──────────────────────────┘");
    println!(
        "Overall: {} ({} healthy, {} degraded, {} unhealthy, {} unknown; critical path {})",
        summary.overall,
        summary.healthy,
        summary.degraded,
        summary.unhealthy,
        summary.unknown,
        if summary.critical_path_ok { "ok" } else { "DOWN" }
    );
    Ok(())
}
