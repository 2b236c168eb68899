//! `relay run` — route one request and run its workflow.

use relay_core::models::{SessionStatus, StepOutcome};
use relay_core::ProcessResponse;

use super::{init_coordinator, print_json, truncate};

pub async fn run(
    config_path: Option<&str>,
    request: &str,
    context: &str,
    no_probe: bool,
) -> Result<(), String> {
    let context: serde_json::Value =
        serde_json::from_str(context).map_err(|e| format!("Invalid --context JSON: {}", e))?;

    let coordinator = init_coordinator(config_path)?;
    if !no_probe {
        coordinator.health().probe_all().await;
    }

    let response = coordinator.process_request(request, context).await;
    print_summary(&response);
    println!();
    print_json(&response)?;

    match response.status {
        SessionStatus::Failed => Err(format!(
            "Session {} failed: {}",
            response.session_id,
            response
                .failure_reason
                .map(|r| r.as_str())
                .unwrap_or("unknown")
        )),
        _ => Ok(()),
    }
}

fn print_summary(response: &ProcessResponse) {
    println!("Session  : {}", response.session_id);
    println!(
        "Workflow : {}",
        response.workflow_type.as_deref().unwrap_or("-")
    );
    println!("Status   : {}", response.status);
    if let Some(confidence) = response.confidence {
        println!("Confidence: {:.2}", confidence);
    }

    for (i, step) in response.steps.iter().enumerate() {
        let mark = match step.outcome {
            StepOutcome::Success => "ok",
            StepOutcome::Timeout => "timeout",
            StepOutcome::Error => "error",
        };
        println!(
            "  {}. {:<13} {:<8} attempts={} {}ms{}",
            i + 1,
            step.engine_role.as_str(),
            mark,
            step.attempt_count,
            step.duration_ms,
            step.error_detail
                .as_deref()
                .map(|d| format!("  ({})", truncate(d, 60)))
                .unwrap_or_default()
        );
    }

    if let Some(fallback) = &response.fallback {
        println!("Fallback : {} ({:.2})", fallback.reason, fallback.confidence);
        println!("           {}", fallback.message);
    }
}
