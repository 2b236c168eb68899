//! `relay config` — show, validate and summarize the configuration.

use relay_core::CoordinatorConfig;

use super::load_config;

pub fn show(config_path: Option<&str>, builtin: bool) -> Result<(), String> {
    let config = if builtin {
        CoordinatorConfig::builtin()
    } else {
        load_config(config_path)?
    };
    let yaml = serde_yaml::to_string(&config).map_err(|e| e.to_string())?;
    print!("{}", yaml);
    Ok(())
}

pub fn validate(file: Option<&str>) -> Result<(), String> {
    let file = file.ok_or("No configuration file given (pass a path or --config)")?;
    let config = check_file(file)?;

    println!("✅ Configuration '{}' is valid", file);
    println!("   Endpoints: {}", config.endpoints.len());
    println!("   Workflows: {}", config.workflows.len());
    Ok(())
}

fn check_file(file: &str) -> Result<CoordinatorConfig, String> {
    CoordinatorConfig::from_file(file).map_err(|e| e.to_string())
}

pub fn workflows(config_path: Option<&str>) -> Result<(), String> {
    let config = load_config(config_path)?;
    for wf in &config.workflows {
        println!(
            "{} (min confidence {:.2}, fallback {:.2})",
            wf.workflow_type, wf.min_confidence, wf.fallback_confidence
        );
        for (i, step) in wf.ordered_steps.iter().enumerate() {
            let critical = step.critical.unwrap_or_else(|| {
                config
                    .endpoints
                    .iter()
                    .find(|ep| ep.name == step.endpoint_name())
                    .map(|ep| ep.critical)
                    .unwrap_or(false)
            });
            println!(
                "   {}. {} → {}{}",
                i + 1,
                step.role,
                step.endpoint_name(),
                if critical { " (critical)" } else { "" }
            );
        }
    }
    Ok(())
}
