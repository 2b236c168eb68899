//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and drives the
//! relay-core `Coordinator`.

pub mod alerts;
pub mod config;
pub mod monitor;
pub mod run;
pub mod status;

use std::path::Path;

use relay_core::{Coordinator, CoordinatorConfig};

pub use relay_core::engine::http::truncate;

/// Config file picked up from the working directory when `--config` is unset.
const DEFAULT_CONFIG_FILE: &str = "relay.yaml";

/// Load the coordinator configuration.
///
/// Order: explicit path, then `./relay.yaml`, then the built-in defaults.
pub fn load_config(path: Option<&str>) -> Result<CoordinatorConfig, String> {
    match path {
        Some(path) => CoordinatorConfig::from_file(path).map_err(|e| e.to_string()),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            CoordinatorConfig::from_file(DEFAULT_CONFIG_FILE).map_err(|e| e.to_string())
        }
        None => {
            tracing::info!(
                "[CLI] No {} found; using built-in configuration",
                DEFAULT_CONFIG_FILE
            );
            Ok(CoordinatorConfig::builtin())
        }
    }
}

/// Build a coordinator from the configuration at `path`.
pub fn init_coordinator(path: Option<&str>) -> Result<Coordinator, String> {
    let config = load_config(path)?;
    Coordinator::from_config(config).map_err(|e| e.to_string())
}

/// Pretty-print a serializable value to stdout as JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}
