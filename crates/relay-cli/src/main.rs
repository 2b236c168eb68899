//! Relay CLI — submit requests to the lifecycle engine fleet and inspect its
//! health.
//!
//! Every command builds the same `relay_core::Coordinator` from the YAML
//! configuration, so what the CLI reports is exactly what an embedded
//! coordinator would see.

mod commands;

use clap::{Parser, Subcommand};

/// Relay — orchestration and health routing for lifecycle engines
#[derive(Parser)]
#[command(name = "relay", version, about = "Relay — orchestration and health routing for lifecycle engines")]
pub struct Cli {
    /// Path to the coordinator YAML configuration (defaults to ./relay.yaml,
    /// then the built-in configuration)
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<String>,

    /// Quick prompt mode: route and run a single request.
    /// Example: relay -p "我想開發一個個人部落格網站"
    #[arg(short = 'p', long = "prompt")]
    prompt: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a request to a workflow and run it across the engines
    Run {
        /// The natural-language request
        request: String,
        /// Extra context passed to the classifier and every engine (JSON)
        #[arg(long, default_value = "{}")]
        context: String,
        /// Skip the health probe before running (all engines read as unknown)
        #[arg(long)]
        no_probe: bool,
    },

    /// Probe every engine once and print its health
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List alerts, oldest first
    Alerts {
        /// Only show alerts of this severity: info, warning or critical
        #[arg(long)]
        severity: Option<String>,
    },

    /// Inspect the coordinator configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run the health monitor in the foreground until interrupted
    Monitor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as YAML
    Show {
        /// Print the built-in defaults instead of the loaded file
        #[arg(long)]
        builtin: bool,
    },
    /// Validate a configuration file without starting anything
    Validate {
        /// Path to the YAML file (defaults to --config)
        file: Option<String>,
    },
    /// List configured workflows and their steps
    Workflows,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_core=info,relay_cli=info".into()),
        )
        .init();

    let config_path = cli.config.as_deref();

    let result = if let Some(prompt_text) = cli.prompt {
        commands::run::run(config_path, &prompt_text, "{}", false).await
    } else if let Some(command) = cli.command {
        match command {
            Commands::Run {
                request,
                context,
                no_probe,
            } => commands::run::run(config_path, &request, &context, no_probe).await,

            Commands::Status { json } => commands::status::run(config_path, json).await,

            Commands::Alerts { severity } => {
                commands::alerts::list(config_path, severity.as_deref()).await
            }

            Commands::Config { action } => match action {
                ConfigAction::Show { builtin } => commands::config::show(config_path, builtin),
                ConfigAction::Validate { file } => {
                    commands::config::validate(file.as_deref().or(config_path))
                }
                ConfigAction::Workflows => commands::config::workflows(config_path),
            },

            Commands::Monitor => commands::monitor::run(config_path).await,
        }
    } else {
        // No prompt and no subcommand — show help
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        println!();
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
