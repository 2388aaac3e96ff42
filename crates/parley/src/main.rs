// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - operator CLI for the conversation sync core.
//!
//! Validates and prints configuration, and inspects the visitor state file a
//! widget persists between sessions.

mod state;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use parley_config::ParleyConfig;

/// Parley - conversation sync core for embeddable chat widgets.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration and exit.
    Check,
    /// Print the resolved configuration as TOML.
    Show,
    /// Inspect the persisted visitor state.
    State {
        /// Forget the conversation a widget would resume on next open.
        #[arg(long)]
        forget_conversation: bool,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => parley_config::load_and_validate_path(path),
        None => parley_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging.level);

    match cli.command {
        Some(Commands::Check) => {
            println!(
                "parley: config ok (widget.agent_id={})",
                config.widget.agent_id
            );
        }
        Some(Commands::Show) => match toml::to_string_pretty(&config) {
            Ok(rendered) => print!("{rendered}"),
            Err(e) => {
                eprintln!("parley: failed to render config: {e}");
                std::process::exit(1);
            }
        },
        Some(Commands::State {
            forget_conversation,
            json,
        }) => {
            if let Err(e) = run_state(&config, forget_conversation, json).await {
                eprintln!("parley: {e}");
                std::process::exit(1);
            }
        }
        None => {
            println!("parley: use --help for available commands");
        }
    }
}

async fn run_state(
    config: &ParleyConfig,
    forget_conversation: bool,
    json: bool,
) -> Result<(), parley_core::ParleyError> {
    let report = state::inspect(config, forget_conversation).await?;
    if json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| parley_core::ParleyError::Internal(e.to_string()))?;
        println!("{rendered}");
    } else {
        print!("{report}");
    }
    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "parley={log_level},parley_sync={log_level},parley_config={log_level},warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn state_flags_parse() {
        let cli = Cli::parse_from(["parley", "state", "--json", "--config", "p.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("p.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::State {
                forget_conversation: false,
                json: true
            })
        ));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = parley_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.widget.agent_id, "default");
    }
}
