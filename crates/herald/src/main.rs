// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Herald - a multi-account messaging coordinator.
//!
//! This is the binary entry point for the Herald coordinator.

mod doctor;
mod run;
mod stats;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use herald_config::HeraldConfig;

/// Herald - a multi-account messaging coordinator.
#[derive(Parser, Debug)]
#[command(name = "herald", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the default locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Authenticate the accounts, build the ledger and deliver it (default).
    Run,
    /// Check worker executables, the ledger and the configuration.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Print ledger statistics without starting any worker.
    Stats,
}

fn load_config(path: Option<&Path>) -> HeraldConfig {
    let loaded = match path {
        Some(path) => herald_config::load_and_validate_path(path),
        None => herald_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            herald_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let config = load_config(cli.config.as_deref());

    let code = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => match run::run_coordinator(config).await {
            Ok(_) => 0,
            Err(e) => {
                eprintln!("herald: {e}");
                1
            }
        },
        Commands::Doctor { plain } => {
            if doctor::run_doctor(&config, cli.config.as_deref(), plain).await {
                0
            } else {
                1
            }
        }
        Commands::Stats => {
            stats::run_stats(&config).await;
            0
        }
    };

    // Exit explicitly: a blocking stdin read would otherwise hold the runtime open.
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcommand_defaults_to_run() {
        let cli = Cli::parse_from(["herald"]);
        assert_eq!(cli.command.unwrap_or(Commands::Run), Commands::Run);
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["herald", "stats", "--config", "/tmp/h.toml"]);
        assert_eq!(cli.command, Some(Commands::Stats));
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/h.toml")));
    }

    #[test]
    fn doctor_accepts_plain() {
        let cli = Cli::parse_from(["herald", "doctor", "--plain"]);
        assert_eq!(cli.command, Some(Commands::Doctor { plain: true }));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = herald_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.accounts.len(), 2);
    }
}
