// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Binary entry point: parses CLI arguments, loads layered configuration
//! (fenced-config), and either starts the WebSocket gateway (spec.md §6)
//! or prints the effective configuration.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fenced_core::SkillContext;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "fenced", version, about = "Agentic chat runtime whose wire protocol is Markdown")]
struct Cli {
    /// Path to an explicit config file, layered on top of the discovered
    /// search path (fenced-config's `load`).
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket gateway and block until shutdown.
    Serve {
        /// Override `server.bind_address` from the loaded config.
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Print the fully merged, defaulted configuration as YAML.
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = fenced_config::load(cli.config.as_deref())?;
    init_logging(&config.logging.level);

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::ShowConfig => {
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Commands::Serve { bind } => {
            let bind_address = bind
                .map(Ok)
                .unwrap_or_else(|| {
                    config
                        .server
                        .bind_address
                        .parse()
                        .with_context(|| format!("invalid server.bind_address {:?}", config.server.bind_address))
                })?;
            // No skills are registered by default (spec.md §1 names
            // credential-holding skills as an external collaborator); a
            // deployment that needs them constructs its own `SkillContext`
            // and links against `fenced-gateway::router` directly instead
            // of this binary.
            fenced_gateway::serve(bind_address, Arc::new(config), SkillContext::new()).await
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
