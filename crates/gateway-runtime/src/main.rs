//! # Wraith Gateway Runtime
//!
//! Entry point for the gateway server.
//!
//! ## Startup Sequence
//!
//! 1. Install logging (`RUST_LOG`, default `info`)
//! 2. Load configuration (file, then `WRAITH_*` environment)
//! 3. Register protocol modules
//! 4. Seed settings and manager accounts into the state store
//! 5. Serve until Ctrl+C
//!
//! ## Operator Helpers
//!
//! - `hash-password` prints the Argon2 PHC string for a manager account
//! - `obfuscate` prints the autoconf body for a username and password

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wraith_gateway::{
    hash_password, obfuscate, register_baseline, EnvelopeCipher, GatewayService,
    InMemoryStateStore, ProtocolRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "gateway-runtime")]
#[command(about = "Inbound gateway for wraith agents and manager consoles")]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gateway (default)
    Serve {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the Argon2 PHC hash of a manager password
    HashPassword {
        password: String,
    },
    /// Print the autoconf request body for a manager login
    Obfuscate {
        username: String,
        password: String,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let config = config::load_config(config_path.as_deref())?;

    let mut protocols = ProtocolRegistry::new();
    register_baseline(&mut protocols).context("registering baseline protocol")?;

    let service = GatewayService::new(
        config,
        Arc::new(InMemoryStateStore::new()),
        Arc::new(EnvelopeCipher),
        protocols,
    )?;

    service.run(shutdown_on(tokio::signal::ctrl_c())).await?;
    Ok(())
}

/// Resolves once `signal` fires, or never if the signal handler failed.
async fn shutdown_on<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "failed to install signal handler, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    match args.command.unwrap_or(Command::Serve { config: None }) {
        Command::Serve { config } => serve(config).await,
        Command::HashPassword { password } => {
            println!("{}", hash_password(&password)?);
            Ok(())
        }
        Command::Obfuscate { username, password } => {
            println!("{}", obfuscate(&EnvelopeCipher, &username, &password)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_resolves_shutdown() {
        let fired = async { Ok::<(), std::io::Error>(()) };
        let done = tokio::time::timeout(Duration::from_secs(1), shutdown_on(fired)).await;
        assert!(done.is_ok());
    }

    #[tokio::test]
    async fn test_failed_signal_handler_keeps_serving() {
        let failed = async { Err::<(), _>(std::io::Error::other("no signal support")) };
        let done = tokio::time::timeout(Duration::from_millis(50), shutdown_on(failed)).await;
        assert!(done.is_err());
    }
}
