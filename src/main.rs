//! framewire: line-oriented TCP services and an interactive shell
//!
//! Two modes:
//! - `serve`: a single-threaded readiness-driven server speaking the
//!   `CODE:MESSAGE` protocol, running the guessing game or echo application
//! - `shell`: an interactive client with pluggable response parsers
//!
//! Configuration via CLI arguments or TOML file.

mod config;
mod protocol;
mod protocols;
mod runtime;
mod shell;

use config::{Config, Mode};
use shell::Shell;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.mode {
        Mode::Serve(settings) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();

            info!(
                host = %settings.host,
                port = settings.port,
                protocol = ?settings.protocol,
                transport = ?settings.transport,
                max_connections = settings.max_connections,
                buffer_size = settings.buffer_size,
                "Starting framewire server"
            );

            runtime::run(&settings)?;
        }
        Mode::Shell(settings) => {
            // stdout belongs to the interactive session
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();

            let stdin = std::io::stdin();
            let mut shell = Shell::new(&settings, stdin.lock(), std::io::stdout())?;
            shell.run()?;
        }
    }

    Ok(())
}
