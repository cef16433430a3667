//! Account service (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ recovery → request id → trace → body limit → checks
//!                          │
//!                          ├── /health
//!                          │
//!                          └── /api/v1/users/* → pipeline
//!                                                  ├─ scanner   (422)
//!                                                  ├─ limiter   (429)
//!                                                  ├─ deadline  (503)
//!                                                  └─ handler → store (SQLite)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use account_service::config::loader::load_config;
use account_service::lifecycle::{bootstrap, signals, Shutdown};
use account_service::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "account-service")]
#[command(about = "User account service", long_about = None)]
struct Args {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "account-service starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_ms = config.timeouts.request_ms,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let bind_address = config.listener.bind_address.clone();
    let server = bootstrap(config, &shutdown).await?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server_shutdown = shutdown.subscribe();
    let mut server_task = tokio::spawn(server.run(listener, server_shutdown));

    tokio::select! {
        _ = signals::wait_for_signal() => {
            shutdown.trigger();
            // A second signal skips the drain.
            tokio::select! {
                result = server_task => result??,
                _ = signals::wait_for_signal() => {
                    tracing::warn!("Second signal received, exiting without draining");
                    return Ok(());
                }
            }
        }
        result = &mut server_task => result??,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
