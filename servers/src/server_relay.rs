//! # Broadcast Relay Server
//!
//! Accepts WebSocket clients on `/ws` and rebroadcasts every message any of
//! them sends to all of them, prefixed with the time it was received.
//!
//! ## Execution Flow:
//! 1.  Load `.env` files, then layer defaults, `server_relay.conf` and
//!     environment/CLI settings.
//! 2.  Install console + rotating JSON file logging.
//! 3.  Bind the listening port. This is the only fatal runtime error.
//! 4.  Start the relay (registry + broadcast worker) and serve it until
//!     `CTRL+C` or `SIGTERM`, allowing ten seconds for a graceful stop.

#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_graceful::Shutdown;
use tracing::{error, info, warn};

use lib_common::relay::{Relay, serve};

mod relay_logic;
use relay_logic::{config, logger};

#[tokio::main]
async fn main() -> Result<()> {
    // load .env files before anything reads the environment
    let dotenv_os: &str = if cfg!(target_os = "windows") {
        ".env.windows"
    } else {
        ".env.linux"
    };
    dotenvy::dotenv().ok();
    dotenvy::from_filename(dotenv_os).ok();

    let config = config::load_config(config::Config::parse())?;
    let _log_guard = logger::setup_logging(&config.log_dir(), &config.log_level())?;
    info!("Starting relay with {:?}", config);

    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let (relay, worker) = Relay::start(config.relay_options());

    let shutdown = Shutdown::default();
    shutdown.spawn_task_fn(move |guard| async move {
        let signal_guard = guard.clone();
        let signal = async move {
            signal_guard.cancelled().await;
            info!("Signal received: initiate graceful shutdown");
        };
        if let Err(e) = serve(listener, relay, signal).await {
            error!("Relay server failed: {}", e);
        }
        // in-flight connections count until the server has fully stopped
        drop(guard);
    });

    match shutdown.shutdown_with_limit(Duration::from_secs(10)).await {
        Ok(elapsed) => {
            info!(
                "shutdown: gracefully {}s after shutdown signal received",
                elapsed.as_secs_f64()
            );
        }
        Err(e) => {
            warn!("shutdown: forcefully due to timeout: {}", e);
        }
    }

    worker.abort();
    info!("Bye!");
    Ok(())
}
