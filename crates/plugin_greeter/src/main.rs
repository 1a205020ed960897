//! Greeter plugin - main entry point
//!
//! Connects to the host, welcomes players, filters chat and answers
//! `/players`. Exits non-zero when the stream ends without a shutdown.

mod config;
mod greeter;
mod logging;
mod signals;

use anyhow::Result;
use clap::Parser;
use plugin_runtime::{PluginError, StopReason};
use std::time::Instant;
use tracing::{error, info};

use crate::config::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let started = Instant::now();
    let args = Args::parse();

    // Load configuration first (before logging setup)
    let mut config = config::load_config(&args.config).await?;
    config::apply_overrides(&mut config, &args, |key| std::env::var(key).ok());
    config::validate(&config).map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    logging::setup_logging(&config.logging)?;
    info!("Starting greeter plugin {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", args.config.display());

    let runtime = greeter::build_runtime(config.plugin.clone(), config.greeter.clone())?;
    let signal_task = signals::forward_to(runtime.shutdown_handle());

    let outcome = runtime.run().await;
    signal_task.abort();

    match outcome {
        Ok(StopReason::HostShutdown(reason)) => {
            info!("Host shut the plugin down ({}) after {:.2?}", reason, started.elapsed());
            Ok(())
        }
        Ok(StopReason::LocalShutdown) => {
            info!("Stopped after {:.2?}", started.elapsed());
            Ok(())
        }
        Err(PluginError::StreamClosed) => {
            error!("❌ Host closed the stream without a shutdown");
            Err(PluginError::StreamClosed.into())
        }
        Err(e) => {
            error!("❌ Plugin stopped: {}", e);
            Err(e.into())
        }
    }
}
