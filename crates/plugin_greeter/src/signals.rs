//! Signal handling for graceful plugin shutdown.
//!
//! A termination signal drives the runtime through the same draining path as
//! a host shutdown: queued actions are flushed before the stream closes.

use plugin_runtime::ShutdownHandle;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Waits for SIGINT or SIGTERM (Ctrl+C on Windows).
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("📡 Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("📡 Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("📡 Received Ctrl+C");
    }

    Ok(())
}

/// Spawns a task that asks the runtime to shut down on the first signal.
pub fn forward_to(handle: ShutdownHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => handle.shutdown(),
            Err(e) => error!("❌ Could not install signal handlers: {}", e),
        }
    })
}
