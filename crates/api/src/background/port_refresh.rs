//! Periodic rescan of the dynamic port range.
//!
//! Each tick rebuilds the free/used lists and drops ports that are no longer
//! bound from the persisted state. Scans bind sockets, so the work runs on the
//! blocking pool.

use std::sync::Arc;
use std::time::Duration;

use smartcam_core::port_manager::PortManager;
use tokio_util::sync::CancellationToken;

/// Run the port refresh loop until `cancel` is triggered.
pub async fn run(port_manager: Arc<PortManager>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Port refresh job started");

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately and startup already scanned.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Port refresh job stopping");
                break;
            }
            _ = ticker.tick() => {
                let manager = Arc::clone(&port_manager);
                match tokio::task::spawn_blocking(move || manager.refresh()).await {
                    Ok(Ok(())) => tracing::debug!("Port refresh complete"),
                    Ok(Err(e)) => tracing::error!(error = %e, "Port refresh failed"),
                    Err(e) => tracing::error!(error = %e, "Port refresh task panicked"),
                }
            }
        }
    }
}
