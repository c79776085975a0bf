//! Periodic expiry sweep.
//!
//! The sweep is the only actor that cancels stale holds; request paths just
//! filter expired holds out of their reads. Each pass releases expired
//! ledger holds and expires bundles past their window.

use crate::app::Services;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spawn the sweep loop. Flipping the shutdown channel stops it.
pub fn spawn_sweep(
    services: Services,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so startup is quiet
        ticker.tick().await;
        tracing::info!(interval_secs = interval.as_secs(), "Expiry sweep started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let swept = services.ledger.cleanup_expired().await;
                    let bundles = services.expire_stale_bundles().await;
                    if swept > 0 || bundles > 0 {
                        tracing::info!(holds = swept, bundles, "Sweep released stale holds");
                    } else {
                        tracing::debug!("Sweep found nothing to release");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Expiry sweep stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweep_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let services = crate::server::state::test_services();
        let handle = spawn_sweep(services, Duration::from_secs(3600), rx);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweep should stop promptly")
            .unwrap();
    }
}
