use super::sync::SyncCoordinator;
use crate::config::NetworkConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// How often every network is crawled again.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

/// Populates empty networks on start, then re-syncs every network on a fixed interval.
pub struct SyncScheduler {
    coordinator: Arc<SyncCoordinator>,
    networks: Arc<Vec<NetworkConfig>>,
    interval: Duration,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Fails if `interval` is zero.
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        networks: Vec<NetworkConfig>,
        interval: Duration,
    ) -> eyre::Result<Self> {
        eyre::ensure!(!interval.is_zero(), "refresh interval must be non-zero");
        Ok(Self {
            coordinator,
            networks: Arc::new(networks),
            interval,
            shutdown: None,
            task: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Spawn the scheduling task. Does nothing if already started.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("sync scheduler already started");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let coordinator = self.coordinator.clone();
        let networks = self.networks.clone();
        let period = self.interval;

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = coordinator.bootstrap(&networks) => {}
                _ = shutdown_rx.changed() => return,
            }

            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        info!("Updating database with the latest peer information...");
                        tokio::select! {
                            _ = coordinator.sync_all(&networks) => {}
                            _ = shutdown_rx.changed() => break,
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("sync scheduler stopped");
        });

        info!(
            "sync scheduler started for {} networks, refreshing every {:?}",
            self.networks.len(),
            self.interval
        );
        self.shutdown = Some(shutdown_tx);
        self.task = Some(task);
    }

    /// Signal the scheduling task to stop and wait for it. A sync in progress is abandoned.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("sync scheduler task failed: {}", e);
            }
        }
    }
}
