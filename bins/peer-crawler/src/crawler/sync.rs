use super::engine::CrawlEngine;
use super::geo::GeoResolver;
use crate::config::NetworkConfig;
use chrono::Utc;
use cosmos_peers_db::{AddItemError, PeerDB, PersistedPeer, QueryItemError};
use futures::future::join_all;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("a sync for {0} is already running")]
    InProgress(String),
    #[error("failed counting stored peers: {0}")]
    Count(#[from] QueryItemError),
    #[error("failed storing peer: {0}")]
    Storage(#[from] AddItemError),
}

/// Summary of one network sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub network: String,
    /// Peers discovered by the crawl, duplicates included.
    pub discovered: usize,
    pub unique_ips: usize,
    /// Records written to the db.
    pub stored: usize,
}

/// Crawls a network, geolocates its peers and upserts them into the db.
pub struct SyncCoordinator {
    db: Arc<dyn PeerDB>,
    engine: CrawlEngine,
    geo: GeoResolver,
    in_flight: Mutex<HashSet<String>>,
}

/// Marks a network as syncing until dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    network: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<String>>, network: &str) -> Option<Self> {
        let mut networks = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        networks.insert(network.to_string()).then(|| Self {
            in_flight,
            network: network.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.network);
    }
}

impl SyncCoordinator {
    pub fn new(db: Arc<dyn PeerDB>, engine: CrawlEngine, geo: GeoResolver) -> Self {
        Self {
            db,
            engine,
            geo,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Crawl `network` from `seed_url` and upsert every geolocated peer by `(ip, network)`.
    ///
    /// Fails fast with [`SyncError::InProgress`] if the same network is already syncing.
    pub async fn sync(&self, network: &str, seed_url: &str) -> Result<SyncReport, SyncError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, network)
            .ok_or_else(|| SyncError::InProgress(network.to_string()))?;
        info!("Syncing {} from {}", network, seed_url);

        let peers = self.engine.crawl_from(network, seed_url).await;

        // first non-empty rpc address wins for every ip
        let mut unique_ips = Vec::new();
        let mut rpc_addresses: HashMap<String, Option<String>> = HashMap::new();
        for peer in &peers {
            match rpc_addresses.entry(peer.ip.clone()) {
                Entry::Vacant(entry) => {
                    unique_ips.push(peer.ip.clone());
                    entry.insert(peer.rpc_address.clone());
                }
                Entry::Occupied(mut entry) => {
                    if entry.get().is_none() {
                        entry.insert(peer.rpc_address.clone());
                    }
                }
            }
        }

        let records = self.geo.resolve_batch(&unique_ips).await;
        if records.len() < unique_ips.len() {
            warn!(
                "Only {} of {} ips of {} were geolocated",
                records.len(),
                unique_ips.len(),
                network
            );
        }

        let last_seen = Utc::now().to_string();
        let mut stored = 0;
        for record in records {
            let rpc_address = record
                .rpc_address
                .or_else(|| rpc_addresses.get(&record.ip).cloned().flatten());
            self.db
                .upsert_peer(PersistedPeer {
                    ip: record.ip,
                    network: network.to_string(),
                    rpc_address,
                    country: record.country,
                    isp: record.isp,
                    lat: record.lat,
                    lon: record.lon,
                    last_seen: last_seen.clone(),
                })
                .await?;
            stored += 1;
        }

        info!(
            "Database updated with {} peers for {} ({} discovered, {} unique ips)",
            stored,
            network,
            peers.len(),
            unique_ips.len()
        );
        Ok(SyncReport {
            network: network.to_string(),
            discovered: peers.len(),
            unique_ips: unique_ips.len(),
            stored,
        })
    }

    /// Sync every network whose db is still empty. `Ok(None)` means already populated.
    pub async fn bootstrap(
        &self,
        networks: &[NetworkConfig],
    ) -> Vec<Result<Option<SyncReport>, SyncError>> {
        join_all(networks.iter().map(|network| async move {
            let result = self.populate_if_empty(network).await;
            if let Err(e) = &result {
                error!("Bootstrap of {} failed: {}", network.name, e);
            }
            result
        }))
        .await
    }

    async fn populate_if_empty(
        &self,
        network: &NetworkConfig,
    ) -> Result<Option<SyncReport>, SyncError> {
        let count = self.db.count_peers(network.name.clone()).await?;
        if count > 0 {
            info!(
                "Database already populated with {} records for {}",
                count, network.name
            );
            return Ok(None);
        }
        info!("Database is empty for {}. Populating now...", network.name);
        self.sync(&network.name, &network.seed_url).await.map(Some)
    }

    /// Sync all `networks` concurrently. One failing network does not affect the others.
    pub async fn sync_all(&self, networks: &[NetworkConfig]) -> Vec<Result<SyncReport, SyncError>> {
        join_all(networks.iter().map(|network| async move {
            let result = self.sync(&network.name, &network.seed_url).await;
            if let Err(e) = &result {
                error!("Sync of {} failed: {}", network.name, e);
            }
            result
        }))
        .await
    }
}
