use super::engine::CrawlEngine;
use super::fetcher::PeerInfoFetcher;
use super::geo::GeoResolver;
use super::scheduler::SyncScheduler;
use super::sync::SyncCoordinator;
use super::CrawlerService;
use crate::config::NetworkConfig;
use cosmos_peers_db::PeerDB;
use std::sync::Arc;
use std::time::Duration;

/// Tunables of a crawler.
#[derive(Clone, Debug)]
pub struct CrawlerSettings {
    /// Sibling net-info requests allowed in flight, 1 crawls sequentially.
    pub concurrency: usize,
    pub geo_endpoint: String,
    pub geo_batch_delay: Duration,
    pub refresh_interval: Duration,
}

pub struct CrawlerFactory {
    coordinator: Arc<SyncCoordinator>,
    refresh_interval: Duration,
}

impl CrawlerFactory {
    pub fn new(db: Arc<dyn PeerDB>, settings: &CrawlerSettings) -> eyre::Result<Self> {
        let fetcher = PeerInfoFetcher::new()?;
        let engine = CrawlEngine::new(Arc::new(fetcher), settings.concurrency);
        let geo = GeoResolver::new(settings.geo_endpoint.clone(), settings.geo_batch_delay);

        Ok(Self {
            coordinator: Arc::new(SyncCoordinator::new(db, engine, geo)),
            refresh_interval: settings.refresh_interval,
        })
    }

    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        self.coordinator.clone()
    }

    pub fn make(&self, networks: Vec<NetworkConfig>) -> eyre::Result<CrawlerService> {
        Ok(CrawlerService::new(SyncScheduler::new(
            self.coordinator.clone(),
            networks,
            self.refresh_interval,
        )?))
    }
}
