use super::address;
use super::fetcher::PeerSource;
use crate::types::PeerRecord;
use futures::{stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Net-info urls already dispatched during one crawl.
#[derive(Debug, Default)]
pub struct VisitedSet {
    urls: HashSet<String>,
}

impl VisitedSet {
    /// Mark `url` as visited, returns `false` if it already was.
    pub fn insert(&mut self, url: &str) -> bool {
        if self.urls.contains(url) {
            return false;
        }
        self.urls.insert(url.to_string())
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }
}

/// Follows advertised rpc addresses from peer to peer until no new net-info url shows up.
#[derive(Clone)]
pub struct CrawlEngine {
    source: Arc<dyn PeerSource>,
    /// How many sibling net-info requests may be in flight at once.
    concurrency: usize,
}

impl CrawlEngine {
    pub fn new(source: Arc<dyn PeerSource>, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch the seed node at `seed_url` and crawl everything reachable from its peers.
    pub async fn crawl_from(&self, network: &str, seed_url: &str) -> Vec<PeerRecord> {
        let mut visited = VisitedSet::default();
        visited.insert(seed_url);
        let seeds = self.source.fetch_peers(seed_url, Some(network)).await;
        info!(
            "Seed {} for {} reported {} peers",
            seed_url,
            network,
            seeds.len()
        );
        self.crawl(network, seeds, visited).await
    }

    /// Crawl everything reachable from `seeds`, never dispatching a url already in `visited`.
    ///
    /// The result holds the seeds plus every peer list fetched along the way, duplicates included.
    pub async fn crawl(
        &self,
        network: &str,
        seeds: Vec<PeerRecord>,
        mut visited: VisitedSet,
    ) -> Vec<PeerRecord> {
        let mut discovered = seeds.clone();
        let mut frontier = seeds;
        let mut depth = 0;

        while !frontier.is_empty() {
            // decided on this task only, so a url is never dispatched twice
            let targets: Vec<String> = frontier
                .iter()
                .filter_map(address::resolve)
                .filter(|url| visited.insert(url))
                .collect();
            if targets.is_empty() {
                break;
            }
            depth += 1;
            debug!(
                "Crawling {} net-info urls at depth {} for {}",
                targets.len(),
                depth,
                network
            );

            let fetched: Vec<Vec<PeerRecord>> = stream::iter(targets)
                .map(|url| async move { self.source.fetch_peers(&url, Some(network)).await })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            frontier = fetched.into_iter().flatten().collect();
            discovered.extend(frontier.iter().cloned());
        }

        info!(
            "Crawl of {} done: {} urls visited, {} peers discovered",
            network,
            visited.len(),
            discovered.len()
        );
        discovered
    }
}
