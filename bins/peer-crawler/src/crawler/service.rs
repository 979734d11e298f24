use super::scheduler::SyncScheduler;
use tracing::info;

pub struct CrawlerService {
    scheduler: SyncScheduler,
}

impl CrawlerService {
    pub fn new(scheduler: SyncScheduler) -> Self {
        Self { scheduler }
    }

    /// Keep the networks synced until ctrl-c.
    pub async fn run(mut self) -> eyre::Result<()> {
        info!("start crawling...");
        self.scheduler.start();
        let result = tokio::signal::ctrl_c().await;
        info!("shutting down the crawler...");
        self.scheduler.stop().await;
        result?;
        Ok(())
    }
}
