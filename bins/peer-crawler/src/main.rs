mod config;
mod crawler;
mod types;

use clap::{Args, Parser, Subcommand};
use cosmos_peers_db::{append_to_file, connect_db};
use crawler::{CrawlerFactory, CrawlerSettings, GEO_BATCH_ENDPOINT};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(author, version)]
#[command(
    about = "Cosmos peers crawler",
    long_about = "Cosmos peers crawler walks the net-info endpoints of Cosmos chains, starting from one seed node per network.

Every discovered peer is geolocated and stored per network, so the dashboard can show how nodes are spread across countries and ISPs."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Populate empty networks, then keep every network synced
    Crawl(CrawlOpts),
    /// Sync the networks once and exit
    SyncOnce(SyncOnceOpts),
}

#[derive(Args)]
struct StorageOpts {
    #[arg(long)]
    /// Save peers into the SQLite db at this path instead of DynamoDB.
    sql_db: Option<String>,
    #[arg(long, conflicts_with = "sql_db")]
    /// Save peers into PostgreSQL, configured by the `POSTGRES_*`, `IP_ADDR` and `DB_NAME` env variables.
    postgres_db: bool,
}

#[derive(Args)]
struct CrawlerOpts {
    #[arg(long)]
    /// Json file listing `{ "name", "seed_url" }` networks. Defaults to `<NETWORK>_NODE_IP` env variables.
    networks_file: Option<PathBuf>,
    #[arg(long, default_value_t = 1)]
    /// Net-info requests in flight at once during a crawl.
    concurrency: usize,
    #[arg(long, default_value = GEO_BATCH_ENDPOINT)]
    /// Batch geolocation endpoint.
    geo_endpoint: String,
    #[arg(long, default_value_t = 4)]
    /// Seconds to wait between two geolocation batches.
    geo_batch_delay_secs: u64,
}

#[derive(Args)]
struct CrawlOpts {
    #[command(flatten)]
    storage: StorageOpts,
    #[command(flatten)]
    crawler: CrawlerOpts,
    #[arg(long, default_value_t = 12, value_parser = clap::value_parser!(u64).range(1..))]
    /// Hours between two syncs of every network.
    interval_hours: u64,
}

#[derive(Args)]
struct SyncOnceOpts {
    #[command(flatten)]
    storage: StorageOpts,
    #[command(flatten)]
    crawler: CrawlerOpts,
    #[arg(long)]
    /// Only sync this network.
    network: Option<String>,
    #[arg(long)]
    /// Also append the synced peers to this json lines file.
    save_to_json: Option<PathBuf>,
}

impl CrawlerOpts {
    fn settings(&self, refresh_interval: Duration) -> CrawlerSettings {
        CrawlerSettings {
            concurrency: self.concurrency,
            geo_endpoint: self.geo_endpoint.clone(),
            geo_batch_delay: Duration::from_secs(self.geo_batch_delay_secs),
            refresh_interval,
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl(opts) => crawl(opts).await,
        Commands::SyncOnce(opts) => sync_once(opts).await,
    }
}

async fn crawl(opts: CrawlOpts) -> eyre::Result<()> {
    let networks = config::load_networks(opts.crawler.networks_file.as_deref())?;
    let db = connect_db(opts.storage.sql_db.as_deref(), opts.storage.postgres_db).await?;
    let interval_secs = opts
        .interval_hours
        .checked_mul(60 * 60)
        .ok_or_else(|| eyre::eyre!("--interval-hours {} is too large", opts.interval_hours))?;
    let settings = opts.crawler.settings(Duration::from_secs(interval_secs));

    CrawlerFactory::new(db, &settings)?.make(networks)?.run().await
}

async fn sync_once(opts: SyncOnceOpts) -> eyre::Result<()> {
    let mut networks = config::load_networks(opts.crawler.networks_file.as_deref())?;
    if let Some(name) = &opts.network {
        networks.retain(|network| network.name.eq_ignore_ascii_case(name));
        if networks.is_empty() {
            eyre::bail!("network {} is not configured", name);
        }
    }
    let db = connect_db(opts.storage.sql_db.as_deref(), opts.storage.postgres_db).await?;
    let settings = opts.crawler.settings(Duration::ZERO);
    let coordinator = CrawlerFactory::new(db.clone(), &settings)?.coordinator();

    let mut failures = 0;
    for (network, result) in networks.iter().zip(coordinator.sync_all(&networks).await) {
        match result {
            Ok(report) => info!(
                "{}: {} peers stored out of {} unique ips",
                network.name, report.stored, report.unique_ips
            ),
            Err(_) => failures += 1,
        }
        if let Some(path) = &opts.save_to_json {
            let peers = db.peers_by_network(network.name.clone()).await?;
            append_to_file(path, &peers).await?;
        }
    }

    if failures > 0 {
        eyre::bail!("{} of {} networks failed to sync", failures, networks.len());
    }
    Ok(())
}
