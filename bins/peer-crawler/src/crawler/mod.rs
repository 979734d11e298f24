mod address;
mod engine;
mod factory;
mod fetcher;
mod geo;
mod scheduler;
mod service;
mod sync;

pub use self::factory::{CrawlerFactory, CrawlerSettings};
pub use self::geo::GEO_BATCH_ENDPOINT;
pub use self::service::CrawlerService;
