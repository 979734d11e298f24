pub mod db;
pub mod types;

use std::path::Path;
use std::sync::Arc;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::info;

// Re-exports
pub use db::{AwsPeerDB, InMemoryPeerDB, PeerDB, PostgreSQLPeerDb, SqlPeerDB};
pub use types::{AddItemError, PersistedPeer, QueryItemError, ScanTableError};

/// Open the SQLite db at `sql_db` if given, PostgreSQL if `postgres_db`, DynamoDB otherwise.
pub async fn connect_db(sql_db: Option<&str>, postgres_db: bool) -> eyre::Result<Arc<dyn PeerDB>> {
    if let Some(path) = sql_db {
        info!("using SQLite db at {}", path);
        return Ok(Arc::new(SqlPeerDB::open(path).await?));
    }
    if postgres_db {
        info!("using PostgreSQL db");
        return Ok(Arc::new(PostgreSQLPeerDb::new().await?));
    }
    info!("using DynamoDB");
    Ok(Arc::new(AwsPeerDB::new().await))
}

/// Helper function to append peers to a file, one json object per line.
pub async fn append_to_file(path: impl AsRef<Path>, peers: &[PersistedPeer]) -> eyre::Result<()> {
    let mut json = String::new();
    for peer in peers {
        json += &(serde_json::to_string(peer)? + "\n");
    }
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await?;
    file.write_all(json.as_bytes()).await?;
    Ok(())
}
