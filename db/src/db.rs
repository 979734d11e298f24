//! The `PeerDB` trait works as an abstraction over the database.

use crate::types::{AddItemError, PersistedPeer, QueryItemError, ScanTableError};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::{config::Region, Client};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use tokio_postgres::{Client as PostgresClient, NoTls};
use tokio_rusqlite::{params, Connection};
use tokio_stream::StreamExt;
use tracing::error;

const AWS_TABLE: &str = "cosmos-peer-data";

/// The abstraction trait over the database.
///
/// Records are keyed by `(ip, network)`: the same ip may be stored once per network.
#[async_trait]
pub trait PeerDB: Send + Sync {
    /// Insert a peer, or overwrite every field of the record with the same `(ip, network)`.
    async fn upsert_peer(&self, peer: PersistedPeer) -> Result<(), AddItemError>;
    /// Number of peers stored for `network`.
    async fn count_peers(&self, network: String) -> Result<u64, QueryItemError>;
    /// All peers stored for `network`.
    async fn peers_by_network(&self, network: String)
        -> Result<Vec<PersistedPeer>, QueryItemError>;
    /// Distinct network names with at least one stored peer.
    async fn networks(&self) -> Result<Vec<String>, ScanTableError>;
}

/// Aws dynamo database.
///
/// The table uses `network` as partition key and `ip` as sort key, so `put_item` is an upsert.
#[derive(Clone, Debug)]
pub struct AwsPeerDB {
    client: Client,
}

impl AwsPeerDB {
    /// Connect to the dynamo db of the configured (or default) region.
    pub async fn new() -> Self {
        let region_provider =
            RegionProviderChain::default_provider().or_else(Region::new("us-west-2"));
        let shared_config = aws_config::from_env().region(region_provider).load().await;
        let client = Client::new(&shared_config);

        AwsPeerDB { client }
    }
}

fn opt_attr(value: Option<String>) -> AttributeValue {
    match value {
        Some(value) => AttributeValue::S(value),
        None => AttributeValue::Null(true),
    }
}

#[async_trait]
impl PeerDB for AwsPeerDB {
    async fn upsert_peer(&self, peer: PersistedPeer) -> Result<(), AddItemError> {
        self.client
            .put_item()
            .table_name(AWS_TABLE)
            .item("network", AttributeValue::S(peer.network))
            .item("ip", AttributeValue::S(peer.ip))
            .item("rpc_address", opt_attr(peer.rpc_address))
            .item("country", opt_attr(peer.country))
            .item("isp", opt_attr(peer.isp))
            .item("lat", opt_attr(peer.lat))
            .item("lon", opt_attr(peer.lon))
            .item("last_seen", AttributeValue::S(peer.last_seen))
            .send()
            .await?;
        Ok(())
    }

    async fn count_peers(&self, network: String) -> Result<u64, QueryItemError> {
        Ok(self.peers_by_network(network).await?.len() as u64)
    }

    async fn peers_by_network(
        &self,
        network: String,
    ) -> Result<Vec<PersistedPeer>, QueryItemError> {
        let results: Result<Vec<_>, _> = self
            .client
            .query()
            .table_name(AWS_TABLE)
            .key_condition_expression("#network = :network")
            .expression_attribute_names("#network", "network")
            .expression_attribute_values(":network", AttributeValue::S(network))
            .into_paginator()
            .items()
            .send()
            .collect()
            .await;

        match results {
            Ok(peers) => Ok(peers.iter().map(|peer| peer.into()).collect()),
            Err(err) => Err(err.into()),
        }
    }

    async fn networks(&self) -> Result<Vec<String>, ScanTableError> {
        let results: Result<Vec<_>, _> = self
            .client
            .scan()
            .table_name(AWS_TABLE)
            .projection_expression("#network")
            .expression_attribute_names("#network", "network")
            .into_paginator()
            .items()
            .send()
            .collect()
            .await;

        match results {
            Ok(items) => Ok(items
                .iter()
                .filter_map(|item| item.get("network").and_then(|v| v.as_s().ok()).cloned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()),
            Err(err) => Err(err.into()),
        }
    }
}

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS cosmos_peer_data (
    ip TEXT NOT NULL,
    network TEXT NOT NULL,
    rpc_address TEXT,
    country TEXT,
    isp TEXT,
    lat TEXT,
    lon TEXT,
    last_seen TEXT NOT NULL,
    PRIMARY KEY (ip, network)
);";

const SQLITE_UPSERT: &str = "INSERT INTO cosmos_peer_data (ip, network, rpc_address, country, isp, lat, lon, last_seen)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT (ip, network) DO UPDATE
    SET rpc_address = excluded.rpc_address,
        country = excluded.country,
        isp = excluded.isp,
        lat = excluded.lat,
        lon = excluded.lon,
        last_seen = excluded.last_seen";

/// SQLite db.
#[derive(Debug)]
pub struct SqlPeerDB {
    db: Connection,
}

impl SqlPeerDB {
    /// Create a new SQLite db at `path` or connect to an already existing one.
    pub async fn open(path: &str) -> Result<Self, tokio_rusqlite::Error> {
        let db = Connection::open(path).await?;
        Self::init(db).await
    }

    /// Create a SQLite db living only in memory.
    pub async fn in_memory() -> Result<Self, tokio_rusqlite::Error> {
        let db = Connection::open_in_memory().await?;
        Self::init(db).await
    }

    async fn init(db: Connection) -> Result<Self, tokio_rusqlite::Error> {
        db.call(|conn| {
            conn.execute(CREATE_TABLE, [])
                .map_err(|err| err.into())
        })
        .await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl PeerDB for SqlPeerDB {
    async fn upsert_peer(&self, peer: PersistedPeer) -> Result<(), AddItemError> {
        self.db
            .call(move |conn| {
                conn.execute(
                    SQLITE_UPSERT,
                    params!(
                        &peer.ip,
                        &peer.network,
                        &peer.rpc_address,
                        &peer.country,
                        &peer.isp,
                        &peer.lat,
                        &peer.lon,
                        &peer.last_seen,
                    ),
                )
                .map_err(|err| err.into())
            })
            .await
            .map_err(AddItemError::SqlAddItemError)?;
        Ok(())
    }

    async fn count_peers(&self, network: String) -> Result<u64, QueryItemError> {
        let count = self
            .db
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cosmos_peer_data WHERE network = ?1",
                    [network],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
            .map_err(QueryItemError::SqlQueryItemError)?;

        Ok(count as u64)
    }

    async fn peers_by_network(
        &self,
        network: String,
    ) -> Result<Vec<PersistedPeer>, QueryItemError> {
        let peers = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT ip, network, rpc_address, country, isp, lat, lon, last_seen
                    FROM cosmos_peer_data WHERE network = ?1 ORDER BY ip",
                )?;
                let rows = stmt.query_map([network], |row| {
                    Ok(PersistedPeer {
                        ip: row.get(0)?,
                        network: row.get(1)?,
                        rpc_address: row.get(2)?,
                        country: row.get(3)?,
                        isp: row.get(4)?,
                        lat: row.get(5)?,
                        lon: row.get(6)?,
                        last_seen: row.get(7)?,
                    })
                })?;
                let peers = rows.collect::<Result<Vec<PersistedPeer>, _>>()?;
                Ok(peers)
            })
            .await
            .map_err(QueryItemError::SqlQueryItemError)?;

        Ok(peers)
    }

    async fn networks(&self) -> Result<Vec<String>, ScanTableError> {
        let networks = self
            .db
            .call(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT DISTINCT network FROM cosmos_peer_data ORDER BY network")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let networks = rows.collect::<Result<Vec<String>, _>>()?;
                Ok(networks)
            })
            .await
            .map_err(ScanTableError::SqlScanError)?;

        Ok(networks)
    }
}

const POSTGRES_UPSERT: &str = "INSERT INTO cosmos_peer_data (ip, network, rpc_address, country, isp, lat, lon, last_seen)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (ip, network) DO UPDATE
    SET rpc_address = EXCLUDED.rpc_address,
        country = EXCLUDED.country,
        isp = EXCLUDED.isp,
        lat = EXCLUDED.lat,
        lon = EXCLUDED.lon,
        last_seen = EXCLUDED.last_seen";

/// PostgreSQL db.
#[derive(Debug)]
pub struct PostgreSQLPeerDb {
    db: PostgresClient,
}

impl PostgreSQLPeerDb {
    /// Connect to the PostgreSQL db described by the `POSTGRES_USERNAME`, `POSTGRES_PASS`,
    /// `IP_ADDR` and `DB_NAME` env variables, creating the peers table if needed.
    pub async fn new() -> eyre::Result<Self> {
        let postgres_username = std::env::var("POSTGRES_USERNAME")
            .map_err(|_| eyre::eyre!("`POSTGRES_USERNAME` env variable is required"))?;
        let postgres_pass = std::env::var("POSTGRES_PASS")
            .map_err(|_| eyre::eyre!("`POSTGRES_PASS` env variable is required"))?;
        let ip_addr = std::env::var("IP_ADDR")
            .map_err(|_| eyre::eyre!("`IP_ADDR` env variable is required"))?;
        let db_name = std::env::var("DB_NAME")
            .map_err(|_| eyre::eyre!("`DB_NAME` env variable is required"))?;
        let (client, connection) = tokio_postgres::connect(
            &format!(
                "postgresql://{}:{}@{}/{}",
                postgres_username, postgres_pass, ip_addr, db_name
            ),
            NoTls,
        )
        .await?;

        // The connection object performs the actual communication with the database,
        // so spawn it off to run on its own.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres connection error: {}", e);
            }
        });

        client.batch_execute(CREATE_TABLE).await?;

        Ok(Self { db: client })
    }
}

#[async_trait]
impl PeerDB for PostgreSQLPeerDb {
    async fn upsert_peer(&self, peer: PersistedPeer) -> Result<(), AddItemError> {
        self.db
            .execute(
                POSTGRES_UPSERT,
                &[
                    &peer.ip,
                    &peer.network,
                    &peer.rpc_address,
                    &peer.country,
                    &peer.isp,
                    &peer.lat,
                    &peer.lon,
                    &peer.last_seen,
                ],
            )
            .await?;
        Ok(())
    }

    async fn count_peers(&self, network: String) -> Result<u64, QueryItemError> {
        let row = self
            .db
            .query_one(
                "SELECT COUNT(*) FROM cosmos_peer_data WHERE network = $1",
                &[&network],
            )
            .await?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    async fn peers_by_network(
        &self,
        network: String,
    ) -> Result<Vec<PersistedPeer>, QueryItemError> {
        let rows = self
            .db
            .query(
                "SELECT ip, network, rpc_address, country, isp, lat, lon, last_seen
                FROM cosmos_peer_data WHERE network = $1 ORDER BY ip",
                &[&network],
            )
            .await?;

        let peers = rows
            .into_iter()
            .map(|row| PersistedPeer {
                ip: row.get(0),
                network: row.get(1),
                rpc_address: row.get(2),
                country: row.get(3),
                isp: row.get(4),
                lat: row.get(5),
                lon: row.get(6),
                last_seen: row.get(7),
            })
            .collect();

        Ok(peers)
    }

    async fn networks(&self) -> Result<Vec<String>, ScanTableError> {
        let rows = self
            .db
            .query(
                "SELECT DISTINCT network FROM cosmos_peer_data ORDER BY network",
                &[],
            )
            .await?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }
}

/// In-memory db, mostly useful for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryPeerDB {
    peers: RwLock<HashMap<(String, String), PersistedPeer>>,
}

impl InMemoryPeerDB {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PeerDB for InMemoryPeerDB {
    async fn upsert_peer(&self, peer: PersistedPeer) -> Result<(), AddItemError> {
        let key = (peer.network.clone(), peer.ip.clone());
        self.peers.write().await.insert(key, peer);
        Ok(())
    }

    async fn count_peers(&self, network: String) -> Result<u64, QueryItemError> {
        let peers = self.peers.read().await;
        Ok(peers.keys().filter(|(n, _)| *n == network).count() as u64)
    }

    async fn peers_by_network(
        &self,
        network: String,
    ) -> Result<Vec<PersistedPeer>, QueryItemError> {
        let mut peers: Vec<PersistedPeer> = self
            .peers
            .read()
            .await
            .values()
            .filter(|peer| peer.network == network)
            .cloned()
            .collect();
        peers.sort_by(|a, b| a.ip.cmp(&b.ip));
        Ok(peers)
    }

    async fn networks(&self) -> Result<Vec<String>, ScanTableError> {
        let peers = self.peers.read().await;
        Ok(peers
            .keys()
            .map(|(network, _)| network.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }
}
