use crate::types::PeerRecord;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Budget for a single net-info request.
pub const NET_INFO_TIMEOUT: Duration = Duration::from_secs(5);

/// Anything able to list the peers a node reports at `url`.
///
/// Implementations never fail: errors are logged and yield an empty list.
#[async_trait]
pub trait PeerSource: Send + Sync {
    async fn fetch_peers(&self, url: &str, network: Option<&str>) -> Vec<PeerRecord>;
}

/// Fetches and parses net-info endpoints over http.
#[derive(Clone, Debug)]
pub struct PeerInfoFetcher {
    client: reqwest::Client,
}

impl PeerInfoFetcher {
    /// Create a fetcher whose requests time out after [`NET_INFO_TIMEOUT`].
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(NET_INFO_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn get_json(&self, url: &str) -> Result<Value, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl PeerSource for PeerInfoFetcher {
    async fn fetch_peers(&self, url: &str, network: Option<&str>) -> Vec<PeerRecord> {
        let body = match self.get_json(url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed fetching peer info from {}: {}", url, e);
                return vec![];
            }
        };

        match parse_net_info(&body, network.is_some_and(is_sei_family)) {
            Some(peers) => {
                debug!("Got {} peers from {}", peers.len(), url);
                peers
            }
            None => {
                warn!("Unrecognized net-info response shape from {}", url);
                vec![]
            }
        }
    }
}

/// Sei nodes answer with their own peer list format.
pub fn is_sei_family(network: &str) -> bool {
    network.to_ascii_lowercase().contains("sei")
}

#[derive(Deserialize)]
struct RawPeer {
    remote_ip: Option<String>,
    addr: Option<String>,
    rpc_address: Option<String>,
    node_info: Option<RawNodeInfo>,
}

#[derive(Deserialize)]
struct RawNodeInfo {
    other: Option<RawNodeOther>,
}

#[derive(Deserialize)]
struct RawNodeOther {
    rpc_address: Option<String>,
}

impl RawPeer {
    fn node_rpc_address(&self) -> Option<String> {
        self.node_info
            .as_ref()
            .and_then(|info| info.other.as_ref())
            .and_then(|other| other.rpc_address.clone())
    }

    /// Plain cosmos `result.peers` entry.
    fn into_cosmos(self) -> Option<PeerRecord> {
        let rpc_address = self.node_rpc_address();
        Some(PeerRecord {
            ip: non_empty(self.remote_ip)?,
            rpc_address,
        })
    }

    /// Top level `peers` entry, with `addr` / `rpc_address` as fallbacks.
    fn into_generic(self) -> Option<PeerRecord> {
        let rpc_address = self.node_rpc_address().or(self.rpc_address);
        Some(PeerRecord {
            ip: non_empty(self.remote_ip).or(non_empty(self.addr))?,
            rpc_address,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn raw_peers(peers: &[Value]) -> impl Iterator<Item = RawPeer> + '_ {
    peers
        .iter()
        .filter_map(|peer| RawPeer::deserialize(peer).ok())
}

/// Normalize a net-info body into peer records.
///
/// Returns `None` when the body matches none of the known shapes.
pub fn parse_net_info(body: &Value, sei_family: bool) -> Option<Vec<PeerRecord>> {
    if sei_family {
        if let Some(entries) = body.as_array() {
            return Some(
                entries
                    .iter()
                    .filter_map(|entry| entry.get("url").and_then(Value::as_str))
                    .filter_map(sei_peer)
                    .collect(),
            );
        }
    }

    if let Some(peers) = body.pointer("/result/peers").and_then(Value::as_array) {
        return Some(raw_peers(peers).filter_map(RawPeer::into_cosmos).collect());
    }

    if let Some(peers) = body.get("peers").and_then(Value::as_array) {
        return Some(raw_peers(peers).filter_map(RawPeer::into_generic).collect());
    }

    None
}

/// Parse a sei `id@host:port` url. The rpc port is the p2p port with its last digit set to 7.
fn sei_peer(url: &str) -> Option<PeerRecord> {
    let address = url.rsplit_once('@').map_or(url, |(_, address)| address);
    let (host, port) = address.rsplit_once(':')?;
    if host.is_empty() || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let rpc_port = format!("{}7", &port[..port.len() - 1]);
    Some(PeerRecord {
        ip: host.to_string(),
        rpc_address: Some(format!("{host}:{rpc_port}")),
    })
}
