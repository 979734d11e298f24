/// A peer as advertised by some node's net-info endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerRecord {
    pub ip: String,
    /// Raw advertised rpc address, may be a wildcard, a loopback or a `tcp://` url.
    pub rpc_address: Option<String>,
}

impl PeerRecord {
    pub fn new(ip: &str, rpc_address: Option<&str>) -> Self {
        Self {
            ip: ip.to_string(),
            rpc_address: rpc_address.map(str::to_string),
        }
    }
}

/// A peer with the location resolved by the geo batch provider.
///
/// Geo fields are `None` when the provider could not resolve the ip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerGeoRecord {
    pub ip: String,
    pub rpc_address: Option<String>,
    pub country: Option<String>,
    pub isp: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
}
