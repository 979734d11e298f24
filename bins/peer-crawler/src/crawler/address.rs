use crate::types::PeerRecord;

const WILDCARD_HOST: &str = "0.0.0.0";
const LOOPBACK_HOST: &str = "127.0.0.1";
const TCP_SCHEME: &str = "tcp://";

/// Turn the rpc address a peer advertises into the url of its net-info endpoint.
///
/// - no rpc address: nothing to follow.
/// - wildcard host: the peer's own ip with the advertised port.
/// - loopback host: not reachable from here.
/// - anything else: `host:port` as advertised, without the `tcp://` scheme.
///
/// Malformed addresses resolve to `None`.
pub fn resolve(peer: &PeerRecord) -> Option<String> {
    let rpc_address = peer.rpc_address.as_deref()?.trim();

    if rpc_address.contains(WILDCARD_HOST) {
        if peer.ip.is_empty() {
            return None;
        }
        return Some(net_info_url(&peer.ip, wildcard_port(rpc_address)?));
    }

    if rpc_address.contains(LOOPBACK_HOST) {
        return None;
    }

    let address = rpc_address.strip_prefix(TCP_SCHEME).unwrap_or(rpc_address);
    let (host, port) = address.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    Some(net_info_url(host, port.parse().ok()?))
}

/// The port is the third `:` segment of `tcp://0.0.0.0:port`, or the last one without a scheme.
fn wildcard_port(rpc_address: &str) -> Option<u16> {
    let segments: Vec<&str> = rpc_address.split(':').collect();
    let port = match segments.get(2) {
        Some(port) => *port,
        None if segments.len() == 2 => segments[1],
        None => return None,
    };
    port.parse().ok()
}

fn net_info_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}/net_info")
    } else {
        format!("http://{host}:{port}/net_info")
    }
}
