use eyre::WrapErr;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// Networks crawled when no networks file is given.
pub static DEFAULT_NETWORKS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Akash",
        "Berachain",
        "Canto",
        "Celestia",
        "Dymension",
        "Evmos",
        "Gravity",
        "Injective",
        "Osmosis",
        "Sei",
    ]
});

/// A network and the net-info url its crawl starts from.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: String,
    pub seed_url: String,
}

/// Read networks from a json file of `[{ "name": .., "seed_url": .. }]`.
pub fn load_networks_file(path: &Path) -> eyre::Result<Vec<NetworkConfig>> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed reading networks file {}", path.display()))?;
    let networks: Vec<NetworkConfig> = serde_json::from_str(&content)
        .wrap_err_with(|| format!("invalid networks file {}", path.display()))?;
    Ok(networks)
}

/// Name of the env variable holding the seed node address of `network`, e.g. `AKASH_NODE_IP`.
pub fn node_ip_var(network: &str) -> String {
    format!("{}_NODE_IP", network.to_ascii_uppercase().replace('-', "_"))
}

/// Build the default networks from `<NAME>_NODE_IP` env variables, skipping unset ones.
pub fn networks_from_env(lookup: impl Fn(&str) -> Option<String>) -> Vec<NetworkConfig> {
    DEFAULT_NETWORKS
        .iter()
        .filter_map(|name| {
            let var = node_ip_var(name);
            match lookup(var.as_str()) {
                Some(node) if !node.trim().is_empty() => Some(NetworkConfig {
                    name: name.to_string(),
                    seed_url: format!("http://{}/net_info", node.trim()),
                }),
                _ => {
                    warn!("{} is not set, skipping {}", var, name);
                    None
                }
            }
        })
        .collect()
}

/// Networks from `path` if given, otherwise from the environment.
pub fn load_networks(path: Option<&Path>) -> eyre::Result<Vec<NetworkConfig>> {
    let networks = match path {
        Some(path) => load_networks_file(path)?,
        None => networks_from_env(|var| std::env::var(var).ok()),
    };
    if networks.is_empty() {
        eyre::bail!("no network configured, set a networks file or `<NETWORK>_NODE_IP` variables");
    }
    Ok(networks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn reads_networks_file() {
        let path = std::env::temp_dir().join(format!("networks-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[
                { "name": "Akash", "seed_url": "http://1.2.3.4:26657/net_info" },
                { "name": "Sei", "seed_url": "http://5.6.7.8:26657/net_info" }
            ]"#,
        )
        .unwrap();

        let networks = load_networks(Some(path.as_path())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(networks.len(), 2);
        assert_eq!(networks[1].name, "Sei");
        assert_eq!(networks[0].seed_url, "http://1.2.3.4:26657/net_info");
    }

    #[test]
    fn invalid_networks_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("bad-networks-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "name": "Akash" }"#).unwrap();

        let result = load_networks(Some(path.as_path()));
        std::fs::remove_file(&path).unwrap();

        assert!(result.is_err());
    }

    #[test]
    fn empty_networks_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("no-networks-{}.json", std::process::id()));
        std::fs::write(&path, "[]").unwrap();

        let result = load_networks(Some(path.as_path()));
        std::fs::remove_file(&path).unwrap();

        assert!(result.is_err());
    }

    #[test]
    fn builds_networks_from_env() {
        let env: HashMap<&str, &str> = [
            ("AKASH_NODE_IP", "1.2.3.4:26657"),
            ("OSMOSIS_NODE_IP", " "),
            ("SEI_NODE_IP", "5.6.7.8:26657"),
        ]
        .into_iter()
        .collect();

        let networks = networks_from_env(|var| env.get(var).map(|v| v.to_string()));

        assert_eq!(
            networks,
            vec![
                NetworkConfig {
                    name: "Akash".to_string(),
                    seed_url: "http://1.2.3.4:26657/net_info".to_string(),
                },
                NetworkConfig {
                    name: "Sei".to_string(),
                    seed_url: "http://5.6.7.8:26657/net_info".to_string(),
                },
            ]
        );
    }

    #[test]
    fn env_var_names() {
        assert_eq!(node_ip_var("Akash"), "AKASH_NODE_IP");
        assert_eq!(node_ip_var("sei-testnet"), "SEI_TESTNET_NODE_IP");
    }
}
