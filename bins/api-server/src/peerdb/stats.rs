//! Aggregations backing the dashboard's country and isp views.

use cosmos_peers_db::PersistedPeer;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const UNKNOWN: &str = "Unknown";

/// Peers of one country, split by isp.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub(crate) struct CountryStats {
    pub country: String,
    pub total_ips: usize,
    pub isps: BTreeMap<String, usize>,
}

/// Number of peers hosted by one isp.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub(crate) struct IspStats {
    pub name: String,
    pub total_ips: usize,
}

fn label(value: &Option<String>) -> String {
    match value.as_deref() {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Countries sorted by peer count, largest first.
pub(crate) fn group_by_country(peers: &[PersistedPeer]) -> Vec<CountryStats> {
    let mut countries: HashMap<String, CountryStats> = HashMap::new();
    for peer in peers {
        let country = label(&peer.country);
        let stats = countries
            .entry(country.clone())
            .or_insert_with(|| CountryStats {
                country,
                total_ips: 0,
                isps: BTreeMap::new(),
            });
        stats.total_ips += 1;
        *stats.isps.entry(label(&peer.isp)).or_default() += 1;
    }

    let mut countries: Vec<CountryStats> = countries.into_values().collect();
    countries.sort_by(|a, b| {
        b.total_ips
            .cmp(&a.total_ips)
            .then_with(|| a.country.cmp(&b.country))
    });
    countries
}

/// Isps sorted by peer count, largest first.
pub(crate) fn group_by_isp(peers: &[PersistedPeer]) -> Vec<IspStats> {
    let mut isps: HashMap<String, usize> = HashMap::new();
    for peer in peers {
        *isps.entry(label(&peer.isp)).or_default() += 1;
    }

    let mut isps: Vec<IspStats> = isps
        .into_iter()
        .map(|(name, total_ips)| IspStats { name, total_ips })
        .collect();
    isps.sort_by(|a, b| b.total_ips.cmp(&a.total_ips).then_with(|| a.name.cmp(&b.name)));
    isps
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn peer(ip: &str, country: Option<&str>, isp: Option<&str>) -> PersistedPeer {
        PersistedPeer {
            ip: ip.to_string(),
            network: "Akash".to_string(),
            rpc_address: None,
            country: country.map(str::to_string),
            isp: isp.map(str::to_string),
            lat: None,
            lon: None,
            last_seen: "2024-01-01 00:00:00 UTC".to_string(),
        }
    }

    fn sample() -> Vec<PersistedPeer> {
        vec![
            peer("1.1.1.1", Some("Germany"), Some("Hetzner Online GmbH")),
            peer("2.2.2.2", Some("Germany"), Some("Hetzner Online GmbH")),
            peer("3.3.3.3", Some("Germany"), Some("Contabo GmbH")),
            peer("4.4.4.4", Some("United States"), Some("Amazon.com")),
            peer("5.5.5.5", None, Some("")),
        ]
    }

    #[test]
    fn groups_countries_by_isp() {
        let countries = group_by_country(&sample());

        assert_eq!(countries.len(), 3);
        assert_eq!(countries[0].country, "Germany");
        assert_eq!(countries[0].total_ips, 3);
        assert_eq!(countries[0].isps["Hetzner Online GmbH"], 2);
        assert_eq!(countries[0].isps["Contabo GmbH"], 1);
        // ties are ordered by name
        assert_eq!(countries[1].country, "United States");
        assert_eq!(countries[2].country, UNKNOWN);
        assert_eq!(countries[2].isps[UNKNOWN], 1);
    }

    #[test]
    fn ranks_isps() {
        let isps = group_by_isp(&sample());

        assert_eq!(
            isps,
            vec![
                IspStats {
                    name: "Hetzner Online GmbH".to_string(),
                    total_ips: 2
                },
                IspStats {
                    name: "Amazon.com".to_string(),
                    total_ips: 1
                },
                IspStats {
                    name: "Contabo GmbH".to_string(),
                    total_ips: 1
                },
                IspStats {
                    name: UNKNOWN.to_string(),
                    total_ips: 1
                },
            ]
        );
    }

    #[test]
    fn no_peers_no_stats() {
        assert!(group_by_country(&[]).is_empty());
        assert!(group_by_isp(&[]).is_empty());
    }
}
