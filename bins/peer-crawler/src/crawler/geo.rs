use crate::types::PeerGeoRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// ip-api.com batch endpoint.
pub const GEO_BATCH_ENDPOINT: &str = "http://ip-api.com/batch";
/// Max number of ips per batch request accepted by the provider.
pub const GEO_BATCH_SIZE: usize = 100;
/// Only request the fields we store.
const GEO_FIELDS: &str = "status,message,country,isp,lat,lon,query";

#[derive(Serialize)]
struct GeoQuery<'a> {
    query: &'a str,
    fields: &'static str,
}

#[derive(Deserialize)]
struct GeoResponse {
    /// Echo of the requested ip.
    query: Option<String>,
    country: Option<String>,
    isp: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Resolves ips to country, isp and coordinates through a batch geolocation provider.
///
/// Clones share the request spacing, so concurrent network syncs stay under the
/// provider's rate limit together.
#[derive(Clone, Debug)]
pub struct GeoResolver {
    client: reqwest::Client,
    endpoint: String,
    /// Minimum pause between two batch requests, the free tier is rate limited.
    batch_delay: Duration,
    /// When the last batch request was sent.
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl GeoResolver {
    pub fn new(endpoint: impl Into<String>, batch_delay: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            batch_delay,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Resolve `ips` in batches of [`GEO_BATCH_SIZE`].
    ///
    /// Records come back in batch order. A failed batch is logged and skipped, so its ips
    /// are missing from the result.
    pub async fn resolve_batch(&self, ips: &[String]) -> Vec<PeerGeoRecord> {
        let mut records = Vec::with_capacity(ips.len());

        for (index, chunk) in ips.chunks(GEO_BATCH_SIZE).enumerate() {
            match self.resolve_chunk(chunk).await {
                Ok(batch) => {
                    debug!("Resolved geo batch {} ({} ips)", index, batch.len());
                    records.extend(batch);
                }
                Err(e) => {
                    warn!(
                        "Geo batch {} ({} ips) failed, skipping: {}",
                        index,
                        chunk.len(),
                        e
                    );
                }
            }
        }

        records
    }

    async fn resolve_chunk(&self, chunk: &[String]) -> Result<Vec<PeerGeoRecord>, reqwest::Error> {
        let payload: Vec<GeoQuery<'_>> = chunk
            .iter()
            .map(|ip| GeoQuery {
                query: ip,
                fields: GEO_FIELDS,
            })
            .collect();

        // held until the response is in, requests never overlap
        let mut last_request = self.last_request.lock().await;
        if let Some(last) = *last_request {
            tokio::time::sleep_until(last + self.batch_delay).await;
        }
        *last_request = Some(Instant::now());

        let infos: Vec<GeoResponse> = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        drop(last_request);

        Ok(correlate(chunk, infos))
    }
}

/// Pair each response element with the ip it describes.
///
/// The echoed `query` wins when it names an ip of the chunk, otherwise the provider is
/// trusted to answer in request order. Every ip is claimed at most once.
fn correlate(chunk: &[String], infos: Vec<GeoResponse>) -> Vec<PeerGeoRecord> {
    let mut claimed = HashSet::new();
    infos
        .into_iter()
        .enumerate()
        .filter_map(|(index, info)| {
            let ip = match info.query.as_deref() {
                Some(query) if chunk.iter().any(|ip| ip == query) => query.to_string(),
                _ => chunk.get(index)?.clone(),
            };
            if !claimed.insert(ip.clone()) {
                return None;
            }
            Some(PeerGeoRecord {
                ip,
                rpc_address: None,
                country: info.country,
                isp: info.isp,
                lat: info.lat.map(|lat| lat.to_string()),
                lon: info.lon.map(|lon| lon.to_string()),
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, Request, Respond, ResponseTemplate,
    };

    /// Answers like ip-api does, failing the `fail_call`-th request (1 based).
    pub(crate) struct BatchResponder {
        calls: AtomicUsize,
        fail_call: Option<usize>,
    }

    impl BatchResponder {
        pub(crate) fn new(fail_call: Option<usize>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_call,
            }
        }
    }

    impl Respond for BatchResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(call) == self.fail_call {
                return ResponseTemplate::new(500);
            }
            let queries: Vec<Value> = serde_json::from_slice(&request.body).unwrap();
            let body: Vec<Value> = queries
                .iter()
                .map(|q| {
                    let ip = q["query"].as_str().unwrap();
                    json!({
                        "status": "success",
                        "country": format!("country-{ip}"),
                        "isp": "Hetzner Online GmbH",
                        "lat": 50.4779,
                        "lon": 12.3713,
                        "query": ip,
                    })
                })
                .collect();
            ResponseTemplate::new(200).set_body_json(body)
        }
    }

    pub(crate) async fn geo_server(fail_call: Option<usize>) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/batch"))
            .respond_with(BatchResponder::new(fail_call))
            .mount(&server)
            .await;
        server
    }

    pub(crate) fn test_resolver(server: &MockServer) -> GeoResolver {
        GeoResolver::new(format!("{}/batch", server.uri()), Duration::ZERO)
    }

    fn ips(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect()
    }

    async fn batch_sizes(server: &MockServer) -> Vec<usize> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| serde_json::from_slice::<Vec<Value>>(&r.body).unwrap().len())
            .collect()
    }

    #[tokio::test]
    async fn splits_into_batches_of_one_hundred() {
        let server = geo_server(None).await;
        let ips = ips(250);

        let records = test_resolver(&server).resolve_batch(&ips).await;

        assert_eq!(batch_sizes(&server).await, vec![100, 100, 50]);
        let resolved: Vec<String> = records.iter().map(|r| r.ip.clone()).collect();
        assert_eq!(resolved, ips);
        assert_eq!(records[7].country, Some(format!("country-{}", ips[7])));
        assert_eq!(records[7].lat.as_deref(), Some("50.4779"));
        assert_eq!(records[7].lon.as_deref(), Some("12.3713"));
    }

    #[tokio::test]
    async fn failed_batch_is_skipped() {
        let server = geo_server(Some(2)).await;
        let ips = ips(250);

        let records = test_resolver(&server).resolve_batch(&ips).await;

        assert_eq!(batch_sizes(&server).await, vec![100, 100, 50]);
        assert_eq!(records.len(), 150);
        let resolved: Vec<String> = records.iter().map(|r| r.ip.clone()).collect();
        let expected: Vec<String> = ips[..100].iter().chain(&ips[200..]).cloned().collect();
        assert_eq!(resolved, expected);
    }

    #[tokio::test]
    async fn no_ips_no_requests() {
        let server = geo_server(None).await;
        assert!(test_resolver(&server).resolve_batch(&[]).await.is_empty());
        assert!(batch_sizes(&server).await.is_empty());
    }

    #[tokio::test]
    async fn unparseable_response_skips_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("rate limited"))
            .mount(&server)
            .await;

        assert!(test_resolver(&server)
            .resolve_batch(&ips(3))
            .await
            .is_empty());
    }

    /// Records when each request reached the server.
    struct TimedResponder {
        inner: BatchResponder,
        received: Arc<std::sync::Mutex<Vec<std::time::Instant>>>,
    }

    impl Respond for TimedResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            self.received
                .lock()
                .unwrap()
                .push(std::time::Instant::now());
            self.inner.respond(request)
        }
    }

    #[tokio::test]
    async fn concurrent_batches_share_the_delay() {
        let server = MockServer::start().await;
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        Mock::given(method("POST"))
            .respond_with(TimedResponder {
                inner: BatchResponder::new(None),
                received: received.clone(),
            })
            .mount(&server)
            .await;
        let delay = Duration::from_millis(200);
        let geo = GeoResolver::new(format!("{}/batch", server.uri()), delay);
        let first: Vec<String> = ips(300)[..150].to_vec();
        let second: Vec<String> = ips(300)[150..].to_vec();

        let (a, b) = tokio::join!(geo.resolve_batch(&first), geo.resolve_batch(&second));

        assert_eq!(a.len(), 150);
        assert_eq!(b.len(), 150);
        let received = received.lock().unwrap().clone();
        assert_eq!(received.len(), 4);
        for pair in received.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= delay - Duration::from_millis(20), "requests {gap:?} apart");
        }
    }

    #[test]
    fn correlation_never_repeats_an_ip() {
        let chunk = vec!["1.1.1.1".to_string(), "2.2.2.2".to_string()];
        let infos: Vec<GeoResponse> = serde_json::from_value(json!([
            { "query": "2.2.2.2", "country": "B" },
            { "country": "unknown" },
            { "query": "2.2.2.2", "country": "again" }
        ]))
        .unwrap();

        let records = correlate(&chunk, infos);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ip, "2.2.2.2");
        assert_eq!(records[0].country.as_deref(), Some("B"));
    }

    #[test]
    fn correlates_by_echoed_query_then_position() {
        let chunk = vec!["1.1.1.1".to_string(), "2.2.2.2".to_string(), "3.3.3.3".to_string()];
        let infos: Vec<GeoResponse> = serde_json::from_value(json!([
            { "query": "2.2.2.2", "country": "B" },
            { "query": "1.1.1.1", "country": "A" },
            { "status": "fail", "message": "private range" },
            { "country": "extra" }
        ]))
        .unwrap();

        let records = correlate(&chunk, infos);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].ip, "2.2.2.2");
        assert_eq!(records[0].country.as_deref(), Some("B"));
        assert_eq!(records[1].ip, "1.1.1.1");
        assert_eq!(records[2].ip, "3.3.3.3");
        assert_eq!(records[2].country, None);
        assert_eq!(records[2].lat, None);
    }
}
