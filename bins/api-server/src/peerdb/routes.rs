use super::app_state::AppState;
use super::stats::{group_by_country, group_by_isp, CountryStats, IspStats};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use cosmos_peers_db::{PeerDB, PersistedPeer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// Network the dashboard is currently showing.
#[derive(Deserialize)]
struct NetworkParam {
    network: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// A storage failure, reported as a 500 with a json body.
struct ApiError(String);

impl<E: std::error::Error> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody { error: self.0 }),
        )
            .into_response()
    }
}

/// Router for all APIs.
pub(crate) fn rest_router() -> Router<AppState> {
    Router::new()
        .route("/peers", get(get_peers))
        .route("/networks", get(get_networks))
        .route("/countries", get(get_countries))
        .route("/isps", get(get_isps))
}

async fn get_peers(
    State(store): State<Arc<dyn PeerDB>>,
    Query(param): Query<NetworkParam>,
) -> Result<Json<Vec<PersistedPeer>>, ApiError> {
    Ok(Json(store.peers_by_network(param.network).await?))
}

async fn get_networks(State(store): State<Arc<dyn PeerDB>>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(store.networks().await?))
}

async fn get_countries(
    State(store): State<Arc<dyn PeerDB>>,
    Query(param): Query<NetworkParam>,
) -> Result<Json<Vec<CountryStats>>, ApiError> {
    let peers = store.peers_by_network(param.network).await?;
    Ok(Json(group_by_country(&peers)))
}

async fn get_isps(
    State(store): State<Arc<dyn PeerDB>>,
    Query(param): Query<NetworkParam>,
) -> Result<Json<Vec<IspStats>>, ApiError> {
    let peers = store.peers_by_network(param.network).await?;
    Ok(Json(group_by_isp(&peers)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peerdb::stats::tests::peer;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use cosmos_peers_db::{AddItemError, InMemoryPeerDB, QueryItemError, ScanTableError};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(store: Arc<dyn PeerDB>) -> Router {
        rest_router().with_state(AppState::new(store))
    }

    async fn seeded() -> Router {
        let db = InMemoryPeerDB::new();
        for peer in [
            peer("1.1.1.1", Some("Germany"), Some("Hetzner Online GmbH")),
            peer("2.2.2.2", Some("Germany"), Some("Contabo GmbH")),
            peer("3.3.3.3", Some("France"), Some("OVH SAS")),
        ] {
            db.upsert_peer(peer).await.unwrap();
        }
        let mut other = peer("9.9.9.9", Some("Japan"), None);
        other.network = "Sei".to_string();
        db.upsert_peer(other).await.unwrap();
        app(Arc::new(db))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn lists_peers_of_one_network() {
        let (status, body) = get_json(seeded().await, "/peers?network=Akash").await;

        assert_eq!(status, StatusCode::OK);
        let ips: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|peer| peer["ip"].as_str().unwrap())
            .collect();
        assert_eq!(ips, vec!["1.1.1.1", "2.2.2.2", "3.3.3.3"]);
    }

    #[tokio::test]
    async fn lists_networks() {
        let (status, body) = get_json(seeded().await, "/networks").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["Akash", "Sei"]));
    }

    #[tokio::test]
    async fn aggregates_countries_and_isps() {
        let (_, countries) = get_json(seeded().await, "/countries?network=Akash").await;
        assert_eq!(
            countries,
            json!([
                {
                    "country": "Germany",
                    "total_ips": 2,
                    "isps": { "Contabo GmbH": 1, "Hetzner Online GmbH": 1 }
                },
                {
                    "country": "France",
                    "total_ips": 1,
                    "isps": { "OVH SAS": 1 }
                }
            ])
        );

        let (_, isps) = get_json(seeded().await, "/isps?network=Sei").await;
        assert_eq!(isps, json!([{ "name": "Unknown", "total_ips": 1 }]));
    }

    #[tokio::test]
    async fn unknown_network_is_empty() {
        let (status, body) = get_json(seeded().await, "/peers?network=Osmosis").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn missing_network_is_rejected() {
        let response = seeded()
            .await
            .oneshot(Request::builder().uri("/peers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    struct BrokenDB;

    #[async_trait]
    impl PeerDB for BrokenDB {
        async fn upsert_peer(&self, _peer: PersistedPeer) -> Result<(), AddItemError> {
            Ok(())
        }

        async fn count_peers(&self, _network: String) -> Result<u64, QueryItemError> {
            Ok(0)
        }

        async fn peers_by_network(
            &self,
            _network: String,
        ) -> Result<Vec<PersistedPeer>, QueryItemError> {
            Err(QueryItemError::SqlQueryItemError(
                tokio_rusqlite::Error::ConnectionClosed,
            ))
        }

        async fn networks(&self) -> Result<Vec<String>, ScanTableError> {
            Err(ScanTableError::SqlScanError(
                tokio_rusqlite::Error::ConnectionClosed,
            ))
        }
    }

    #[tokio::test]
    async fn storage_failure_is_a_server_error() {
        let (status, body) = get_json(app(Arc::new(BrokenDB)), "/countries?network=Akash").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());

        let (status, _) = get_json(app(Arc::new(BrokenDB)), "/networks").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
