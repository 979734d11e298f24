use std::{fmt::Debug, sync::Arc};

use axum::extract::FromRef;
use cosmos_peers_db::PeerDB;

/// Stores the database.
#[derive(Clone, FromRef)]
pub struct AppState {
    store: Arc<dyn PeerDB>,
}

impl Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &"database")
            .finish()
    }
}

impl AppState {
    pub fn new(store: Arc<dyn PeerDB>) -> Self {
        Self { store }
    }
}
