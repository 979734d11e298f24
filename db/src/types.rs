use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A peer as stored for one network. `(ip, network)` is the key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedPeer {
    pub ip: String,
    pub network: String,
    pub rpc_address: Option<String>,
    pub country: Option<String>,
    pub isp: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
    /// Time of the sync that last wrote this record.
    pub last_seen: String,
}

impl From<&HashMap<String, AttributeValue>> for PersistedPeer {
    fn from(value: &HashMap<String, AttributeValue>) -> Self {
        PersistedPeer {
            ip: as_string(value.get("ip"), ""),
            network: as_string(value.get("network"), ""),
            rpc_address: as_opt_string(value.get("rpc_address")),
            country: as_opt_string(value.get("country")),
            isp: as_opt_string(value.get("isp")),
            lat: as_opt_string(value.get("lat")),
            lon: as_opt_string(value.get("lon")),
            last_seen: as_string(value.get("last_seen"), ""),
        }
    }
}

pub fn as_string(val: Option<&AttributeValue>, default: &str) -> String {
    as_opt_string(val).unwrap_or_else(|| default.to_owned())
}

pub fn as_opt_string(val: Option<&AttributeValue>) -> Option<String> {
    if let Some(v) = val {
        if let Ok(s) = v.as_s() {
            return Some(s.to_owned());
        }
    }
    None
}

#[derive(Error, Debug)]
pub enum AddItemError {
    #[error("dynamodb put_item failed: {0}")]
    AwsAddItemError(#[from] SdkError<PutItemError>),
    #[error("sqlite upsert failed: {0}")]
    SqlAddItemError(tokio_rusqlite::Error),
    #[error("postgres upsert failed: {0}")]
    PostgresAddItemError(#[from] tokio_postgres::Error),
}

#[derive(Error, Debug)]
pub enum QueryItemError {
    #[error("dynamodb query failed: {0}")]
    AwsQueryItemError(#[from] SdkError<QueryError>),
    #[error("sqlite query failed: {0}")]
    SqlQueryItemError(tokio_rusqlite::Error),
    #[error("postgres query failed: {0}")]
    PostgresQueryItemError(#[from] tokio_postgres::Error),
}

#[derive(Error, Debug)]
pub enum ScanTableError {
    #[error("dynamodb scan failed: {0}")]
    AwsScanError(#[from] SdkError<ScanError>),
    #[error("sqlite scan failed: {0}")]
    SqlScanError(tokio_rusqlite::Error),
    #[error("postgres scan failed: {0}")]
    PostgresScanError(#[from] tokio_postgres::Error),
}
