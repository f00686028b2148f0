//! Error taxonomy shared across the live-update pipeline.
//!
//! Normalization problems are deliberately absent: a degraded normalization is
//! carried as `DetailedUpdate::error`, never as an `Err`.

use thiserror::Error;

/// Failures reported by the upstream sports-data provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OriginError {
    #[error("event not found at origin")]
    NotFound,

    #[error("origin access token expired")]
    AuthExpired,

    #[error("event already subscribed at origin")]
    AlreadySubscribed,

    #[error("origin unavailable: {0}")]
    Unavailable(String),
}

impl OriginError {
    pub fn unavailable(reason: impl std::fmt::Display) -> Self {
        OriginError::Unavailable(reason.to_string())
    }
}

impl From<reqwest::Error> for OriginError {
    fn from(err: reqwest::Error) -> Self {
        OriginError::Unavailable(err.to_string())
    }
}

/// Terminal failures of one inbound push delivery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("shared secret mismatch")]
    Unauthorized,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("internal ingestion failure: {0}")]
    Internal(String),
}

/// Read API failures. Everything except a fully unknown key degrades to stale data instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("event {0} not found")]
    NotFound(String),

    #[error("no data available for {0}: {1}")]
    Unavailable(String, String),

    #[error("store failure: {0}")]
    Store(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("document codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("document for {0} is not a JSON object")]
    NotAnObject(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FastStoreError {
    #[error("fast store unreachable: {0}")]
    Unreachable(String),

    #[error("ttl of {0}s cannot be scheduled")]
    InvalidTtl(u64),
}
