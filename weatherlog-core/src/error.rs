//! Failure taxonomy shared by the source client, normalizer, store and the
//! ingestion loop.

use std::path::PathBuf;

use thiserror::Error;

/// Any failure to obtain a usable payload from the weather API.
///
/// Transport errors, non-success statuses, undecodable bodies and missing
/// fields all end up here; the ingestion loop handles them the same way.
#[derive(Debug, Error)]
#[error("weather API request for '{city}' failed: {cause}")]
pub struct FetchError {
    pub city: String,
    #[source]
    pub cause: ApiCause,
}

#[derive(Debug, Error)]
pub enum ApiCause {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field `{0}`")]
    MissingField(&'static str),
}

impl FetchError {
    pub fn new(city: impl Into<String>, cause: impl Into<ApiCause>) -> Self {
        Self {
            city: city.into(),
            cause: cause.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("malformed payload for '{city}': {reason}")]
    MalformedPayload { city: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The connection can no longer be used; only a reconnect helps.
    #[error("database connection lost: {0}")]
    ConnectionLost(String),

    /// The write was rejected and rolled back; the connection is still fine.
    #[error("database write failed: {0}")]
    Write(#[source] rusqlite::Error),

    #[error("failed to open database '{}'", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("database query failed: {0}")]
    Read(#[source] rusqlite::Error),
}

impl StoreError {
    /// Classify a driver error raised while writing.
    pub fn from_write(err: rusqlite::Error) -> Self {
        if is_connection_error(&err) {
            StoreError::ConnectionLost(err.to_string())
        } else {
            StoreError::Write(err)
        }
    }

    pub fn is_connection_lost(&self) -> bool {
        matches!(self, StoreError::ConnectionLost(_) | StoreError::Open { .. })
    }
}

fn is_connection_error(err: &rusqlite::Error) -> bool {
    use rusqlite::{ErrorCode, ffi};

    match err {
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::NotADatabase
            | ErrorCode::DatabaseCorrupt => true,
            // The file was unlinked or renamed under the open handle, or the
            // handle cannot recover its state: only a fresh connection helps.
            ErrorCode::ReadOnly => matches!(
                e.extended_code,
                ffi::SQLITE_READONLY_DBMOVED
                    | ffi::SQLITE_READONLY_RECOVERY
                    | ffi::SQLITE_READONLY_CANTINIT
            ),
            _ => false,
        },
        _ => false,
    }
}

/// The four failure kinds the ingestion loop distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NetworkOrApi,
    MalformedPayload,
    StoreConnectionLost,
    StoreWrite,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NetworkOrApi => "network-or-api",
            FailureKind::MalformedPayload => "malformed-payload",
            FailureKind::StoreConnectionLost => "store-connection-lost",
            FailureKind::StoreWrite => "store-write",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-city failure inside an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::Fetch(_) => FailureKind::NetworkOrApi,
            IngestError::Normalize(NormalizeError::MalformedPayload { .. }) => {
                FailureKind::MalformedPayload
            }
            IngestError::Store(e) if e.is_connection_lost() => FailureKind::StoreConnectionLost,
            IngestError::Store(_) => FailureKind::StoreWrite,
        }
    }
}
