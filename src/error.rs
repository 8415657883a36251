use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde_json::json;
use thiserror::Error;

lazy_static::lazy_static! {
    static ref CONNECTION_FAILURE: Regex = Regex::new(
        r"(?i)connection (refused|reset|closed|down)|no connection|\beof\b|end of file|broken pipe"
    )
    .unwrap();
}

/// Failure talking to the graph store, split by whether the transport itself
/// is gone or the store rejected the statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Store query error: {0}")]
    Query(String),
}

impl StoreError {
    /// Classify a raw driver error message. Refused connections and streams
    /// that ended unexpectedly mean the store is unreachable; everything else
    /// is attributed to the statement.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_connection_failure(&message) {
            StoreError::Connection(message)
        } else {
            StoreError::Query(message)
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

fn is_connection_failure(message: &str) -> bool {
    CONNECTION_FAILURE.is_match(message)
}

/// A resource that cannot be represented safely in the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Resource is missing a uid or kind")]
    MissingIdentity,

    #[error("Invalid cluster name: {0}")]
    InvalidCluster(String),

    #[error("Resource {uid} has no valid properties after sanitization")]
    NoValidProperties { uid: String },
}

/// Error recorded against a single resource or edge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            SyncError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            SyncError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            SyncError::Store(ref e) if e.is_connection() => {
                tracing::error!("Store unreachable: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
