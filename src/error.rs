//! Service-level error taxonomy.

use thiserror::Error;

use crate::api::ApiError;

/// Errors surfaced by the bridge services.
///
/// Nothing in this taxonomy is fatal to the process: connectivity problems
/// are retried by the supervising loops, backend rejections are reported to
/// the initiating caller verbatim, and the rest terminate locally in a log.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Transport-level failure talking to the backend; always recoverable.
    #[error("backend unreachable")]
    Connectivity(#[source] ApiError),
    /// The backend rejected the request with a structured error payload.
    #[error("rejected by backend: {0}")]
    Rejected(String),
    /// Malformed or unexpected realtime traffic.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Target player went offline before rewards could be delivered.
    #[error("player `{0}` is offline")]
    PlayerOffline(String),
    /// The server has no stored credentials yet.
    #[error("server is not linked")]
    NotLinked,
    /// Reconnect attempts exceeded the cap for this connection lifetime.
    #[error("reconnect attempts exhausted")]
    Exhausted,
}

impl From<ApiError> for ServiceError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Backend { message } => ServiceError::Rejected(message),
            ApiError::NotLinked => ServiceError::NotLinked,
            other => ServiceError::Connectivity(other),
        }
    }
}
