//! Error types shared by the backend HTTP gateway.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias returning [`ApiError`] failures.
pub type ApiResult<T> = Result<T, ApiError>;

/// Failures that can occur while talking to the vote backend.
///
/// Transport problems and backend-rejected requests are kept distinct so
/// callers can decide whether the error is worth retrying later.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build backend client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent or timed out before a response arrived.
    #[error("connection error for `{path}`")]
    Connection {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The backend answered with a non-2xx status and no parsable error body.
    #[error("HTTP {status} for `{path}`")]
    Status { path: String, status: StatusCode },
    /// The backend answered with a structured error payload.
    #[error("{message}")]
    Backend { message: String },
    /// Response payload could not be decoded into the expected model.
    #[error("failed to decode backend response for `{path}`")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// An authenticated call was attempted before the server was paired.
    #[error("server is not linked to the backend")]
    NotLinked,
}
