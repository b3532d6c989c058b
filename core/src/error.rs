//! Error types for the task manager client.
//!
//! # Design
//! The backend contract recognizes one failure kind: the call did not
//! succeed. `ApiError` still keeps the status and body of non-2xx responses
//! so logs can show them, but nothing above the client branches on the
//! status code. Session and synchronizer errors wrap `ApiError` rather than
//! flattening it.

use thiserror::Error;

/// Errors produced while building requests, executing them, or parsing
/// responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (connection refused, DNS,
    /// reset, worker thread lost).
    #[error("transport failed: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// A credential string that does not decode to an identity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not made of three dot-separated segments")]
    Malformed,

    #[error("token payload is not valid base64url: {0}")]
    Encoding(String),

    #[error("token payload is not a valid claims object: {0}")]
    Claims(String),
}

/// Failures of the durable token storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token store I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The persisted token is not valid UTF-8.
    #[error("token file at {path} is not valid UTF-8")]
    Corrupt { path: String },
}

/// Errors surfaced by `Session` operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("invalid access token: {0}")]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by `TaskList` operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// `create` was called with an empty or whitespace-only title.
    #[error("task title must not be empty")]
    EmptyTitle,

    /// Another toggle or delete for the same task is still in flight.
    #[error("task {0} has an operation in flight")]
    Busy(i64),

    /// No credential was available for an authenticated call.
    #[error("not signed in")]
    NotAuthenticated,

    #[error(transparent)]
    Api(#[from] ApiError),
}
