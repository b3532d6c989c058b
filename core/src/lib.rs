//! Client core for the task manager backend.
//!
//! # Overview
//! Builds `HttpRequest` values and parses `HttpResponse` values without
//! touching the network (host-does-IO pattern), and layers two stateful
//! components on top:
//!
//! - `Session` acquires, persists, and decodes the access token and
//!   publishes the signed-in identity.
//! - `TaskList` mirrors the remote task collection, mutating its cache only
//!   after the backend confirms each change.
//!
//! # Design
//! - `TasksClient` is stateless; it holds only `base_url`.
//! - Network I/O goes through the `Transport` trait. `UreqTransport` is the
//!   production implementation.
//! - `TaskList` receives its credential through `CredentialSource`, which
//!   `Session` implements. There is no ambient authorization state.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod store;
pub mod sync;
pub mod token;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

pub use client::TasksClient;
pub use config::ClientConfig;
pub use error::{ApiError, SessionError, StoreError, SyncError, TokenError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::{CredentialSource, Session, SessionState};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore, TOKEN_KEY};
pub use sync::{Draft, TaskList};
pub use token::{Claims, Credential};
pub use transport::{Transport, UreqTransport};
pub use types::{AuthRequest, Identity, NewTask, Task, TaskPatch, TokenResponse};
