//! The signed-in session: token acquisition, persistence, and the identity
//! published to observers.
//!
//! # Design
//! `Session` is the single owner of the current `Credential`. Other
//! components read it through `CredentialSource` instead of a shared default
//! header, so an unauthenticated caller is visible in the type signature.
//! Identity changes go out on a `tokio::sync::watch` channel; the value
//! starts as `Initializing` and leaves it exactly once, in `init`.
//!
//! Tokens are decoded without verification. The backend checks signature
//! and expiry on every task call; an expired token shows up as a failed
//! fetch, not as a logout.

use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::client::TasksClient;
use crate::error::{SessionError, StoreError};
use crate::http::HttpRequest;
use crate::store::TokenStore;
use crate::token::Credential;
use crate::transport::Transport;
use crate::types::{AuthRequest, Identity};

/// Published session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// `init` has not run yet.
    Initializing,
    /// Confirmed absent: no usable token.
    Anonymous,
    Authenticated(Identity),
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        !matches!(self, SessionState::Initializing)
    }
}

/// Supplies the bearer credential for authenticated calls.
pub trait CredentialSource: Send + Sync {
    fn credential(&self) -> Option<Credential>;
}

impl CredentialSource for Credential {
    fn credential(&self) -> Option<Credential> {
        Some(self.clone())
    }
}

impl CredentialSource for Option<Credential> {
    fn credential(&self) -> Option<Credential> {
        self.clone()
    }
}

impl<C: CredentialSource + ?Sized> CredentialSource for Arc<C> {
    fn credential(&self) -> Option<Credential> {
        (**self).credential()
    }
}

impl<C: CredentialSource + ?Sized> CredentialSource for &C {
    fn credential(&self) -> Option<Credential> {
        (**self).credential()
    }
}

pub struct Session<T, S> {
    client: TasksClient,
    transport: T,
    store: S,
    credential: RwLock<Option<Credential>>,
    state: watch::Sender<SessionState>,
}

impl<T: Transport, S: TokenStore> Session<T, S> {
    pub fn new(client: TasksClient, transport: T, store: S) -> Self {
        let (state, _) = watch::channel(SessionState::Initializing);
        Self {
            client,
            transport,
            store,
            credential: RwLock::new(None),
            state,
        }
    }

    /// Restore the session from the persisted token, if any.
    ///
    /// A token that does not decode, or a token file that is not UTF-8, is
    /// removed from storage and the session becomes `Anonymous`. Any other
    /// store failure is returned, but the session still leaves
    /// `Initializing` as `Anonymous` first.
    pub fn init(&self) -> Result<SessionState, StoreError> {
        let restored = match self.store.load() {
            Ok(Some(token)) => {
                let credential = Credential::new(token);
                match credential.identity() {
                    Ok(identity) => Some((credential, identity)),
                    Err(e) => {
                        warn!(error = %e, "discarding unreadable persisted token");
                        self.discard_persisted();
                        None
                    }
                }
            }
            Ok(None) => None,
            Err(e @ StoreError::Corrupt { .. }) => {
                warn!(error = %e, "discarding unreadable persisted token");
                self.discard_persisted();
                None
            }
            Err(e) => {
                self.set_credential(None);
                self.state.send_replace(SessionState::Anonymous);
                return Err(e);
            }
        };

        let state = match restored {
            Some((credential, identity)) => {
                info!(user_id = identity.id, email = %identity.email, "session restored");
                self.set_credential(Some(credential));
                SessionState::Authenticated(identity)
            }
            None => {
                self.set_credential(None);
                SessionState::Anonymous
            }
        };
        self.state.send_replace(state.clone());
        Ok(state)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        let request = self.client.build_login(&auth_request(email, password))?;
        self.authenticate(request).await
    }

    /// Create an account; success signs the new user in.
    pub async fn register(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        let request = self.client.build_register(&auth_request(email, password))?;
        self.authenticate(request).await
    }

    /// Forget the credential locally. No remote call is made.
    ///
    /// In-memory state is cleared even when removing the persisted token
    /// fails; the store error is still returned.
    pub fn logout(&self) -> Result<(), StoreError> {
        let cleared = self.store.clear();
        self.set_credential(None);
        self.state.send_replace(SessionState::Anonymous);
        info!("signed out");
        cleared
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    async fn authenticate(&self, request: HttpRequest) -> Result<Identity, SessionError> {
        let response = self.transport.execute(request).await?;
        let credential = self.client.parse_token(response)?;
        let identity = credential.identity()?;

        self.store.save(credential.as_str())?;
        self.set_credential(Some(credential));
        self.state
            .send_replace(SessionState::Authenticated(identity.clone()));
        info!(user_id = identity.id, email = %identity.email, "signed in");
        Ok(identity)
    }

    fn discard_persisted(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "could not remove persisted token");
        }
    }

    fn set_credential(&self, credential: Option<Credential>) {
        let mut slot = self
            .credential
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = credential;
    }
}

impl<T: Transport, S: TokenStore> CredentialSource for Session<T, S> {
    fn credential(&self) -> Option<Credential> {
        self.credential
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn auth_request(email: &str, password: &str) -> AuthRequest {
    AuthRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}
