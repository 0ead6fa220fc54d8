//! Shared application state: credentials, pairing sessions, and the
//! realtime-connection phase observed by the rest of the bridge.

pub mod connection;
pub mod server;

use std::{
    sync::Arc,
    time::Instant,
};

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};

use crate::{config::AppConfig, services::pairing::PairingIssuer};

pub use self::connection::ConnectionState;
pub use self::server::{GameServer, PlayerRef, ServerSnapshot};

/// Shared handle to [`AppState`], cloned freely across tasks.
pub type SharedState = Arc<AppState>;

/// Credentials issued by a successful pairing exchange.
///
/// Invariant: both halves are non-empty. Partial credentials are treated as
/// absent everywhere, which is why construction goes through [`Self::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCredentials {
    server_id: String,
    server_token: String,
}

impl ConnectionCredentials {
    /// Build credentials, rejecting pairs where either half is blank.
    pub fn new(server_id: impl Into<String>, server_token: impl Into<String>) -> Option<Self> {
        let server_id = server_id.into();
        let server_token = server_token.into();
        if server_id.trim().is_empty() || server_token.trim().is_empty() {
            return None;
        }
        Some(Self {
            server_id,
            server_token,
        })
    }

    /// Backend identifier of this server.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Bearer token for authenticated calls.
    pub fn server_token(&self) -> &str {
        &self.server_token
    }
}

/// Persistence seam for [`ConnectionCredentials`].
///
/// The bridge treats storage as an external collaborator; the only invariant
/// it relies on is that `load` never returns a partial pair.
pub trait CredentialsStore: Send + Sync {
    /// Load previously stored credentials, if any.
    fn load(&self) -> Option<ConnectionCredentials>;
    /// Persist credentials after a successful pairing.
    fn store(&self, credentials: &ConnectionCredentials) -> std::io::Result<()>;
    /// Forget stored credentials (unlink).
    fn clear(&self) -> std::io::Result<()>;
}

/// Central application state shared by every service of the bridge.
pub struct AppState {
    config: Arc<AppConfig>,
    credentials: RwLock<Option<ConnectionCredentials>>,
    pairings: PairingIssuer,
    connection: watch::Sender<ConnectionState>,
    started_at: Instant,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply. The bridge starts unlinked and disconnected.
    pub fn new(config: Arc<AppConfig>) -> SharedState {
        let (connection_tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            config,
            credentials: RwLock::new(None),
            pairings: PairingIssuer::new(),
            connection: connection_tx,
            started_at: Instant::now(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current credentials, if the server is linked.
    pub async fn credentials(&self) -> Option<ConnectionCredentials> {
        self.credentials.read().await.clone()
    }

    /// Install credentials after a successful pairing exchange.
    pub async fn set_credentials(&self, credentials: ConnectionCredentials) {
        *self.credentials.write().await = Some(credentials);
    }

    /// Drop credentials (unlink).
    pub async fn clear_credentials(&self) {
        self.credentials.write().await.take();
    }

    /// Whether the server holds a complete credential pair.
    pub async fn is_linked(&self) -> bool {
        self.credentials.read().await.is_some()
    }

    /// Issuer of short-lived pairing codes.
    pub fn pairings(&self) -> &PairingIssuer {
        &self.pairings
    }

    /// Current phase of the realtime connection.
    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    /// Publish a new realtime connection phase.
    pub fn set_connection_state(&self, state: ConnectionState) {
        // send_replace never fails, even with no subscribers.
        self.connection.send_replace(state);
    }

    /// Subscribe to realtime connection phase changes.
    pub fn connection_watcher(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    /// Seconds since the bridge started.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_credentials_are_rejected() {
        assert!(ConnectionCredentials::new("", "tok").is_none());
        assert!(ConnectionCredentials::new("17", "").is_none());
        assert!(ConnectionCredentials::new("  ", "tok").is_none());
        assert!(ConnectionCredentials::new("17", "tok").is_some());
    }

    #[tokio::test]
    async fn linking_requires_a_full_pair() {
        let state = AppState::new(Arc::new(AppConfig::default()));
        assert!(!state.is_linked().await);

        let credentials = ConnectionCredentials::new("17", "tok").unwrap();
        state.set_credentials(credentials.clone()).await;
        assert!(state.is_linked().await);
        assert_eq!(state.credentials().await, Some(credentials));

        state.clear_credentials().await;
        assert!(!state.is_linked().await);
    }

    #[tokio::test]
    async fn connection_state_changes_are_observable() {
        let state = AppState::new(Arc::new(AppConfig::default()));
        let mut watcher = state.connection_watcher();
        assert_eq!(state.connection_state(), ConnectionState::Disconnected);

        state.set_connection_state(ConnectionState::Connecting);
        watcher.changed().await.unwrap();
        assert_eq!(*watcher.borrow(), ConnectionState::Connecting);
    }
}
