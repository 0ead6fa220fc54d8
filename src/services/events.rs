//! Single funnel for backend events.
//!
//! Votes and pairing confirmations can arrive over the realtime channel or
//! from the fallback poller; both producers push [`ChannelEvent`]s into one
//! queue and this dispatcher applies them sequentially, so the rest of the
//! bridge never sees the two sources race each other.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    dto::api::{PairingResponse, VoteEvent},
    services::claims::ClaimCoordinator,
    state::{CredentialsStore, GameServer, SharedState},
};

/// An event produced by the realtime channel or the poller.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A vote was registered for this server.
    VoteReceived(VoteEvent),
    /// The operator completed the pairing flow on the backend dashboard.
    PairingConfirmed(PairingResponse),
    /// The realtime channel established a session.
    Connected,
    /// The realtime channel lost its session, with the reason.
    Disconnected {
        /// Why the session ended ("connection lost", "max attempts").
        reason: String,
    },
    /// The backend reported a channel-level error.
    ChannelError(String),
}

/// Applies [`ChannelEvent`]s in arrival order.
pub struct EventDispatcher {
    state: SharedState,
    server: Arc<dyn GameServer>,
    claims: Arc<ClaimCoordinator>,
    store: Arc<dyn CredentialsStore>,
}

impl EventDispatcher {
    /// Create a dispatcher over the bridge's collaborators.
    pub fn new(
        state: SharedState,
        server: Arc<dyn GameServer>,
        claims: Arc<ClaimCoordinator>,
        store: Arc<dyn CredentialsStore>,
    ) -> Self {
        Self {
            state,
            server,
            claims,
            store,
        }
    }

    /// Drain the queue until every sender is dropped.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<ChannelEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("event queue closed, dispatcher stopping");
    }

    /// Apply one event.
    pub async fn handle(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::VoteReceived(vote) => self.on_vote(vote).await,
            ChannelEvent::PairingConfirmed(response) => self.on_pairing(response).await,
            ChannelEvent::Connected => {
                info!("realtime channel established");
            }
            ChannelEvent::Disconnected { reason } => {
                warn!(%reason, "realtime channel lost");
            }
            ChannelEvent::ChannelError(message) => {
                warn!(error = %message, "backend reported a channel error");
            }
        }
    }

    async fn on_vote(&self, vote: VoteEvent) {
        info!(
            vote_id = %vote.id,
            player = %vote.player_name,
            service = %vote.service_name,
            "vote received"
        );

        if self.state.config().broadcast_votes {
            self.server.broadcast_message(&format!(
                "{} voted for the server on {}!",
                vote.player_name, vote.service_name
            ));
        }

        // Claims for players who are not online are deferred to the next
        // per-player poll on join; claiming now would burn the commands.
        if self.server.player_by_name(&vote.player_name).is_none() {
            info!(
                vote_id = %vote.id,
                player = %vote.player_name,
                "voter offline, leaving the vote pending"
            );
            return;
        }

        match self.claims.claim(&vote).await {
            Ok(true) => {}
            Ok(false) => {
                info!(vote_id = %vote.id, "vote needed no claim");
            }
            Err(err) => {
                warn!(vote_id = %vote.id, error = %err, "vote claim failed");
            }
        }
    }

    async fn on_pairing(&self, response: PairingResponse) {
        let Some(credentials) = response.credentials() else {
            warn!("pairing confirmation carried no usable credentials, ignoring");
            return;
        };

        self.state.set_credentials(credentials.clone()).await;
        if let Err(err) = self.store.store(&credentials) {
            warn!(error = %err, "failed to persist credentials, pairing will not survive a restart");
        }

        // The pending session served its purpose, drop it so the operator
        // cannot replay the code.
        if let Some(session) = self.state.pairings().active_pairing() {
            self.state.pairings().cancel_pairing(&session.code);
        }

        info!(server_id = %credentials.server_id(), "server linked to the vote backend");
        self.server
            .broadcast_message("This server is now linked to the vote backend!");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::future::BoxFuture;
    use uuid::Uuid;

    use super::*;
    use crate::{
        api::{ApiResult, VoteBackend},
        config::AppConfig,
        dto::api::{
            ClaimData, ClaimResponse, LeaderboardEntry, PairedServer, PairingData,
            PairingRequest, ServerStats,
        },
        state::{AppState, ConnectionCredentials, PlayerRef, ServerSnapshot},
    };

    struct RecordingServer {
        online: Option<PlayerRef>,
        commands: Mutex<Vec<String>>,
        broadcasts: Mutex<Vec<String>>,
    }

    impl RecordingServer {
        fn with_player(name: &str) -> Arc<Self> {
            Arc::new(Self {
                online: Some(PlayerRef {
                    name: name.to_string(),
                    uuid: Uuid::nil(),
                }),
                commands: Mutex::new(Vec::new()),
                broadcasts: Mutex::new(Vec::new()),
            })
        }

        fn empty() -> Arc<Self> {
            Arc::new(Self {
                online: None,
                commands: Mutex::new(Vec::new()),
                broadcasts: Mutex::new(Vec::new()),
            })
        }
    }

    impl GameServer for RecordingServer {
        fn player_by_name(&self, name: &str) -> Option<PlayerRef> {
            self.online
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(name))
                .cloned()
        }

        fn is_online(&self, player: &PlayerRef) -> bool {
            self.online.as_ref() == Some(player)
        }

        fn dispatch_console_command(&self, command: &str) {
            self.commands.lock().unwrap().push(command.to_string());
        }

        fn broadcast_message(&self, message: &str) {
            self.broadcasts.lock().unwrap().push(message.to_string());
        }

        fn snapshot(&self) -> ServerSnapshot {
            ServerSnapshot {
                ip: "127.0.0.1".into(),
                port: 25565,
                version: "1.21.4".into(),
                players_online: 0,
                max_players: 20,
                tps: 20.0,
            }
        }
    }

    struct ClaimingBackend;

    impl VoteBackend for ClaimingBackend {
        fn pair(&self, _: PairingRequest) -> BoxFuture<'static, ApiResult<PairingResponse>> {
            unimplemented!("not exercised")
        }

        fn send_stats(&self, _: ServerStats) -> BoxFuture<'static, ApiResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn server_status(&self) -> BoxFuture<'static, ApiResult<ServerStats>> {
            unimplemented!("not exercised")
        }

        fn pending_votes(
            &self,
            _: Option<Uuid>,
        ) -> BoxFuture<'static, ApiResult<Vec<VoteEvent>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn claim_vote(&self, _: &str) -> BoxFuture<'static, ApiResult<ClaimResponse>> {
            Box::pin(async {
                Ok(ClaimResponse {
                    success: true,
                    message: None,
                    data: Some(ClaimData {
                        vote_id: 1,
                        minecraft_username: Some("Steve".to_string()),
                        commands: vec!["give {player} diamond 1".to_string()],
                    }),
                })
            })
        }

        fn leaderboard(
            &self,
            _: u32,
            _: u32,
        ) -> BoxFuture<'static, ApiResult<Vec<LeaderboardEntry>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn vote_link(&self) -> BoxFuture<'static, ApiResult<String>> {
            Box::pin(async { Ok(String::new()) })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Option<ConnectionCredentials>>,
    }

    impl CredentialsStore for MemoryStore {
        fn load(&self) -> Option<ConnectionCredentials> {
            self.saved.lock().unwrap().clone()
        }

        fn store(&self, credentials: &ConnectionCredentials) -> std::io::Result<()> {
            *self.saved.lock().unwrap() = Some(credentials.clone());
            Ok(())
        }

        fn clear(&self) -> std::io::Result<()> {
            self.saved.lock().unwrap().take();
            Ok(())
        }
    }

    fn dispatcher(
        server: Arc<RecordingServer>,
        store: Arc<MemoryStore>,
    ) -> (EventDispatcher, SharedState) {
        let state = AppState::new(Arc::new(AppConfig::default()));
        let claims = Arc::new(ClaimCoordinator::new(
            state.clone(),
            Arc::new(ClaimingBackend),
            server.clone(),
        ));
        (
            EventDispatcher::new(state.clone(), server, claims, store),
            state,
        )
    }

    fn vote(id: &str, player: &str) -> VoteEvent {
        VoteEvent {
            id: id.to_string(),
            player_uuid: None,
            player_name: player.to_string(),
            service_name: "mc-list".to_string(),
            timestamp: 0,
            claimed: false,
            rewards: Vec::new(),
        }
    }

    #[tokio::test]
    async fn vote_for_an_online_player_broadcasts_and_claims() {
        let server = RecordingServer::with_player("Steve");
        let (dispatcher, _state) = dispatcher(server.clone(), Arc::new(MemoryStore::default()));

        dispatcher
            .handle(ChannelEvent::VoteReceived(vote("v-1", "Steve")))
            .await;

        assert_eq!(
            server.broadcasts.lock().unwrap().as_slice(),
            ["Steve voted for the server on mc-list!"]
        );
        assert_eq!(
            server.commands.lock().unwrap().as_slice(),
            ["give Steve diamond 1"]
        );
    }

    #[tokio::test]
    async fn vote_for_an_offline_player_stays_pending() {
        let server = RecordingServer::empty();
        let (dispatcher, _state) = dispatcher(server.clone(), Arc::new(MemoryStore::default()));

        dispatcher
            .handle(ChannelEvent::VoteReceived(vote("v-1", "Steve")))
            .await;

        // Announced but not claimed.
        assert_eq!(server.broadcasts.lock().unwrap().len(), 1);
        assert!(server.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pairing_confirmation_links_and_persists() {
        let server = RecordingServer::empty();
        let store = Arc::new(MemoryStore::default());
        let (dispatcher, state) = dispatcher(server.clone(), store.clone());

        let pending = state.pairings().create_pairing("198.51.100.7", 25565);
        dispatcher
            .handle(ChannelEvent::PairingConfirmed(PairingResponse {
                success: true,
                message: None,
                data: Some(PairingData {
                    token: "tok-abc".to_string(),
                    server: Some(PairedServer {
                        id: 17,
                        name: None,
                        slug: None,
                    }),
                }),
            }))
            .await;

        assert!(state.is_linked().await);
        assert_eq!(
            store.load().unwrap().server_id(),
            "17"
        );
        assert!(state.pairings().get_pairing(&pending.code).is_none());
        assert_eq!(server.broadcasts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pairing_confirmation_without_credentials_is_ignored() {
        let server = RecordingServer::empty();
        let store = Arc::new(MemoryStore::default());
        let (dispatcher, state) = dispatcher(server, store.clone());

        dispatcher
            .handle(ChannelEvent::PairingConfirmed(PairingResponse {
                success: true,
                message: None,
                data: Some(PairingData {
                    token: "tok-abc".to_string(),
                    server: None,
                }),
            }))
            .await;

        assert!(!state.is_linked().await);
        assert!(store.load().is_none());
    }
}
