//! Coordination of vote claims and reward delivery.
//!
//! The backend is the single authority on whether a vote is claimed. The
//! coordinator performs exactly one cheap local pre-check (the event's own
//! `claimed` flag) and otherwise lets the backend arbitrate: a duplicate or
//! concurrent claim for the same vote id is simply refused server-side, so
//! at most one claim ever yields commands to execute.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    api::VoteBackend,
    dto::api::{ClaimData, VoteEvent},
    error::ServiceError,
    state::{GameServer, PlayerRef, SharedState},
};

/// Coordinates claim calls against the backend and delivers the rewards.
pub struct ClaimCoordinator {
    state: SharedState,
    backend: Arc<dyn VoteBackend>,
    server: Arc<dyn GameServer>,
}

impl ClaimCoordinator {
    /// Create a coordinator bound to the given backend and game server.
    pub fn new(
        state: SharedState,
        backend: Arc<dyn VoteBackend>,
        server: Arc<dyn GameServer>,
    ) -> Self {
        Self {
            state,
            backend,
            server,
        }
    }

    /// Claim a vote and deliver its rewards.
    ///
    /// Returns `Ok(true)` when a claim was initiated and accepted by the
    /// backend, `Ok(false)` when there was nothing to do: the event already
    /// carries the claimed flag, reward delivery is disabled, or the backend
    /// declined without an error body. A backend refusal with a message
    /// (typically "already claimed") surfaces as [`ServiceError::Rejected`]
    /// and is safe to ignore for duplicate deliveries.
    pub async fn claim(&self, vote: &VoteEvent) -> Result<bool, ServiceError> {
        if vote.claimed || !self.state.config().rewards_enabled {
            return Ok(false);
        }

        let response = self.backend.claim_vote(&vote.id).await?;

        if !response.success {
            match response.message {
                Some(message) => return Err(ServiceError::Rejected(message)),
                None => return Ok(false),
            }
        }

        match response.data {
            Some(data) => self.deliver(vote, data),
            None => {
                info!(vote_id = %vote.id, "vote claimed with no reward commands");
            }
        }
        Ok(true)
    }

    /// Execute the claim's command list for the target player.
    ///
    /// A player who disconnected between the vote and the claim response
    /// forfeits delivery; the backend already marked the vote claimed, so
    /// this is logged and abandoned rather than retried.
    fn deliver(&self, vote: &VoteEvent, data: ClaimData) {
        let name = data
            .minecraft_username
            .as_deref()
            .unwrap_or(&vote.player_name);

        let Some(player) = self.server.player_by_name(name) else {
            warn!(vote_id = %vote.id, player = %name, "player offline, skipping reward commands");
            return;
        };

        if data.commands.is_empty() {
            info!(vote_id = %vote.id, "vote claimed with no reward commands");
            return;
        }

        for command in &data.commands {
            let rendered = render_command(command, &player);
            if rendered.is_empty() {
                continue;
            }
            self.server.dispatch_console_command(&rendered);
        }
        info!(
            vote_id = %vote.id,
            player = %player.name,
            commands = data.commands.len(),
            "vote rewards delivered"
        );
    }
}

/// Substitute the `{player}` and `{uuid}` placeholders in a command template.
fn render_command(template: &str, player: &PlayerRef) -> String {
    template
        .replace("{player}", &player.name)
        .replace("{uuid}", &player.uuid.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::future::BoxFuture;
    use uuid::Uuid;

    use super::*;
    use crate::{
        api::{ApiError, ApiResult},
        config::AppConfig,
        dto::api::{
            ClaimResponse, LeaderboardEntry, PairingRequest, PairingResponse, ServerStats,
        },
        state::{AppState, ServerSnapshot},
    };

    /// Backend stub answering claims from a response queue; the last response
    /// repeats once the queue drains.
    struct StubBackend {
        responses: Mutex<Vec<ClaimResponse>>,
        claims: Mutex<Vec<String>>,
    }

    impl StubBackend {
        fn claiming(responses: Vec<ClaimResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                claims: Mutex::new(Vec::new()),
            })
        }
    }

    impl VoteBackend for StubBackend {
        fn pair(&self, _: PairingRequest) -> BoxFuture<'static, ApiResult<PairingResponse>> {
            Box::pin(async { Err(ApiError::NotLinked) })
        }

        fn send_stats(&self, _: ServerStats) -> BoxFuture<'static, ApiResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn server_status(&self) -> BoxFuture<'static, ApiResult<ServerStats>> {
            Box::pin(async { Err(ApiError::NotLinked) })
        }

        fn pending_votes(
            &self,
            _: Option<Uuid>,
        ) -> BoxFuture<'static, ApiResult<Vec<VoteEvent>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn claim_vote(&self, vote_id: &str) -> BoxFuture<'static, ApiResult<ClaimResponse>> {
            self.claims.lock().unwrap().push(vote_id.to_string());
            let mut responses = self.responses.lock().unwrap();
            let response = if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            };
            Box::pin(async move { Ok(response) })
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

    /// Game server stub with one online player and a command recorder.
    struct StubServer {
        online: Option<PlayerRef>,
        commands: Mutex<Vec<String>>,
    }

    impl StubServer {
        fn with_player(name: &str) -> Arc<Self> {
            Arc::new(Self {
                online: Some(PlayerRef {
                    name: name.to_string(),
                    uuid: Uuid::nil(),
                }),
                commands: Mutex::new(Vec::new()),
            })
        }

        fn empty() -> Arc<Self> {
            Arc::new(Self {
                online: None,
                commands: Mutex::new(Vec::new()),
            })
        }
    }

    impl GameServer for StubServer {
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

        fn broadcast_message(&self, _message: &str) {}

        fn snapshot(&self) -> ServerSnapshot {
            ServerSnapshot {
                ip: "127.0.0.1".into(),
                port: 25565,
                version: "1.21.4".into(),
                players_online: self.online.iter().count() as u32,
                max_players: 20,
                tps: 20.0,
            }
        }
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

    fn accepted_claim(commands: &[&str]) -> ClaimResponse {
        ClaimResponse {
            success: true,
            message: None,
            data: Some(ClaimData {
                vote_id: 1,
                minecraft_username: Some("Steve".to_string()),
                commands: commands.iter().map(|c| c.to_string()).collect(),
            }),
        }
    }

    fn refused_claim(message: &str) -> ClaimResponse {
        ClaimResponse {
            success: false,
            message: Some(message.to_string()),
            data: None,
        }
    }

    fn coordinator(
        backend: Arc<StubBackend>,
        server: Arc<StubServer>,
        config: AppConfig,
    ) -> ClaimCoordinator {
        ClaimCoordinator::new(AppState::new(Arc::new(config)), backend, server)
    }

    #[tokio::test]
    async fn successful_claim_dispatches_substituted_commands() {
        let backend = StubBackend::claiming(vec![accepted_claim(&[
            "give {player} diamond 1",
            "xp add {uuid} 50",
        ])]);
        let server = StubServer::with_player("Steve");
        let coordinator = coordinator(backend.clone(), server.clone(), AppConfig::default());

        let initiated = coordinator.claim(&vote("v-1", "Steve")).await.unwrap();
        assert!(initiated);

        let commands = server.commands.lock().unwrap().clone();
        assert_eq!(
            commands,
            vec![
                "give Steve diamond 1".to_string(),
                format!("xp add {} 50", Uuid::nil()),
            ]
        );
    }

    #[tokio::test]
    async fn already_claimed_votes_are_skipped_without_a_backend_call() {
        let backend = StubBackend::claiming(vec![accepted_claim(&[])]);
        let server = StubServer::with_player("Steve");
        let coordinator = coordinator(backend.clone(), server, AppConfig::default());

        let mut claimed = vote("v-1", "Steve");
        claimed.claimed = true;
        assert!(!coordinator.claim(&claimed).await.unwrap());
        assert!(backend.claims.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_rewards_skip_the_claim() {
        let backend = StubBackend::claiming(vec![accepted_claim(&[])]);
        let server = StubServer::with_player("Steve");
        let config = AppConfig {
            rewards_enabled: false,
            ..AppConfig::default()
        };
        let coordinator = coordinator(backend.clone(), server, config);

        assert!(!coordinator.claim(&vote("v-1", "Steve")).await.unwrap());
        assert!(backend.claims.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_player_skips_delivery_but_the_claim_stands() {
        let backend = StubBackend::claiming(vec![accepted_claim(&["give {player} diamond 1"])]);
        let server = StubServer::empty();
        let coordinator = coordinator(backend.clone(), server.clone(), AppConfig::default());

        let initiated = coordinator.claim(&vote("v-1", "Steve")).await.unwrap();
        assert!(initiated);
        assert!(server.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn backend_rejection_message_surfaces_as_an_error() {
        let backend = StubBackend::claiming(vec![refused_claim("vote already claimed")]);
        let server = StubServer::with_player("Steve");
        let coordinator = coordinator(backend, server, AppConfig::default());

        let err = coordinator.claim(&vote("v-1", "Steve")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(m) if m == "vote already claimed"));
    }

    #[tokio::test]
    async fn duplicate_claims_both_reach_the_backend_but_only_one_delivers() {
        let backend = StubBackend::claiming(vec![
            accepted_claim(&["give {player} diamond 1"]),
            refused_claim("vote already claimed"),
        ]);
        let server = StubServer::with_player("Steve");
        let coordinator = coordinator(backend.clone(), server.clone(), AppConfig::default());

        // No local short-circuit: both calls must hit the backend, which
        // arbitrates. Only the accepted one executes commands.
        let first = coordinator.claim(&vote("v-1", "Steve")).await;
        let second = coordinator.claim(&vote("v-1", "Steve")).await;

        assert!(matches!(first, Ok(true)));
        assert!(matches!(second, Err(ServiceError::Rejected(_))));
        assert_eq!(backend.claims.lock().unwrap().len(), 2);
        assert_eq!(server.commands.lock().unwrap().len(), 1);
    }

    #[test]
    fn render_substitutes_both_placeholders() {
        let player = PlayerRef {
            name: "Alex".to_string(),
            uuid: Uuid::nil(),
        };
        assert_eq!(
            render_command("tell {player} your id is {uuid}", &player),
            format!("tell Alex your id is {}", Uuid::nil())
        );
    }
}
