//! Assembly of the server health snapshot pushed to the backend.

use crate::{
    dto::api::ServerStats,
    error::ServiceError,
    state::{AppState, GameServer},
};

/// Highest TPS value ever reported; the game engine idles at 20.
const TPS_CAP: f64 = 20.0;

/// Build the stats payload for the current moment.
///
/// Fails with [`ServiceError::NotLinked`] when no credentials are stored,
/// since the payload carries the backend server id.
pub async fn collect_stats(
    state: &AppState,
    server: &dyn GameServer,
) -> Result<ServerStats, ServiceError> {
    let credentials = state.credentials().await.ok_or(ServiceError::NotLinked)?;
    let snapshot = server.snapshot();

    Ok(ServerStats {
        server_id: credentials.server_id().to_string(),
        name: state.config().server_name.clone(),
        ip: snapshot.ip,
        port: snapshot.port,
        version: snapshot.version,
        players_online: snapshot.players_online,
        max_players: snapshot.max_players,
        // A momentary spike above 20 is measurement noise, not real capacity.
        tps: snapshot.tps.min(TPS_CAP),
        uptime: state.uptime_secs(),
        plugin_version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{ConnectionCredentials, PlayerRef, ServerSnapshot},
    };

    struct FixedServer {
        snapshot: ServerSnapshot,
    }

    impl GameServer for FixedServer {
        fn player_by_name(&self, _name: &str) -> Option<PlayerRef> {
            None
        }

        fn is_online(&self, _player: &PlayerRef) -> bool {
            false
        }

        fn dispatch_console_command(&self, _command: &str) {}

        fn broadcast_message(&self, _message: &str) {}

        fn snapshot(&self) -> ServerSnapshot {
            self.snapshot.clone()
        }
    }

    fn server_with_tps(tps: f64) -> FixedServer {
        FixedServer {
            snapshot: ServerSnapshot {
                ip: "198.51.100.7".into(),
                port: 25565,
                version: "1.21.4".into(),
                players_online: 12,
                max_players: 100,
                tps,
            },
        }
    }

    #[tokio::test]
    async fn stats_require_credentials() {
        let state = AppState::new(Arc::new(AppConfig::default()));
        let err = collect_stats(&state, &server_with_tps(19.7)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotLinked));
    }

    #[tokio::test]
    async fn stats_carry_the_snapshot_and_cap_tps() {
        let state = AppState::new(Arc::new(AppConfig::default()));
        state
            .set_credentials(ConnectionCredentials::new("17", "tok").unwrap())
            .await;

        let stats = collect_stats(&state, &server_with_tps(20.3)).await.unwrap();
        assert_eq!(stats.server_id, "17");
        assert_eq!(stats.players_online, 12);
        assert_eq!(stats.tps, 20.0);
        assert_eq!(stats.plugin_version, env!("CARGO_PKG_VERSION"));

        let stats = collect_stats(&state, &server_with_tps(18.4)).await.unwrap();
        assert_eq!(stats.tps, 18.4);
    }
}
