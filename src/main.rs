//! Vote bridge binary entrypoint wiring the realtime channel, pollers, and
//! claim pipeline together.

use std::{env, sync::Arc};

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vote_bridge::{
    api::ApiClient,
    config::{AppConfig, FileCredentialsStore},
    services::{
        claims::ClaimCoordinator,
        events::EventDispatcher,
        poller::{run_stats_sync, run_vote_poll},
        realtime::RealtimeChannel,
    },
    state::{AppState, CredentialsStore, GameServer, PlayerRef, ServerSnapshot},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::load());
    let state = AppState::new(config.clone());

    let store: Arc<dyn CredentialsStore> =
        Arc::new(FileCredentialsStore::new(&config.credentials_path));
    if let Some(credentials) = store.load() {
        info!(server_id = %credentials.server_id(), "loaded stored credentials, server is linked");
        state.set_credentials(credentials).await;
    }

    let server: Arc<dyn GameServer> = Arc::new(HeadlessServer::from_env());
    let backend = Arc::new(ApiClient::new(state.clone()).context("building the backend client")?);
    let claims = Arc::new(ClaimCoordinator::new(
        state.clone(),
        backend.clone(),
        server.clone(),
    ));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let dispatcher = EventDispatcher::new(state.clone(), server.clone(), claims, store.clone());
    tokio::spawn(dispatcher.run(events_rx));

    let (shutdown_tx, _) = watch::channel(false);
    let realtime = RealtimeChannel::new(state.clone(), events_tx.clone());

    if config.websocket_active() {
        realtime.connect();
        if !state.is_linked().await {
            let snapshot = server.snapshot();
            let session = state
                .pairings()
                .create_pairing(&snapshot.ip, snapshot.port);
            info!(
                code = %session.formatted_code(),
                url = %session.pairing_url(&config.api_base_url),
                "server not linked; enter this pairing code on the dashboard"
            );
            realtime.connect_for_pairing(&session.code, &session.validation_token);
        }
    } else {
        tokio::spawn(run_vote_poll(
            state.clone(),
            backend.clone(),
            server.clone(),
            events_tx.clone(),
            shutdown_tx.subscribe(),
        ));
    }

    if config.stats_enabled {
        tokio::spawn(run_stats_sync(
            state.clone(),
            backend,
            server,
            shutdown_tx.subscribe(),
        ));
    }

    shutdown_signal().await;
    info!("shutting down");
    realtime.disconnect();
    shutdown_tx.send_replace(true);

    Ok(())
}

/// Stand-in for a real game server when the bridge runs as its own process.
///
/// Reward commands and chat broadcasts are logged instead of executed; no
/// players are ever online, so votes stay pending on the backend until a
/// real host claims them.
struct HeadlessServer {
    ip: String,
    port: u16,
    version: String,
}

impl HeadlessServer {
    fn from_env() -> Self {
        let ip = env::var("SERVER_IP").unwrap_or_else(|_| "0.0.0.0".into());
        let port = env::var("SERVER_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(25565);
        let version = env::var("GAME_VERSION").unwrap_or_else(|_| "unknown".into());
        Self { ip, port, version }
    }
}

impl GameServer for HeadlessServer {
    fn player_by_name(&self, _name: &str) -> Option<PlayerRef> {
        None
    }

    fn is_online(&self, _player: &PlayerRef) -> bool {
        false
    }

    fn dispatch_console_command(&self, command: &str) {
        info!(%command, "console command (headless, not executed)");
    }

    fn broadcast_message(&self, message: &str) {
        info!(%message, "broadcast");
    }

    fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            ip: self.ip.clone(),
            port: self.port,
            version: self.version.clone(),
            players_online: 0,
            max_players: 0,
            tps: 20.0,
        }
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the bridge down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
