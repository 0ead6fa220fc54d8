//! Periodic background loops: the vote-poll fallback and the stats reporter.
//!
//! Polling exists for deployments where the realtime channel is disabled;
//! votes it finds flow through the same event queue as pushed ones, so the
//! claim path cannot tell the two apart. The stats reporter runs either way.

use std::sync::Arc;

use tokio::{
    sync::{mpsc, watch},
    time::sleep,
};
use tracing::{debug, info, warn};

use crate::{
    api::VoteBackend,
    services::{events::ChannelEvent, stats::collect_stats},
    state::{GameServer, SharedState},
};

/// Grace period before the first vote poll after startup.
const VOTE_POLL_INITIAL_DELAY_SECS: u64 = 3;
/// Grace period before the first stats push after startup.
const STATS_INITIAL_DELAY_SECS: u64 = 5;

/// Poll the backend for pending votes on the configured interval.
///
/// Only runs the request when the server is linked. Unclaimed votes whose
/// player is currently online are forwarded as
/// [`ChannelEvent::VoteReceived`]; votes for offline players are left on the
/// backend for a later tick. A failed poll is logged and the next tick
/// retries from scratch. Exits when the shutdown signal fires or the event
/// queue closes.
pub async fn run_vote_poll(
    state: SharedState,
    backend: Arc<dyn VoteBackend>,
    server: Arc<dyn GameServer>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        interval_secs = state.config().vote_poll_interval_secs,
        "vote polling active"
    );
    tokio::select! {
        _ = sleep(std::time::Duration::from_secs(VOTE_POLL_INITIAL_DELAY_SECS)) => {}
        _ = shutdown.changed() => return,
    }

    loop {
        if *shutdown.borrow() {
            return;
        }

        if state.is_linked().await {
            match backend.pending_votes(None).await {
                Ok(votes) => {
                    for vote in votes {
                        if vote.claimed {
                            continue;
                        }
                        if server.player_by_name(&vote.player_name).is_none() {
                            debug!(
                                vote_id = %vote.id,
                                player = %vote.player_name,
                                "voter offline, leaving the vote for a later poll"
                            );
                            continue;
                        }
                        if events.send(ChannelEvent::VoteReceived(vote)).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => warn!(error = %err, "vote poll failed"),
            }
        } else {
            debug!("server not linked, skipping vote poll");
        }

        tokio::select! {
            _ = sleep(state.config().vote_poll_interval()) => {}
            result = shutdown.changed() => {
                // A dropped sender means shutdown; otherwise the loop top
                // checks the flag.
                if result.is_err() {
                    return;
                }
            }
        }
    }
}

/// Push a server health snapshot on the configured interval.
///
/// Skips quietly while the server is unlinked; a push failure is logged and
/// retried on the next tick.
pub async fn run_stats_sync(
    state: SharedState,
    backend: Arc<dyn VoteBackend>,
    server: Arc<dyn GameServer>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        interval_secs = state.config().stats_sync_interval_secs,
        "stats reporting active"
    );
    tokio::select! {
        _ = sleep(std::time::Duration::from_secs(STATS_INITIAL_DELAY_SECS)) => {}
        _ = shutdown.changed() => return,
    }

    loop {
        if *shutdown.borrow() {
            return;
        }

        match collect_stats(&state, server.as_ref()).await {
            Ok(stats) => {
                let players = stats.players_online;
                match backend.send_stats(stats).await {
                    Ok(()) => debug!(players_online = players, "stats pushed"),
                    Err(err) => warn!(error = %err, "stats push failed"),
                }
            }
            Err(_) => debug!("server not linked, skipping stats push"),
        }

        tokio::select! {
            _ = sleep(state.config().stats_sync_interval()) => {}
            result = shutdown.changed() => {
                if result.is_err() {
                    return;
                }
            }
        }
    }
}
