//! HTTP gateway to the vote backend.

/// reqwest implementation of the backend gateway.
pub mod client;
/// Error classification for backend calls.
pub mod error;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dto::api::{
    ClaimResponse, LeaderboardEntry, PairingRequest, PairingResponse, ServerStats, VoteEvent,
};

pub use self::client::ApiClient;
pub use self::error::{ApiError, ApiResult};

/// Abstraction over the backend request/response calls.
///
/// Every method resolves to an [`ApiResult`] rather than panicking or
/// propagating transport details: callers only ever see the uniform error
/// classification from [`error`].
pub trait VoteBackend: Send + Sync {
    /// Exchange a dashboard pairing code for server credentials.
    fn pair(&self, request: PairingRequest) -> BoxFuture<'static, ApiResult<PairingResponse>>;

    /// Push a server health snapshot.
    fn send_stats(&self, stats: ServerStats) -> BoxFuture<'static, ApiResult<()>>;

    /// Fetch the backend's view of this server's health.
    fn server_status(&self) -> BoxFuture<'static, ApiResult<ServerStats>>;

    /// Fetch votes not yet claimed, optionally filtered to one player.
    fn pending_votes(
        &self,
        player: Option<Uuid>,
    ) -> BoxFuture<'static, ApiResult<Vec<VoteEvent>>>;

    /// Atomically mark a vote claimed and fetch its reward commands.
    fn claim_vote(&self, vote_id: &str) -> BoxFuture<'static, ApiResult<ClaimResponse>>;

    /// Fetch one page of the voter leaderboard.
    fn leaderboard(
        &self,
        page: u32,
        per_page: u32,
    ) -> BoxFuture<'static, ApiResult<Vec<LeaderboardEntry>>>;

    /// Fetch the public vote URL for this server.
    fn vote_link(&self) -> BoxFuture<'static, ApiResult<String>>;
}
