//! Wire models exchanged with the vote backend over HTTP.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::ConnectionCredentials;

/// A vote registered on the backend, delivered via push or poll.
///
/// The `claimed` flag is authoritative on the backend only; the bridge never
/// flips it locally.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VoteEvent {
    /// Backend-assigned, globally unique vote identifier.
    pub id: String,
    /// UUID of the voting player, when the backend knows it.
    #[serde(default)]
    pub player_uuid: Option<Uuid>,
    /// In-game name of the voting player.
    pub player_name: String,
    /// Name of the vote site the vote came from.
    pub service_name: String,
    /// Unix timestamp of the vote.
    #[serde(default)]
    pub timestamp: i64,
    /// Whether the backend already granted this vote's rewards.
    #[serde(default)]
    pub claimed: bool,
    /// Reward directives attached to the vote, in grant order.
    #[serde(default)]
    pub rewards: Vec<RewardDirective>,
}

/// One unit of reward instruction within a vote's reward set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RewardDirective {
    /// Directive identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Identifier of the parent vote.
    #[serde(default)]
    pub vote_id: Option<String>,
    /// What kind of reward this directive grants.
    #[serde(rename = "type")]
    pub kind: RewardKind,
    /// Console command template for [`RewardKind::Command`] directives.
    #[serde(default)]
    pub command: Option<String>,
    /// Item name for [`RewardKind::Item`] directives.
    #[serde(default)]
    pub item: Option<String>,
    /// Amount of items, currency, or experience to grant.
    #[serde(default)]
    pub amount: i64,
    /// Optional message shown to the player on grant.
    #[serde(default)]
    pub message: Option<String>,
    /// Whether this directive was already granted.
    #[serde(default)]
    pub claimed: bool,
}

/// Reward directive kinds understood by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    /// Run a console command.
    Command,
    /// Give an item stack.
    Item,
    /// Credit in-game currency.
    Money,
    /// Grant experience points.
    Experience,
    /// Grant a permission node.
    Permission,
}

/// Body of the `POST /servers/pair` call.
#[derive(Debug, Clone, Serialize)]
pub struct PairingRequest {
    /// Code displayed on the backend dashboard, entered by the operator.
    pub pairing_code: String,
    /// Public IP the backend should record for this server.
    pub server_ip: String,
    /// Public port the backend should record for this server.
    pub server_port: u16,
    /// Game version the server is running.
    pub minecraft_version: String,
    /// Bridge version, for compatibility tracking on the backend.
    pub plugin_version: String,
}

/// Backend response to a pairing call or a `pairing.confirmed` push message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PairingResponse {
    /// Whether the pairing succeeded.
    pub success: bool,
    /// Human-readable outcome message.
    #[serde(default)]
    pub message: Option<String>,
    /// Issued credentials, present on success.
    #[serde(default)]
    pub data: Option<PairingData>,
}

/// Credentials section of a successful pairing response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PairingData {
    /// Bearer token for all subsequent authenticated calls.
    pub token: String,
    /// Backend-side identity of the paired server.
    #[serde(default)]
    pub server: Option<PairedServer>,
}

/// Backend-side record of the paired server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PairedServer {
    /// Numeric backend identifier.
    pub id: i64,
    /// Display name on the backend.
    #[serde(default)]
    pub name: Option<String>,
    /// URL slug on the backend.
    #[serde(default)]
    pub slug: Option<String>,
}

impl PairingResponse {
    /// Extract connection credentials from a successful pairing response.
    ///
    /// Returns `None` when the response is missing either half of the pair;
    /// partial credentials are never stored.
    pub fn credentials(&self) -> Option<ConnectionCredentials> {
        let data = self.data.as_ref()?;
        let server = data.server.as_ref()?;
        ConnectionCredentials::new(server.id.to_string(), data.token.clone())
    }
}

/// Backend response to a vote claim.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClaimResponse {
    /// Whether the claim was accepted.
    pub success: bool,
    /// Human-readable outcome message (e.g. "vote already claimed").
    #[serde(default)]
    pub message: Option<String>,
    /// Instruction set to execute, present on success.
    #[serde(default)]
    pub data: Option<ClaimData>,
}

/// Authoritative instruction set returned by a successful claim.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClaimData {
    /// Identifier of the claimed vote.
    #[serde(default)]
    pub vote_id: i64,
    /// Player the commands target.
    #[serde(default)]
    pub minecraft_username: Option<String>,
    /// Console commands to execute, in order.
    #[serde(default)]
    pub commands: Vec<String>,
}

/// One row of the voter leaderboard.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LeaderboardEntry {
    /// Rank, starting at 1.
    pub position: u32,
    /// UUID of the player, when known.
    #[serde(default)]
    pub player_uuid: Option<Uuid>,
    /// In-game name of the player.
    pub player_name: String,
    /// Total number of votes.
    pub votes: u32,
    /// Unix timestamp of the most recent vote.
    #[serde(default)]
    pub last_vote: i64,
}

/// Server health snapshot pushed to the backend on every stats sync.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerStats {
    /// Backend identifier of this server.
    pub server_id: String,
    /// Configured display name.
    pub name: String,
    /// Bind address of the game server.
    pub ip: String,
    /// Bind port of the game server.
    pub port: u16,
    /// Game version the server is running.
    pub version: String,
    /// Players currently connected.
    pub players_online: u32,
    /// Configured player capacity.
    pub max_players: u32,
    /// Average ticks per second, capped at 20.
    pub tps: f64,
    /// Seconds since the bridge started.
    pub uptime: u64,
    /// Bridge version.
    pub plugin_version: String,
}
