//! Seam between the bridge and the host game server.
//!
//! The bridge never touches game state directly: player lookups, privileged
//! command execution, and chat all go through [`GameServer`]. Implementations
//! are expected to serialize their effects onto the game's own execution
//! context, so the bridge can call them from any task.

use uuid::Uuid;

/// Identity of a player as known to the host game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRef {
    /// In-game name.
    pub name: String,
    /// Stable unique identifier.
    pub uuid: Uuid,
}

/// Point-in-time view of the game server used for stats reporting.
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
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
    /// Average ticks per second.
    pub tps: f64,
}

/// Capabilities the bridge consumes from the host game server.
pub trait GameServer: Send + Sync {
    /// Look up a connected player by name, case-insensitively.
    fn player_by_name(&self, name: &str) -> Option<PlayerRef>;

    /// Whether the given player is connected right now.
    fn is_online(&self, player: &PlayerRef) -> bool;

    /// Execute a command with console privilege.
    fn dispatch_console_command(&self, command: &str);

    /// Send a chat message to every connected player.
    fn broadcast_message(&self, message: &str);

    /// Collect the current health snapshot.
    fn snapshot(&self) -> ServerSnapshot;
}
