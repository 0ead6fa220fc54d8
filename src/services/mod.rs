//! Long-running services and coordinators of the bridge.

/// Claim coordination and reward delivery.
pub mod claims;
/// Event queue shared by the realtime channel and the poller.
pub mod events;
/// Issuance of short-lived pairing codes.
pub mod pairing;
/// Fallback vote polling and periodic stats reporting.
pub mod poller;
/// Realtime WebSocket channel to the backend.
pub mod realtime;
/// Server health snapshot assembly.
pub mod stats;
