//! Library crate for vote-bridge, linking a game server to a remote
//! vote-tracking backend: realtime push channel with a polling fallback,
//! pairing-code issuance, and idempotent reward claims.

pub mod api;
pub mod config;
pub mod dto;
pub mod error;
pub mod services;
pub mod state;
