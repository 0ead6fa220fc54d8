//! Data transfer models for the backend HTTP API and the realtime channel.

pub mod api;
pub mod ws;
