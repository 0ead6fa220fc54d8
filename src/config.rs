//! Application-level configuration loading and the file-backed credentials store.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::{ConnectionCredentials, CredentialsStore};

/// Default location on disk where the bridge looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/bridge.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "VOTE_BRIDGE_CONFIG_PATH";

/// Immutable runtime configuration shared across the bridge.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the backend HTTP API.
    pub api_base_url: String,
    /// Base URL of the backend realtime endpoint.
    pub websocket_url: String,
    /// Whether the realtime channel should be used at all.
    pub websocket_enabled: bool,
    /// Display name reported with server stats.
    pub server_name: String,
    /// Whether reward delivery is active.
    pub rewards_enabled: bool,
    /// Whether incoming votes are announced in chat.
    pub broadcast_votes: bool,
    /// Whether periodic stats pushes are active.
    pub stats_enabled: bool,
    /// Seconds between stats pushes.
    pub stats_sync_interval_secs: u64,
    /// Seconds between vote polls when the realtime channel is disabled.
    pub vote_poll_interval_secs: u64,
    /// Whether join-time vote reminders are shown by the command surface.
    pub reminders_enabled: bool,
    /// Seconds to wait after a player joins before reminding them.
    pub reminder_join_delay_secs: u64,
    /// Where paired credentials are persisted.
    pub credentials_path: PathBuf,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults
    /// when the file is missing or unparsable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded bridge configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Whether the realtime channel is usable: enabled and a URL is set.
    pub fn websocket_active(&self) -> bool {
        self.websocket_enabled && !self.websocket_url.trim().is_empty()
    }

    /// Interval between stats pushes.
    pub fn stats_sync_interval(&self) -> Duration {
        Duration::from_secs(self.stats_sync_interval_secs.max(1))
    }

    /// Interval between vote polls.
    pub fn vote_poll_interval(&self) -> Duration {
        Duration::from_secs(self.vote_poll_interval_secs.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".into(),
            websocket_url: "ws://localhost:8000".into(),
            websocket_enabled: true,
            server_name: "Unnamed Server".into(),
            rewards_enabled: true,
            broadcast_votes: true,
            stats_enabled: true,
            stats_sync_interval_secs: 60,
            vote_poll_interval_secs: 10,
            reminders_enabled: true,
            reminder_join_delay_secs: 5,
            credentials_path: PathBuf::from("config/credentials.json"),
        }
    }
}

/// JSON representation of the configuration file; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    api_base_url: Option<String>,
    websocket_url: Option<String>,
    websocket_enabled: Option<bool>,
    server_name: Option<String>,
    rewards_enabled: Option<bool>,
    broadcast_votes: Option<bool>,
    stats_enabled: Option<bool>,
    stats_sync_interval_secs: Option<u64>,
    vote_poll_interval_secs: Option<u64>,
    reminders_enabled: Option<bool>,
    reminder_join_delay_secs: Option<u64>,
    credentials_path: Option<PathBuf>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            api_base_url: raw.api_base_url.unwrap_or(defaults.api_base_url),
            websocket_url: raw.websocket_url.unwrap_or(defaults.websocket_url),
            websocket_enabled: raw.websocket_enabled.unwrap_or(defaults.websocket_enabled),
            server_name: raw.server_name.unwrap_or(defaults.server_name),
            rewards_enabled: raw.rewards_enabled.unwrap_or(defaults.rewards_enabled),
            broadcast_votes: raw.broadcast_votes.unwrap_or(defaults.broadcast_votes),
            stats_enabled: raw.stats_enabled.unwrap_or(defaults.stats_enabled),
            stats_sync_interval_secs: raw
                .stats_sync_interval_secs
                .unwrap_or(defaults.stats_sync_interval_secs),
            vote_poll_interval_secs: raw
                .vote_poll_interval_secs
                .unwrap_or(defaults.vote_poll_interval_secs),
            reminders_enabled: raw.reminders_enabled.unwrap_or(defaults.reminders_enabled),
            reminder_join_delay_secs: raw
                .reminder_join_delay_secs
                .unwrap_or(defaults.reminder_join_delay_secs),
            credentials_path: raw.credentials_path.unwrap_or(defaults.credentials_path),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Credentials persisted as a small JSON file next to the configuration.
#[derive(Debug, Clone)]
pub struct FileCredentialsStore {
    path: PathBuf,
}

impl FileCredentialsStore {
    /// Create a store writing to the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialsStore for FileCredentialsStore {
    fn load(&self) -> Option<ConnectionCredentials> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read credentials file");
                return None;
            }
        };

        match serde_json::from_str::<StoredCredentials>(&contents) {
            // Re-validate through the smart constructor so a hand-edited file
            // with a blank half counts as unlinked.
            Ok(stored) => ConnectionCredentials::new(stored.server_id, stored.server_token),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to parse credentials file");
                None
            }
        }
    }

    fn store(&self, credentials: &ConnectionCredentials) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(credentials)
            .map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err))?;
        fs::write(&self.path, payload)
    }

    fn clear(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// On-disk shape of the credentials file.
#[derive(Debug, Deserialize)]
struct StoredCredentials {
    #[serde(default)]
    server_id: String,
    #[serde(default)]
    server_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> FileCredentialsStore {
        let path = env::temp_dir().join(format!("vote-bridge-creds-{}.json", uuid::Uuid::new_v4()));
        FileCredentialsStore::new(path)
    }

    #[test]
    fn raw_config_overrides_only_present_fields() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"api_base_url": "https://votes.example", "vote_poll_interval_secs": 30}"#)
                .unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.api_base_url, "https://votes.example");
        assert_eq!(config.vote_poll_interval(), Duration::from_secs(30));
        assert_eq!(config.stats_sync_interval(), Duration::from_secs(60));
        assert!(config.websocket_active());
    }

    #[test]
    fn blank_websocket_url_disables_the_channel() {
        let config = AppConfig {
            websocket_url: "  ".into(),
            ..AppConfig::default()
        };
        assert!(!config.websocket_active());
    }

    #[test]
    fn credentials_round_trip_through_the_file_store() {
        let store = temp_store();
        assert!(store.load().is_none());

        let credentials = ConnectionCredentials::new("17", "tok-abc").unwrap();
        store.store(&credentials).unwrap();
        assert_eq!(store.load(), Some(credentials));

        store.clear().unwrap();
        assert!(store.load().is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn partial_credentials_file_counts_as_unlinked() {
        let store = temp_store();
        fs::write(&store.path, r#"{"server_id": "17", "server_token": ""}"#).unwrap();
        assert!(store.load().is_none());
        store.clear().unwrap();
    }
}
