//! Application configuration management.
//!
//! Handles loading, saving, and accessing application configuration including
//! platform credentials, socket reconnect policy, chat options and
//! event-notification options. Configuration is persisted as TOML on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{LwError, LwResult};
use crate::platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Platform account credentials.
    #[serde(default)]
    pub twitch: TwitchConfig,

    /// REST API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Socket reconnect policy.
    #[serde(default)]
    pub socket: SocketConfig,

    /// Chat client settings.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Event-notification client settings.
    #[serde(default)]
    pub eventsub: EventSubConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Platform account credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwitchConfig {
    /// Application client id sent with every REST request.
    #[serde(default)]
    pub client_id: String,

    /// User access token (without the `oauth:` prefix).
    #[serde(default)]
    pub access_token: String,

    /// Login name of the authenticated user. Empty means anonymous chat.
    #[serde(default)]
    pub login: String,
}

/// REST API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API.
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Request timeout in milliseconds.
    #[serde(default = "default_api_timeout")]
    pub timeout_ms: u64,
}

/// Socket reconnect policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Maximum number of reconnect attempts before giving up.
    #[serde(default = "default_reconnect_limit")]
    pub reconnect_limit: u32,

    /// Base reconnect interval in milliseconds.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Retry the first reconnect immediately instead of after one interval.
    #[serde(default = "default_true")]
    pub immediate_first_retry: bool,
}

/// Chat client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Chat WebSocket endpoint.
    #[serde(default = "default_chat_url")]
    pub url: String,

    /// Channel joined automatically after authentication.
    #[serde(default)]
    pub channel: String,

    /// Capabilities requested on connect.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,

    /// Logins whose messages are hidden (unless moderator or owner).
    #[serde(default)]
    pub blocked_users: Vec<String>,

    /// Words that hide a message when present in its body.
    #[serde(default)]
    pub muted_words: Vec<String>,

    /// Match muted words as whole words instead of substrings.
    #[serde(default = "default_true")]
    pub match_whole_word: bool,
}

/// Event-notification client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubConfig {
    /// Event-notification WebSocket endpoint.
    #[serde(default = "default_eventsub_url")]
    pub url: String,

    /// Timeout for each subscription deletion during teardown, in milliseconds.
    #[serde(default = "default_cleanup_per_delete")]
    pub cleanup_per_delete_ms: u64,

    /// Overall teardown cleanup budget, in milliseconds.
    #[serde(default = "default_cleanup_total")]
    pub cleanup_total_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

// Default value functions for serde

fn default_api_base_url() -> String {
    "https://api.twitch.tv/helix".to_string()
}

fn default_api_timeout() -> u64 {
    constants::DEFAULT_API_TIMEOUT_MS
}

fn default_reconnect_limit() -> u32 {
    constants::DEFAULT_RECONNECT_LIMIT
}

fn default_reconnect_interval() -> u64 {
    constants::DEFAULT_RECONNECT_INTERVAL_MS
}

fn default_true() -> bool {
    true
}

fn default_chat_url() -> String {
    constants::chat::DEFAULT_URL.to_string()
}

fn default_capabilities() -> Vec<String> {
    constants::chat::DEFAULT_CAPABILITIES
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_eventsub_url() -> String {
    constants::eventsub::DEFAULT_URL.to_string()
}

fn default_cleanup_per_delete() -> u64 {
    constants::eventsub::CLEANUP_PER_DELETE_MS
}

fn default_cleanup_total() -> u64 {
    constants::eventsub::CLEANUP_TOTAL_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            timeout_ms: default_api_timeout(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            reconnect_limit: default_reconnect_limit(),
            reconnect_interval_ms: default_reconnect_interval(),
            immediate_first_retry: true,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: default_chat_url(),
            channel: String::new(),
            capabilities: default_capabilities(),
            blocked_users: Vec::new(),
            muted_words: Vec::new(),
            match_whole_word: true,
        }
    }
}

impl Default for EventSubConfig {
    fn default() -> Self {
        Self {
            url: default_eventsub_url(),
            cleanup_per_delete_ms: default_cleanup_per_delete(),
            cleanup_total_ms: default_cleanup_total(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> LwResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> LwResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file path.
    pub fn save_default(&self) -> LwResult<()> {
        let path = Self::default_config_path()?;
        self.save_to_file(&path)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> LwResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| LwError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> LwResult<PathBuf> {
        Ok(platform::config_dir()?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> LwResult<PathBuf> {
        if self.logging.directory.is_empty() {
            platform::default_log_dir()
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Whether credentials for authenticated chat and REST calls are present.
    pub fn is_authenticated(&self) -> bool {
        !self.twitch.access_token.is_empty() && !self.twitch.login.is_empty()
    }

    /// Normalize a channel name to carry exactly one leading `#`, lowercased.
    ///
    /// Returns an empty string for blank input.
    pub fn normalize_channel(channel: &str) -> String {
        let bare = channel.trim().trim_start_matches('#');
        if bare.is_empty() {
            return String::new();
        }
        format!("#{}", bare.to_lowercase())
    }

    /// Sanitize a WebSocket URL.
    ///
    /// Trims quotes and whitespace, maps http(s) schemes to ws(s), defaults to
    /// `wss://` when no scheme is given, and strips a trailing slash.
    pub fn sanitize_ws_url(url: &str) -> String {
        let trimmed = url.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
            trimmed.to_string()
        } else if let Some(rest) = trimmed.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = trimmed.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("wss://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}

/// Thread-safe configuration holder for shared access across services.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Clone out the current configuration.
    pub async fn snapshot(&self) -> AppConfig {
        self.inner.read().await.clone()
    }

    /// Save the current configuration to disk.
    pub async fn save(&self) -> LwResult<()> {
        let config = self.inner.read().await;
        config.save_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.api.timeout_ms, 10_000);
        assert_eq!(config.socket.reconnect_limit, 20);
        assert_eq!(config.socket.reconnect_interval_ms, 5_000);
        assert!(config.socket.immediate_first_retry);
        assert_eq!(config.chat.url, "wss://irc-ws.chat.twitch.tv:443");
        assert_eq!(config.eventsub.cleanup_total_ms, 5_000);
        assert_eq!(config.logging.level, "info");
        assert!(!config.is_authenticated());
    }

    #[test]
    fn test_normalize_channel() {
        assert_eq!(AppConfig::normalize_channel("foo"), "#foo");
        assert_eq!(AppConfig::normalize_channel("#foo"), "#foo");
        assert_eq!(AppConfig::normalize_channel("##Foo "), "#foo");
        assert_eq!(AppConfig::normalize_channel("  "), "");
        assert_eq!(AppConfig::normalize_channel("#"), "");
    }

    #[test]
    fn test_sanitize_ws_url() {
        assert_eq!(
            AppConfig::sanitize_ws_url("eventsub.wss.twitch.tv/ws/"),
            "wss://eventsub.wss.twitch.tv/ws"
        );
        assert_eq!(
            AppConfig::sanitize_ws_url("http://localhost:8080"),
            "ws://localhost:8080"
        );
        assert_eq!(
            AppConfig::sanitize_ws_url("  \"https://example.com/\"  "),
            "wss://example.com"
        );
        assert_eq!(AppConfig::sanitize_ws_url("ws://a"), "ws://a");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [chat]
            channel = "foo"
            muted_words = ["spoiler"]
            "#,
        )
        .unwrap();
        assert_eq!(config.chat.channel, "foo");
        assert_eq!(config.chat.capabilities.len(), 3);
        assert!(config.chat.match_whole_word);
        assert_eq!(config.socket.reconnect_limit, 20);
    }

    #[test]
    fn test_roundtrip_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.twitch.login = "viewer".into();
        config.socket.reconnect_limit = 3;
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.twitch.login, "viewer");
        assert_eq!(loaded.socket.reconnect_limit, 3);
    }

    #[tokio::test]
    async fn test_config_handle_write_then_read() {
        let handle = ConfigHandle::new(AppConfig::default());
        handle.write().await.chat.channel = "bar".into();
        assert_eq!(handle.read().await.chat.channel, "bar");
        assert_eq!(handle.snapshot().await.chat.channel, "bar");
    }
}
