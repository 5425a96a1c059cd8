//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "Livewire";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory name used under the platform data/config roots.
pub const APP_DIR_NAME: &str = "Livewire";

/// WebSocket close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// WebSocket close code reported when the transport ends without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Ceiling for the reconnect backoff multiplier.
pub const BACKOFF_MAX_MULTIPLIER: f64 = 8.0;

/// Growth factor of the reconnect backoff.
pub const BACKOFF_GROWTH: f64 = 1.5;

/// Default reconnect attempt limit.
pub const DEFAULT_RECONNECT_LIMIT: u32 = 20;

/// Default base reconnect interval in milliseconds.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5_000;

/// Default REST API timeout in milliseconds.
pub const DEFAULT_API_TIMEOUT_MS: u64 = 10_000;

/// Event-notification protocol constants.
pub mod eventsub {
    /// Default event-notification WebSocket endpoint.
    pub const DEFAULT_URL: &str = "wss://eventsub.wss.twitch.tv/ws";

    /// Smallest keepalive timeout the server may assign, in seconds.
    pub const MIN_KEEPALIVE_SECS: u64 = 10;

    /// Largest keepalive timeout the server may assign, in seconds.
    pub const MAX_KEEPALIVE_SECS: u64 = 600;

    /// Grace added on top of the keepalive timeout before the watchdog fires.
    pub const KEEPALIVE_GRACE_SECS: u64 = 5;

    /// Per-subscription deletion timeout during teardown, in milliseconds.
    pub const CLEANUP_PER_DELETE_MS: u64 = 2_000;

    /// Overall teardown cleanup budget, in milliseconds.
    pub const CLEANUP_TOTAL_MS: u64 = 5_000;

    /// Number of recent message ids remembered for redelivery detection.
    pub const MESSAGE_ID_HISTORY: usize = 100;
}

/// Chat protocol constants.
pub mod chat {
    /// Default chat WebSocket endpoint.
    pub const DEFAULT_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

    /// Server name used when a PING carries no argument.
    pub const DEFAULT_SERVER_NAME: &str = "tmi.twitch.tv";

    /// Line delimiter for outbound commands.
    pub const LINE_DELIMITER: &str = "\r\n";

    /// Nick prefix for anonymous (read-only) logins.
    pub const ANONYMOUS_NICK_PREFIX: &str = "justinfan";

    /// Password sent with anonymous logins.
    pub const ANONYMOUS_PASSWORD: &str = "SCHMOOPIIE";

    /// Capabilities requested on connect.
    pub const DEFAULT_CAPABILITIES: &[&str] = &[
        "twitch.tv/tags",
        "twitch.tv/commands",
        "twitch.tv/membership",
    ];

    /// Phrase carried by the server's welcome notice.
    pub const WELCOME_PHRASE: &str = "Welcome, GLHF!";

    /// Notice texts that indicate a rejected login.
    pub const AUTH_FAILURE_PHRASES: &[&str] = &[
        "Login authentication failed",
        "Improperly formatted auth",
    ];
}
