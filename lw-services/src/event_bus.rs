//! Typed event bus for intra-service communication.
//!
//! Uses tokio broadcast channels to decouple the protocol clients from their
//! observers. Any client can emit events without knowing who is listening,
//! and any number of subscribers can independently consume events.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use lw_socket::ConnectionState;

/// All application-level event types that flow through the event bus.
///
/// These are distinct from raw socket events -- they represent processed,
/// session-level state changes that observers (CLI, UI) care about.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// A protocol client's socket changed state.
    ConnectionStateChanged {
        client: String,
        state: ConnectionState,
    },
    /// A client exhausted its reconnect attempts.
    ReconnectStopped {
        client: String,
        attempts: u32,
    },
    /// The activity gate opened or closed.
    GateChanged {
        active: bool,
    },
    /// The chat server accepted the login.
    ChatAuthenticated {
        nick: String,
    },
    /// The chat server rejected the login.
    ChatAuthFailed {
        message: String,
    },
    /// A chat channel was joined.
    ChannelJoined {
        channel: String,
    },
    /// A chat channel was left.
    ChannelParted {
        channel: String,
    },
    /// An event-notification session was established.
    SessionWelcomed {
        session_id: String,
        keepalive_timeout_secs: u64,
    },
    /// The server asked the session to move to a new URL.
    SessionReconnecting {
        reconnect_url: String,
    },
    /// The keepalive watchdog expired.
    KeepaliveTimeout {
        session_id: String,
    },
    /// The server revoked a subscription.
    SubscriptionRevoked {
        topic: String,
        status: String,
    },
}

/// Application-wide event bus backed by a tokio broadcast channel.
///
/// Designed for fan-out delivery: every subscriber gets every event.
/// Slow subscribers that fall behind will receive a `Lagged` error
/// and may miss events, which is acceptable for display-driven consumers.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<AppEvent>>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to receive application events.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: AppEvent) {
        let label = event_label(&event);
        match self.sender.send(event) {
            Ok(count) => {
                debug!("event_bus: emitted {label} to {count} subscriber(s)");
            }
            Err(_) => {
                debug!("event_bus: no subscribers for {label}");
            }
        }
    }

    /// Get the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Human-readable label for an event (for logging).
fn event_label(event: &AppEvent) -> &'static str {
    match event {
        AppEvent::ConnectionStateChanged { .. } => "ConnectionStateChanged",
        AppEvent::ReconnectStopped { .. } => "ReconnectStopped",
        AppEvent::GateChanged { .. } => "GateChanged",
        AppEvent::ChatAuthenticated { .. } => "ChatAuthenticated",
        AppEvent::ChatAuthFailed { .. } => "ChatAuthFailed",
        AppEvent::ChannelJoined { .. } => "ChannelJoined",
        AppEvent::ChannelParted { .. } => "ChannelParted",
        AppEvent::SessionWelcomed { .. } => "SessionWelcomed",
        AppEvent::SessionReconnecting { .. } => "SessionReconnecting",
        AppEvent::KeepaliveTimeout { .. } => "KeepaliveTimeout",
        AppEvent::SubscriptionRevoked { .. } => "SubscriptionRevoked",
    }
}
