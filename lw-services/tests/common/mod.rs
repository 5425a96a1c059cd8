//! Shared test utilities for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use lw_api::{SubscriptionApi, SubscriptionFilter, SubscriptionInfo};
use lw_core::config::AppConfig;
use lw_core::error::{LwError, LwResult};
use lw_services::event_bus::EventBus;
use lw_services::{ChatClient, EventSubClient};
use lw_socket::testing::MockConnector;
use lw_socket::SocketRegistry;

pub const CHAT_URL: &str = "wss://chat.test";
pub const EVENTSUB_URL: &str = "wss://eventsub.test/ws";

/// How long `settle_*` waits for the next event before deciding the client is idle.
const SETTLE_WAIT: Duration = Duration::from_millis(50);

/// Create a test configuration pointing at the mock endpoints.
///
/// Chat auto-joins `foo` anonymously; reconnects use a short interval.
pub fn create_test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.chat.url = CHAT_URL.to_string();
    config.chat.channel = "foo".to_string();
    config.eventsub.url = EVENTSUB_URL.to_string();
    config.socket.reconnect_interval_ms = 100;
    config
}

/// Create an EventBus with a small buffer suitable for tests.
pub fn create_test_event_bus() -> EventBus {
    EventBus::new(64)
}

/// Create a registry backed by an in-memory connector.
pub fn create_test_registry() -> (SocketRegistry, Arc<MockConnector>) {
    let connector = MockConnector::new();
    (SocketRegistry::new(connector.clone()), connector)
}

/// Process chat events until none arrive for a short while.
pub async fn settle_chat(client: &mut ChatClient) {
    while let Ok(Some(event)) = tokio::time::timeout(SETTLE_WAIT, client.next_event()).await {
        client.handle_event(event);
    }
}

/// Process event-notification inputs until none arrive for a short while.
pub async fn settle_eventsub(client: &mut EventSubClient) {
    while let Ok(Some(input)) = tokio::time::timeout(SETTLE_WAIT, client.next_event()).await {
        client.handle_event(input).await;
    }
}

/// One recorded `create_subscription` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSubscription {
    pub topic: String,
    pub version: String,
    pub session_id: String,
}

/// Subscription API fake that records calls and hands out `sub-N` ids.
pub struct RecordingApi {
    created: Mutex<Vec<CreatedSubscription>>,
    deleted: Mutex<Vec<String>>,
    delete_delay: Duration,
    fail_creates: Mutex<bool>,
    next_id: AtomicUsize,
}

impl RecordingApi {
    pub fn new() -> Arc<Self> {
        Self::with_delete_delay(Duration::ZERO)
    }

    /// Each deletion takes `delay` before succeeding.
    pub fn with_delete_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            delete_delay: delay,
            fail_creates: Mutex::new(false),
            next_id: AtomicUsize::new(1),
        })
    }

    pub fn fail_creates(&self, fail: bool) {
        *self.fail_creates.lock() = fail;
    }

    pub fn created(&self) -> Vec<CreatedSubscription> {
        self.created.lock().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl SubscriptionApi for RecordingApi {
    async fn create_subscription(
        &self,
        topic: &str,
        version: &str,
        _condition: &serde_json::Value,
        session_id: &str,
    ) -> LwResult<String> {
        if *self.fail_creates.lock() {
            return Err(LwError::ServerError { status: 400, message: "invalid condition".into() });
        }
        self.created.lock().push(CreatedSubscription {
            topic: topic.to_string(),
            version: version.to_string(),
            session_id: session_id.to_string(),
        });
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("sub-{n}"))
    }

    async fn delete_subscription(&self, id: &str) -> LwResult<()> {
        if !self.delete_delay.is_zero() {
            tokio::time::sleep(self.delete_delay).await;
        }
        self.deleted.lock().push(id.to_string());
        Ok(())
    }

    async fn list_subscriptions(&self, _filter: &SubscriptionFilter) -> LwResult<Vec<SubscriptionInfo>> {
        Ok(Vec::new())
    }
}

// ---- Event-notification frames ----

pub fn welcome_frame(message_id: &str, session_id: &str, keepalive_secs: u64) -> String {
    serde_json::json!({
        "metadata": {
            "message_id": message_id,
            "message_type": "session_welcome",
            "message_timestamp": "2024-05-01T12:00:00.000Z",
        },
        "payload": {
            "session": {
                "id": session_id,
                "status": "connected",
                "keepalive_timeout_seconds": keepalive_secs,
                "reconnect_url": null,
            }
        }
    })
    .to_string()
}

pub fn keepalive_frame(message_id: &str) -> String {
    serde_json::json!({
        "metadata": {
            "message_id": message_id,
            "message_type": "session_keepalive",
            "message_timestamp": "2024-05-01T12:00:10.000Z",
        },
        "payload": {}
    })
    .to_string()
}

pub fn notification_frame(message_id: &str, topic: &str, event: serde_json::Value) -> String {
    serde_json::json!({
        "metadata": {
            "message_id": message_id,
            "message_type": "notification",
            "message_timestamp": "2024-05-01T12:00:05.000Z",
            "subscription_type": topic,
            "subscription_version": "1",
        },
        "payload": {
            "subscription": { "id": "sub-1", "type": topic, "status": "enabled" },
            "event": event,
        }
    })
    .to_string()
}

pub fn reconnect_frame(message_id: &str, session_id: &str, url: &str) -> String {
    serde_json::json!({
        "metadata": {
            "message_id": message_id,
            "message_type": "session_reconnect",
            "message_timestamp": "2024-05-01T12:01:00.000Z",
        },
        "payload": {
            "session": {
                "id": session_id,
                "status": "reconnecting",
                "keepalive_timeout_seconds": null,
                "reconnect_url": url,
            }
        }
    })
    .to_string()
}

pub fn revocation_frame(message_id: &str, topic: &str, status: &str) -> String {
    serde_json::json!({
        "metadata": {
            "message_id": message_id,
            "message_type": "revocation",
            "message_timestamp": "2024-05-01T12:02:00.000Z",
            "subscription_type": topic,
            "subscription_version": "1",
        },
        "payload": {
            "subscription": { "id": "sub-1", "type": topic, "status": status }
        }
    })
    .to_string()
}
