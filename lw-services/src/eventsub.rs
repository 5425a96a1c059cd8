//! Event-notification session client.
//!
//! Holds one exclusive socket. The server assigns a session on `welcome`;
//! subscriptions are created over REST against that session id and
//! notifications are fanned out to per-topic callbacks. A keepalive watchdog
//! reopens the socket when the server goes quiet, and a server `reconnect`
//! moves the session to the URL it supplies.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use lw_api::{SubscriptionApi, SubscriptionFilter, SubscriptionInfo};
use lw_core::config::AppConfig;
use lw_core::constants::eventsub as consts;
use lw_core::error::{LwError, LwResult};
use lw_socket::{ConnectionHandle, ConnectionState, ConnectionTarget, ReconnectPolicy, SocketEvent, SocketRegistry};

use crate::callbacks::{CallbackList, CallbackToken};
use crate::event_bus::{AppEvent, EventBus};
use crate::gate::GatedClient;

const CLIENT_NAME: &str = "eventsub";

// -- Wire format --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MessageType {
    SessionWelcome,
    SessionKeepalive,
    Notification,
    SessionReconnect,
    Revocation,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct Frame {
    metadata: Metadata,
    #[serde(default)]
    payload: Payload,
    /// Some senders put the event at the top level.
    #[serde(default)]
    event: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    message_id: String,
    message_type: MessageType,
    #[serde(default)]
    message_timestamp: Option<String>,
    #[serde(default)]
    subscription_type: Option<String>,
    #[serde(default)]
    subscription_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Payload {
    #[serde(default)]
    session: Option<SessionPayload>,
    #[serde(default)]
    subscription: Option<Value>,
    #[serde(default)]
    event: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    id: String,
    #[serde(default)]
    keepalive_timeout_seconds: Option<u64>,
    #[serde(default)]
    reconnect_url: Option<String>,
}

fn parse_frame(text: &str) -> LwResult<Frame> {
    serde_json::from_str(text).map_err(|e| LwError::Protocol(format!("eventsub frame: {e}")))
}

/// Keepalive timeout clamped to the range the server may assign.
pub fn clamp_keepalive(seconds: u64) -> Duration {
    Duration::from_secs(seconds.clamp(consts::MIN_KEEPALIVE_SECS, consts::MAX_KEEPALIVE_SECS))
}

// -- Public types --

/// One delivered notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub subscription_type: String,
    pub subscription_version: Option<String>,
    pub message_id: String,
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// Raw subscription object.
    pub subscription: Value,
    /// Raw event object.
    pub event: Value,
}

impl Notification {
    fn from_frame(frame: Frame) -> Option<Self> {
        let Frame { metadata, payload, event } = frame;
        let subscription = payload.subscription.unwrap_or(Value::Null);
        let subscription_type = metadata.subscription_type.or_else(|| {
            subscription.get("type").and_then(Value::as_str).map(str::to_string)
        })?;
        Some(Self {
            subscription_type,
            subscription_version: metadata.subscription_version,
            timestamp: metadata
                .message_timestamp
                .as_deref()
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok()),
            message_id: metadata.message_id,
            event: payload.event.or(event).unwrap_or(Value::Null),
            subscription,
        })
    }
}

/// Server-assigned session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSubSession {
    pub session_id: String,
    pub keepalive_timeout: Duration,
    /// URL supplied by the last server `reconnect`.
    pub reconnect_url: Option<String>,
    /// Set while a reopen is in flight; cleared by the next welcome.
    pub is_reconnecting: bool,
    /// Topic to remote subscription id.
    pub active_subscriptions: HashMap<String, String>,
}

/// Input to the client's event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum EventSubInput {
    Socket(SocketEvent),
    /// No message arrived within the keepalive window.
    KeepaliveExpired,
}

/// Teardown cleanup bounds.
#[derive(Debug, Clone, Copy)]
pub struct CleanupLimits {
    pub per_delete: Duration,
    pub total: Duration,
}

impl Default for CleanupLimits {
    fn default() -> Self {
        Self {
            per_delete: Duration::from_millis(consts::CLEANUP_PER_DELETE_MS),
            total: Duration::from_millis(consts::CLEANUP_TOTAL_MS),
        }
    }
}

/// Event-notification client.
pub struct EventSubClient {
    registry: SocketRegistry,
    api: Arc<dyn SubscriptionApi>,
    url: String,
    policy: ReconnectPolicy,
    cleanup: CleanupLimits,
    event_bus: Option<EventBus>,
    handle: Option<ConnectionHandle>,
    /// The open socket targets a server-issued reconnect URL.
    redirected: bool,
    session: Option<EventSubSession>,
    watchdog: Option<Instant>,
    callbacks: HashMap<String, CallbackList<Notification>>,
    recent_ids: VecDeque<String>,
}

impl EventSubClient {
    pub fn new(registry: SocketRegistry, api: Arc<dyn SubscriptionApi>, config: &AppConfig) -> Self {
        Self {
            registry,
            api,
            url: AppConfig::sanitize_ws_url(&config.eventsub.url),
            policy: ReconnectPolicy::from_config(&config.socket),
            cleanup: CleanupLimits {
                per_delete: Duration::from_millis(config.eventsub.cleanup_per_delete_ms),
                total: Duration::from_millis(config.eventsub.cleanup_total_ms),
            },
            event_bus: None,
            handle: None,
            redirected: false,
            session: None,
            watchdog: None,
            callbacks: HashMap::new(),
            recent_ids: VecDeque::with_capacity(consts::MESSAGE_ID_HISTORY),
        }
    }

    /// Publish session lifecycle on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn session(&self) -> Option<&EventSubSession> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    pub fn state(&self) -> ConnectionState {
        self.handle
            .as_ref()
            .map(ConnectionHandle::state)
            .unwrap_or(ConnectionState::Closed)
    }

    /// When the keepalive watchdog fires next, if armed.
    pub fn watchdog_deadline(&self) -> Option<Instant> {
        self.watchdog
    }

    // -- Callbacks --

    /// Register a callback for notifications of `topic`.
    pub fn on<F>(&mut self, topic: &str, f: F) -> CallbackToken
    where
        F: Fn(&Notification) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.entry(topic.to_string()).or_default().add(Arc::new(f))
    }

    /// Remove a callback registered with [`EventSubClient::on`].
    pub fn off(&mut self, token: CallbackToken) -> bool {
        let mut removed = false;
        self.callbacks.retain(|_, list| {
            removed |= list.remove(token);
            !list.is_empty()
        });
        removed
    }

    pub fn callback_count(&self, topic: &str) -> usize {
        self.callbacks.get(topic).map(CallbackList::len).unwrap_or(0)
    }

    // -- Subscriptions --

    /// Create a server-side subscription bound to the current session.
    pub async fn subscribe(&mut self, topic: &str, version: &str, condition: Value) -> LwResult<String> {
        let session_id = self.session_id().ok_or(LwError::NoSession)?.to_string();
        let id = self
            .api
            .create_subscription(topic, version, &condition, &session_id)
            .await?;

        match self.session.as_mut() {
            Some(session) if session.session_id == session_id => {
                info!("subscribed to {topic} ({id})");
                session.active_subscriptions.insert(topic.to_string(), id.clone());
            }
            _ => warn!("session replaced while subscribing to {topic}; {id} not tracked"),
        }
        Ok(id)
    }

    /// Delete the subscription for `topic`. Returns `false` when none is active.
    pub async fn unsubscribe(&mut self, topic: &str) -> LwResult<bool> {
        let Some(id) = self
            .session
            .as_mut()
            .and_then(|s| s.active_subscriptions.remove(topic))
        else {
            debug!("unsubscribe {topic}: no active subscription");
            return Ok(false);
        };
        self.api.delete_subscription(&id).await?;
        info!("unsubscribed from {topic} ({id})");
        Ok(true)
    }

    /// List the account's server-side subscriptions.
    pub async fn list_remote(&self, filter: &SubscriptionFilter) -> LwResult<Vec<SubscriptionInfo>> {
        self.api.list_subscriptions(filter).await
    }

    // -- Lifecycle --

    /// Open the socket on the configured URL.
    pub async fn connect(&mut self) {
        if self.handle.is_some() {
            debug!("eventsub already connected");
            return;
        }
        let url = self.url.clone();
        self.open(&url).await;
    }

    async fn open(&mut self, url: &str) {
        info!("eventsub connecting to {url}");
        let mut target = ConnectionTarget::new(url).with_policy(self.policy.clone());
        // A reconnect URL is single-use; the client falls back to the configured URL.
        self.redirected = url != self.url;
        if self.redirected {
            target = target.with_reconnect_predicate(|_| false);
        }
        self.handle = Some(self.registry.acquire(target).await);
    }

    /// Close the socket without retry and delete active subscriptions in the
    /// background. Idempotent.
    ///
    /// The returned task finishes within the cleanup budget.
    pub fn disconnect(&mut self) -> JoinHandle<()> {
        self.watchdog = None;
        self.redirected = false;
        if let Some(handle) = self.handle.take() {
            handle.release();
            info!("eventsub disconnected");
        }
        let subscriptions: Vec<(String, String)> = self
            .session
            .take()
            .map(|s| s.active_subscriptions.into_iter().collect())
            .unwrap_or_default();
        self.recent_ids.clear();

        let api = self.api.clone();
        let limits = self.cleanup;
        tokio::spawn(cleanup_subscriptions(api, subscriptions, limits))
    }

    /// Wait for the next socket event or the watchdog. `None` when not
    /// connected. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<EventSubInput> {
        let handle = self.handle.as_mut()?;
        match self.watchdog {
            Some(deadline) => tokio::select! {
                event = handle.recv() => event.map(EventSubInput::Socket),
                _ = tokio::time::sleep_until(deadline) => Some(EventSubInput::KeepaliveExpired),
            },
            None => handle.recv().await.map(EventSubInput::Socket),
        }
    }

    /// Apply one input.
    pub async fn handle_event(&mut self, input: EventSubInput) {
        match input {
            EventSubInput::KeepaliveExpired => self.on_keepalive_expired().await,
            EventSubInput::Socket(SocketEvent::State(state)) => {
                self.emit(AppEvent::ConnectionStateChanged { client: CLIENT_NAME.into(), state });
            }
            EventSubInput::Socket(SocketEvent::Message(text)) => self.on_text(&text).await,
            EventSubInput::Socket(SocketEvent::Error(e)) => warn!("eventsub socket error: {e}"),
            EventSubInput::Socket(SocketEvent::Closed(info)) => {
                info!("eventsub socket closed ({} {})", info.code, info.reason);
                self.watchdog = None;
                if let Some(session) = self.session.take() {
                    if !session.active_subscriptions.is_empty() {
                        warn!(
                            "session {} closed with {} subscription(s); they must be recreated",
                            session.session_id,
                            session.active_subscriptions.len()
                        );
                    }
                }
                if self.redirected {
                    info!("redirected socket closed; reconnecting to {}", self.url);
                    let url = self.url.clone();
                    self.reopen(&url).await;
                }
            }
            EventSubInput::Socket(SocketEvent::ReconnectStopped { attempts }) => {
                error!("eventsub gave up reconnecting after {attempts} attempt(s)");
                self.emit(AppEvent::ReconnectStopped { client: CLIENT_NAME.into(), attempts });
            }
        }
    }

    async fn on_text(&mut self, text: &str) {
        let frame = match parse_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{e}; frame dropped");
                return;
            }
        };

        if !frame.metadata.message_id.is_empty() && !self.remember_id(&frame.metadata.message_id) {
            debug!("duplicate message {} dropped", frame.metadata.message_id);
            return;
        }

        match frame.metadata.message_type {
            MessageType::SessionWelcome => self.on_welcome(frame),
            MessageType::SessionKeepalive => self.arm_watchdog(),
            MessageType::Notification => {
                self.arm_watchdog();
                self.on_notification(frame);
            }
            MessageType::SessionReconnect => self.on_reconnect(frame).await,
            MessageType::Revocation => self.on_revocation(frame),
            MessageType::Unknown => debug!("unknown eventsub message type dropped"),
        }
    }

    /// Record `id`; `false` when it was already seen.
    fn remember_id(&mut self, id: &str) -> bool {
        if self.recent_ids.iter().any(|seen| seen == id) {
            return false;
        }
        if self.recent_ids.len() == consts::MESSAGE_ID_HISTORY {
            self.recent_ids.pop_front();
        }
        self.recent_ids.push_back(id.to_string());
        true
    }

    fn arm_watchdog(&mut self) {
        if let Some(session) = &self.session {
            let grace = Duration::from_secs(consts::KEEPALIVE_GRACE_SECS);
            self.watchdog = Some(Instant::now() + session.keepalive_timeout + grace);
        }
    }

    fn on_welcome(&mut self, frame: Frame) {
        let Some(payload) = frame.payload.session else {
            warn!("welcome without session dropped");
            return;
        };
        let keepalive = clamp_keepalive(
            payload.keepalive_timeout_seconds.unwrap_or(consts::MIN_KEEPALIVE_SECS),
        );

        let previous = self.session.take();
        let carried = match previous {
            Some(prev) if prev.is_reconnecting && prev.reconnect_url.is_some() => {
                debug!(
                    "carrying {} subscription(s) from {} to {}",
                    prev.active_subscriptions.len(),
                    prev.session_id,
                    payload.id
                );
                prev.active_subscriptions
            }
            _ => HashMap::new(),
        };

        let uncovered: Vec<&str> = self
            .callbacks
            .keys()
            .filter(|topic| !carried.contains_key(*topic))
            .map(String::as_str)
            .collect();
        if !uncovered.is_empty() {
            warn!(
                "callbacks registered for {} without a subscription; subscribe() is needed with a version and condition",
                uncovered.join(", ")
            );
        }

        info!("eventsub session {} (keepalive {}s)", payload.id, keepalive.as_secs());
        self.emit(AppEvent::SessionWelcomed {
            session_id: payload.id.clone(),
            keepalive_timeout_secs: keepalive.as_secs(),
        });
        self.session = Some(EventSubSession {
            session_id: payload.id,
            keepalive_timeout: keepalive,
            reconnect_url: None,
            is_reconnecting: false,
            active_subscriptions: carried,
        });
        self.arm_watchdog();
    }

    fn on_notification(&mut self, frame: Frame) {
        let Some(notification) = Notification::from_frame(frame) else {
            warn!("notification without subscription type dropped");
            return;
        };
        match self.callbacks.get(&notification.subscription_type) {
            Some(list) => {
                list.invoke(&notification.subscription_type, &notification);
            }
            None => debug!("no callbacks for {}", notification.subscription_type),
        }
    }

    async fn on_reconnect(&mut self, frame: Frame) {
        let Some(url) = frame.payload.session.and_then(|s| s.reconnect_url) else {
            warn!("reconnect without url dropped");
            return;
        };
        info!("eventsub session moving to {url}");
        if let Some(session) = self.session.as_mut() {
            session.reconnect_url = Some(url.clone());
            session.is_reconnecting = true;
        }
        self.emit(AppEvent::SessionReconnecting { reconnect_url: url.clone() });
        self.reopen(&url).await;
    }

    async fn on_keepalive_expired(&mut self) {
        let Some(session) = self.session.as_mut() else {
            self.watchdog = None;
            return;
        };
        warn!(
            "no message within {}s on session {}; reconnecting",
            session.keepalive_timeout.as_secs() + consts::KEEPALIVE_GRACE_SECS,
            session.session_id
        );
        session.is_reconnecting = true;
        session.reconnect_url = None;
        let session_id = session.session_id.clone();
        self.emit(AppEvent::KeepaliveTimeout { session_id });

        let url = self.url.clone();
        self.reopen(&url).await;
    }

    /// Close the current socket with a normal closure and open `url`.
    async fn reopen(&mut self, url: &str) {
        self.watchdog = None;
        if let Some(handle) = self.handle.take() {
            handle.release();
        }
        self.open(url).await;
    }

    fn on_revocation(&mut self, frame: Frame) {
        let subscription = frame.payload.subscription.unwrap_or(Value::Null);
        let topic = subscription
            .get("type")
            .and_then(Value::as_str)
            .or(frame.metadata.subscription_type.as_deref())
            .unwrap_or("unknown")
            .to_string();
        let status = subscription
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        warn!("subscription {topic} revoked ({status})");
        self.emit(AppEvent::SubscriptionRevoked { topic, status });
    }

    fn emit(&self, event: AppEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event);
        }
    }
}

async fn cleanup_subscriptions(
    api: Arc<dyn SubscriptionApi>,
    subscriptions: Vec<(String, String)>,
    limits: CleanupLimits,
) {
    if subscriptions.is_empty() {
        return;
    }
    let count = subscriptions.len();
    let work = async {
        for (topic, id) in subscriptions {
            match tokio::time::timeout(limits.per_delete, api.delete_subscription(&id)).await {
                Ok(Ok(())) => debug!("deleted subscription {topic} ({id})"),
                Ok(Err(e)) => warn!("failed to delete subscription {topic} ({id}): {e}"),
                Err(_) => warn!("deleting subscription {topic} ({id}) timed out"),
            }
        }
    };
    if tokio::time::timeout(limits.total, work).await.is_err() {
        error!("subscription cleanup exceeded {}ms; {count} queued", limits.total.as_millis());
    }
}

#[async_trait]
impl GatedClient for EventSubClient {
    type Input = EventSubInput;

    fn name(&self) -> &str {
        CLIENT_NAME
    }

    async fn activate(&mut self) {
        self.connect().await;
    }

    async fn deactivate(&mut self) {
        drop(self.disconnect());
    }

    async fn next_input(&mut self) -> Option<EventSubInput> {
        self.next_event().await
    }

    async fn handle_input(&mut self, input: EventSubInput) {
        self.handle_event(input).await;
    }
}
