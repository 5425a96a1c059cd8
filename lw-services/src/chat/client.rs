//! Chat protocol client.
//!
//! Owns one exclusive socket from the registry. A text frame is split into
//! lines, each line is parsed and dispatched to typed callbacks. Session state
//! (authentication, joined channels, tag snapshots, the pending outbound
//! message) lives only as long as the connection does.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, error, info, warn};

use lw_core::config::AppConfig;
use lw_core::constants::chat as consts;
use lw_socket::{
    CloseInfo, ConnectionHandle, ConnectionState, ConnectionTarget, ReconnectPolicy, SocketEvent,
    SocketRegistry,
};

use crate::callbacks::{CallbackList, CallbackToken};
use crate::event_bus::{AppEvent, EventBus};
use crate::gate::GatedClient;

use super::events::{
    ChatMessage, ClearChat, ClearMessage, GlobalUserState, MembershipChange, MembershipKind,
    NoticeKind, RoomState, ServerNotice, UserNotice, UserState,
};
use super::filter::MessageFilter;
use super::framer::LineBuffer;
use super::parser::{IrcMessage, Tags};

const CLIENT_NAME: &str = "chat";

/// Login used for the connect sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Authenticated login; the token is sent as `oauth:<token>`.
    User { login: String, token: String },
    /// Read-only login with a generated `justinfan` nick.
    Anonymous,
}

impl Credentials {
    /// Credentials from the account section, anonymous when incomplete.
    pub fn from_config(config: &AppConfig) -> Self {
        if config.is_authenticated() {
            Self::User {
                login: config.twitch.login.to_lowercase(),
                token: config.twitch.access_token.clone(),
            }
        } else {
            Self::Anonymous
        }
    }

    fn pass_and_nick(&self) -> (String, String) {
        match self {
            Self::User { login, token } => {
                let token = token.strip_prefix("oauth:").unwrap_or(token);
                (format!("oauth:{token}"), login.clone())
            }
            Self::Anonymous => {
                let suffix: u32 = rand::thread_rng().gen_range(10_000..100_000);
                (
                    consts::ANONYMOUS_PASSWORD.to_string(),
                    format!("{}{suffix}", consts::ANONYMOUS_NICK_PREFIX),
                )
            }
        }
    }
}

/// Parent of a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyTo {
    pub parent_id: String,
    pub parent_display_name: Option<String>,
    pub parent_body: Option<String>,
}

impl ReplyTo {
    pub fn new(parent_id: impl Into<String>) -> Self {
        Self { parent_id: parent_id.into(), ..Self::default() }
    }

    fn tags(&self) -> Tags {
        let mut tags = Tags::default();
        tags.insert("reply-parent-msg-id", self.parent_id.as_str());
        if let Some(name) = &self.parent_display_name {
            tags.insert("reply-parent-display-name", name.as_str());
        }
        if let Some(body) = &self.parent_body {
            tags.insert("reply-parent-msg-body", body.as_str());
        }
        tags
    }
}

/// Membership phase of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    /// JOIN sent, not yet echoed by the server.
    JoinSent,
    /// The server confirmed the join.
    Joined,
}

/// A sent message waiting for the server's USERSTATE echo.
#[derive(Debug, Clone)]
struct PendingMessage {
    channel: String,
    body: String,
}

#[derive(Debug, Default)]
struct ChatSession {
    authenticated: bool,
    nick: String,
    channels: HashMap<String, ChannelPhase>,
    buffer: LineBuffer,
    room_states: HashMap<String, Tags>,
    user_states: HashMap<String, Tags>,
    global_state: Option<Tags>,
    pending: Option<PendingMessage>,
}

#[derive(Default)]
struct ChatCallbacks {
    message: CallbackList<ChatMessage>,
    notice: CallbackList<ServerNotice>,
    user_notice: CallbackList<UserNotice>,
    clear_chat: CallbackList<ClearChat>,
    clear_message: CallbackList<ClearMessage>,
    room_state: CallbackList<RoomState>,
    user_state: CallbackList<UserState>,
    global_user_state: CallbackList<GlobalUserState>,
    membership: CallbackList<MembershipChange>,
}

impl ChatCallbacks {
    fn remove(&mut self, token: CallbackToken) -> bool {
        self.message.remove(token)
            || self.notice.remove(token)
            || self.user_notice.remove(token)
            || self.clear_chat.remove(token)
            || self.clear_message.remove(token)
            || self.room_state.remove(token)
            || self.user_state.remove(token)
            || self.global_user_state.remove(token)
            || self.membership.remove(token)
    }
}

/// Chat client bound to one socket registry.
pub struct ChatClient {
    registry: SocketRegistry,
    url: String,
    auto_join: String,
    capabilities: Vec<String>,
    credentials: Credentials,
    policy: ReconnectPolicy,
    filter: MessageFilter,
    event_bus: Option<EventBus>,
    handle: Option<ConnectionHandle>,
    session: ChatSession,
    callbacks: ChatCallbacks,
}

impl ChatClient {
    pub fn new(registry: SocketRegistry, config: &AppConfig) -> Self {
        Self {
            registry,
            url: AppConfig::sanitize_ws_url(&config.chat.url),
            auto_join: AppConfig::normalize_channel(&config.chat.channel),
            capabilities: config.chat.capabilities.clone(),
            credentials: Credentials::from_config(config),
            policy: ReconnectPolicy::from_config(&config.socket),
            filter: MessageFilter::from_config(&config.chat),
            event_bus: None,
            handle: None,
            session: ChatSession::default(),
            callbacks: ChatCallbacks::default(),
        }
    }

    /// Publish lifecycle events on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    // -- Callback registration --

    pub fn on_message<F>(&mut self, f: F) -> CallbackToken
    where
        F: Fn(&ChatMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.message.add(Arc::new(f))
    }

    pub fn on_notice<F>(&mut self, f: F) -> CallbackToken
    where
        F: Fn(&ServerNotice) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.notice.add(Arc::new(f))
    }

    pub fn on_user_notice<F>(&mut self, f: F) -> CallbackToken
    where
        F: Fn(&UserNotice) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.user_notice.add(Arc::new(f))
    }

    pub fn on_clear_chat<F>(&mut self, f: F) -> CallbackToken
    where
        F: Fn(&ClearChat) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.clear_chat.add(Arc::new(f))
    }

    pub fn on_clear_message<F>(&mut self, f: F) -> CallbackToken
    where
        F: Fn(&ClearMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.clear_message.add(Arc::new(f))
    }

    pub fn on_room_state<F>(&mut self, f: F) -> CallbackToken
    where
        F: Fn(&RoomState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.room_state.add(Arc::new(f))
    }

    pub fn on_user_state<F>(&mut self, f: F) -> CallbackToken
    where
        F: Fn(&UserState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.user_state.add(Arc::new(f))
    }

    pub fn on_global_user_state<F>(&mut self, f: F) -> CallbackToken
    where
        F: Fn(&GlobalUserState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.global_user_state.add(Arc::new(f))
    }

    pub fn on_membership<F>(&mut self, f: F) -> CallbackToken
    where
        F: Fn(&MembershipChange) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.membership.add(Arc::new(f))
    }

    /// Remove a callback of any kind.
    pub fn off(&mut self, token: CallbackToken) -> bool {
        self.callbacks.remove(token)
    }

    // -- State accessors --

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.authenticated
    }

    /// Nick used for the current session.
    pub fn nick(&self) -> Option<&str> {
        Some(self.session.nick.as_str()).filter(|n| !n.is_empty())
    }

    pub fn state(&self) -> ConnectionState {
        self.handle
            .as_ref()
            .map(ConnectionHandle::state)
            .unwrap_or(ConnectionState::Closed)
    }

    /// Channels with a JOIN sent and no PART since.
    pub fn joined_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.session.channels.keys().cloned().collect();
        channels.sort();
        channels
    }

    pub fn channel_phase(&self, channel: &str) -> Option<ChannelPhase> {
        self.session.channels.get(&AppConfig::normalize_channel(channel)).copied()
    }

    /// Latest merged ROOMSTATE tags for `channel`.
    pub fn room_state(&self, channel: &str) -> Option<&Tags> {
        self.session.room_states.get(&AppConfig::normalize_channel(channel))
    }

    /// Latest USERSTATE tags for `channel`.
    pub fn user_state(&self, channel: &str) -> Option<&Tags> {
        self.session.user_states.get(&AppConfig::normalize_channel(channel))
    }

    pub fn global_user_state(&self) -> Option<&Tags> {
        self.session.global_state.as_ref()
    }

    // -- Lifecycle --

    /// Open the socket. The login sequence runs once it reports open.
    pub async fn connect(&mut self) {
        if self.handle.is_some() {
            debug!("chat already connected");
            return;
        }
        info!("chat connecting to {}", self.url);
        let target = ConnectionTarget::new(self.url.clone()).with_policy(self.policy.clone());
        self.handle = Some(self.registry.acquire(target).await);
    }

    /// Part every channel (best effort), close the socket and clear state.
    pub fn disconnect(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.state().is_open() {
            for channel in self.session.channels.keys() {
                handle.send(format!("PART {channel}{}", consts::LINE_DELIMITER));
            }
        }
        handle.release();
        self.reset_session();
        info!("chat disconnected");
    }

    /// Wait for the next socket event. `None` when not connected or the
    /// socket is gone. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<SocketEvent> {
        match self.handle.as_mut() {
            Some(handle) => handle.recv().await,
            None => None,
        }
    }

    /// Apply one socket event.
    pub fn handle_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::State(state) => {
                self.emit(AppEvent::ConnectionStateChanged { client: CLIENT_NAME.into(), state });
                if state == ConnectionState::Open {
                    self.send_login();
                }
            }
            SocketEvent::Message(text) => {
                for line in self.session.buffer.push(&text) {
                    self.handle_line(&line);
                }
            }
            SocketEvent::Error(e) => warn!("chat socket error: {e}"),
            SocketEvent::Closed(info) => self.on_closed(&info),
            SocketEvent::ReconnectStopped { attempts } => {
                error!("chat gave up reconnecting after {attempts} attempt(s)");
                self.emit(AppEvent::ReconnectStopped { client: CLIENT_NAME.into(), attempts });
            }
        }
    }

    fn on_closed(&mut self, info: &CloseInfo) {
        info!("chat socket closed ({} {})", info.code, info.reason);
        self.reset_session();
    }

    fn reset_session(&mut self) {
        self.session = ChatSession::default();
    }

    fn send_login(&mut self) {
        let (pass, nick) = self.credentials.pass_and_nick();
        if !self.capabilities.is_empty() {
            self.send_raw(&format!("CAP REQ :{}", self.capabilities.join(" ")));
        }
        self.send_raw(&format!("PASS {pass}"));
        self.send_raw(&format!("NICK {nick}"));
        debug!("chat login sent as {nick}");
        self.session.nick = nick;
    }

    fn send_raw(&self, line: &str) -> bool {
        match &self.handle {
            Some(handle) => handle.send(format!("{line}{}", consts::LINE_DELIMITER)),
            None => false,
        }
    }

    // -- Outbound --

    /// Join `channel`. No-op when already joined or before authentication.
    pub fn join(&mut self, channel: &str) -> bool {
        let channel = AppConfig::normalize_channel(channel);
        if channel.is_empty() {
            warn!("join ignored: empty channel name");
            return false;
        }
        if self.session.channels.contains_key(&channel) {
            debug!("already joined {channel}");
            return false;
        }
        if !self.session.authenticated {
            warn!("join {channel} ignored: not authenticated");
            return false;
        }
        if !self.send_raw(&format!("JOIN {channel}")) {
            return false;
        }
        self.session.channels.insert(channel, ChannelPhase::JoinSent);
        true
    }

    /// Leave `channel`. No-op when not joined.
    pub fn part(&mut self, channel: &str) -> bool {
        let channel = AppConfig::normalize_channel(channel);
        if self.session.channels.remove(&channel).is_none() {
            debug!("part {channel} ignored: not joined");
            return false;
        }
        self.session.room_states.remove(&channel);
        self.session.user_states.remove(&channel);
        self.send_raw(&format!("PART {channel}"));
        self.emit(AppEvent::ChannelParted { channel });
        true
    }

    /// Send a chat message, optionally as a reply.
    ///
    /// Returns `false` (and sends nothing) for a blank body or when the
    /// socket is not open.
    pub fn send_message(&mut self, channel: &str, body: &str, reply_to: Option<&ReplyTo>) -> bool {
        if body.trim().is_empty() {
            warn!("chat send rejected: empty message");
            return false;
        }
        if !self.state().is_open() {
            warn!("chat send rejected: not connected");
            return false;
        }
        let channel = AppConfig::normalize_channel(channel);
        if channel.is_empty() {
            warn!("chat send rejected: empty channel name");
            return false;
        }

        let line = match reply_to {
            Some(reply) => format!("@{} PRIVMSG {channel} :{body}", reply.tags().encode()),
            None => format!("PRIVMSG {channel} :{body}"),
        };
        if !self.send_raw(&line) {
            return false;
        }

        if let Some(previous) = self.session.pending.replace(PendingMessage {
            channel,
            body: body.to_string(),
        }) {
            debug!("pending echo for {} replaced before it arrived", previous.channel);
        }
        true
    }

    /// Send a `/me` action.
    pub fn send_action(&mut self, channel: &str, body: &str) -> bool {
        if body.trim().is_empty() {
            warn!("chat action rejected: empty message");
            return false;
        }
        self.send_message(channel, &format!("\u{1}ACTION {body}\u{1}"), None)
    }

    // -- Inbound --

    fn handle_line(&mut self, line: &str) {
        if let Some(rest) = ping_argument(line) {
            let server = if rest.is_empty() { consts::DEFAULT_SERVER_NAME } else { rest };
            self.send_raw(&format!("PONG {server}"));
            return;
        }

        let Some(msg) = IrcMessage::parse(line) else {
            warn!("chat line dropped: {line:?}");
            return;
        };

        match msg.command.as_str() {
            "001" => self.handle_welcome(&msg),
            "PING" => {
                let server = msg.trailing().unwrap_or(consts::DEFAULT_SERVER_NAME);
                self.send_raw(&format!("PONG {server}"));
            }
            "RECONNECT" => {
                info!("chat server requested reconnect");
                if let Some(handle) = &self.handle {
                    handle.underlying().reconnect();
                }
            }
            "PRIVMSG" => self.handle_privmsg(&msg),
            "NOTICE" => self.handle_notice(&msg),
            "USERNOTICE" => match UserNotice::from_line(&msg) {
                Some(notice) => {
                    self.callbacks.user_notice.invoke("user notice", &notice);
                }
                None => warn!("USERNOTICE without channel dropped"),
            },
            "CLEARCHAT" => {
                if let Some(clear) = ClearChat::from_line(&msg) {
                    self.callbacks.clear_chat.invoke("clear chat", &clear);
                }
            }
            "CLEARMSG" => {
                if let Some(clear) = ClearMessage::from_line(&msg) {
                    self.callbacks.clear_message.invoke("clear message", &clear);
                }
            }
            "ROOMSTATE" => self.handle_room_state(&msg),
            "USERSTATE" => self.handle_user_state(&msg),
            "GLOBALUSERSTATE" => {
                self.session.global_state = Some(msg.tags.clone());
                let state = GlobalUserState { tags: msg.tags };
                self.callbacks.global_user_state.invoke("global user state", &state);
            }
            "JOIN" => self.handle_membership(&msg, MembershipKind::Join),
            "PART" => self.handle_membership(&msg, MembershipKind::Part),
            "CAP" | "002" | "003" | "004" | "353" | "366" | "372" | "375" | "376" => {
                debug!("chat {}: {:?}", msg.command, msg.trailing());
            }
            other => debug!("chat command {other} not handled"),
        }
    }

    fn handle_welcome(&mut self, msg: &IrcMessage) {
        if let Some(nick) = msg.param(0) {
            self.session.nick = nick.to_string();
        }
        self.session.authenticated = true;
        info!("chat authenticated as {}", self.session.nick);
        self.emit(AppEvent::ChatAuthenticated { nick: self.session.nick.clone() });

        if !self.auto_join.is_empty() {
            let channel = self.auto_join.clone();
            self.join(&channel);
        }
    }

    fn handle_privmsg(&mut self, msg: &IrcMessage) {
        let Some(message) = ChatMessage::from_privmsg(msg) else {
            warn!("PRIVMSG without channel or body dropped");
            return;
        };
        if !self.filter.allows(&message) {
            debug!("chat message from {} filtered", message.user_login);
            return;
        }
        self.callbacks.message.invoke("chat message", &message);
    }

    fn handle_notice(&mut self, msg: &IrcMessage) {
        let notice = ServerNotice::from_line(msg);
        match notice.kind {
            NoticeKind::Welcome => debug!("chat welcome notice"),
            NoticeKind::AuthFailed => {
                warn!("chat login rejected: {}", notice.message);
                self.emit(AppEvent::ChatAuthFailed { message: notice.message.clone() });
            }
            NoticeKind::Other => {}
        }
        self.callbacks.notice.invoke("notice", &notice);
    }

    fn handle_room_state(&mut self, msg: &IrcMessage) {
        let Some(channel) = msg.channel() else {
            return;
        };
        let snapshot = self.session.room_states.entry(channel.to_string()).or_default();
        snapshot.merge(&msg.tags);
        let state = RoomState { channel: channel.to_string(), tags: snapshot.clone() };
        self.callbacks.room_state.invoke("room state", &state);
    }

    fn handle_user_state(&mut self, msg: &IrcMessage) {
        let Some(channel) = msg.channel() else {
            return;
        };
        self.session.user_states.insert(channel.to_string(), msg.tags.clone());

        let is_echo = self
            .session
            .pending
            .as_ref()
            .is_some_and(|pending| pending.channel == channel);
        let echoed = if is_echo { self.session.pending.take() } else { None };
        if let Some(pending) = echoed {
            let (body, is_action) = super::events::decode_action(&pending.body);
            let mut echo = ChatMessage::from_tags(
                pending.channel,
                self.session.nick.clone(),
                body,
                is_action,
                msg.tags.clone(),
            );
            echo.is_self = true;
            self.callbacks.message.invoke("chat message", &echo);
        }

        let state = UserState { channel: channel.to_string(), tags: msg.tags.clone() };
        self.callbacks.user_state.invoke("user state", &state);
    }

    fn handle_membership(&mut self, msg: &IrcMessage, kind: MembershipKind) {
        let Some(change) = MembershipChange::from_line(msg, kind) else {
            return;
        };
        let is_self = change.user.eq_ignore_ascii_case(&self.session.nick);
        match kind {
            MembershipKind::Join if is_self => {
                if let Some(phase) = self.session.channels.get_mut(&change.channel) {
                    if *phase == ChannelPhase::JoinSent {
                        *phase = ChannelPhase::Joined;
                        info!("joined {}", change.channel);
                        self.emit(AppEvent::ChannelJoined { channel: change.channel.clone() });
                    }
                }
            }
            // Server-side removal (kick, ban, channel gone).
            MembershipKind::Part if is_self => {
                if self.session.channels.remove(&change.channel).is_some() {
                    self.session.room_states.remove(&change.channel);
                    self.session.user_states.remove(&change.channel);
                    info!("removed from {} by server", change.channel);
                    self.emit(AppEvent::ChannelParted { channel: change.channel.clone() });
                }
            }
            _ => {}
        }
        self.callbacks.membership.invoke("membership", &change);
    }

    fn emit(&self, event: AppEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event);
        }
    }
}

/// Argument of a bare `PING` line, or `None` for anything else.
fn ping_argument(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("PING")?;
    if rest.is_empty() {
        return Some("");
    }
    let rest = rest.strip_prefix(' ')?;
    Some(rest.trim_start_matches(':').trim())
}

#[async_trait]
impl GatedClient for ChatClient {
    type Input = SocketEvent;

    fn name(&self) -> &str {
        CLIENT_NAME
    }

    async fn activate(&mut self) {
        self.connect().await;
    }

    async fn deactivate(&mut self) {
        self.disconnect();
    }

    async fn next_input(&mut self) -> Option<SocketEvent> {
        self.next_event().await
    }

    async fn handle_input(&mut self, input: SocketEvent) {
        self.handle_event(input);
    }
}
