//! Socket driver task.
//!
//! Each physical socket is owned by one tokio task. Handles talk to it over a
//! command channel; it reports back through per-subscriber event channels and
//! a `watch` channel carrying the connection state. The task keeps running
//! across reconnects and exits only on `Shutdown` or when every command
//! sender is gone.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use lw_core::constants::CLOSE_NORMAL;

use crate::events::{CloseInfo, ConnectionState, SocketEvent};
use crate::policy::{ReconnectDecision, ReconnectPolicy};
use crate::target::{apply_query_params, MessageFilter, ReconnectPredicate, UrlSource};
use crate::transport::{Connector, Frame, WsReader, WsWriter};

pub(crate) type SubscriberId = Uuid;

/// One consumer attached to a socket.
pub(crate) struct SubscriberSlot {
    pub id: SubscriberId,
    pub events: mpsc::UnboundedSender<SocketEvent>,
    pub filter: Option<MessageFilter>,
}

impl SubscriberSlot {
    /// Create a slot and the receiving end of its event channel.
    pub fn new(filter: Option<MessageFilter>) -> (Self, mpsc::UnboundedReceiver<SocketEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { id: Uuid::new_v4(), events, filter }, rx)
    }
}

pub(crate) enum DriverCommand {
    Attach(SubscriberSlot),
    Detach(SubscriberId),
    Send { from: SubscriberId, payload: String },
    Reconnect,
    Shutdown,
}

/// Read-mostly socket facts shared with handles and views.
#[derive(Debug)]
pub(crate) struct SocketMeta {
    pub url: RwLock<Option<String>>,
    pub protocols: Vec<String>,
    pub shared: bool,
}

/// What a handle keeps to talk to a running driver.
#[derive(Clone)]
pub(crate) struct DriverLink {
    pub commands: mpsc::UnboundedSender<DriverCommand>,
    pub state: watch::Receiver<ConnectionState>,
    pub meta: Arc<SocketMeta>,
}

impl DriverLink {
    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Settings a driver is spawned with.
pub(crate) struct DriverSettings {
    pub source: UrlSource,
    pub query_params: Vec<(String, String)>,
    pub protocols: Vec<String>,
    pub policy: ReconnectPolicy,
    pub should_reconnect: Option<ReconnectPredicate>,
    pub shared: bool,
}

/// Spawn a driver with `first` already attached.
pub(crate) fn spawn(
    settings: DriverSettings,
    connector: Arc<dyn Connector>,
    first: SubscriberSlot,
) -> DriverLink {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Uninstantiated);
    let meta = Arc::new(SocketMeta {
        url: RwLock::new(match &settings.source {
            UrlSource::Static(url) => {
                Some(apply_query_params(url, &settings.query_params).unwrap_or_else(|_| url.clone()))
            }
            UrlSource::Resolver(_) => None,
        }),
        protocols: settings.protocols.clone(),
        shared: settings.shared,
    });

    let _ = first.events.send(SocketEvent::State(ConnectionState::Uninstantiated));

    let driver = SocketDriver {
        settings,
        connector,
        commands: commands_rx,
        subscribers: vec![first],
        pending: VecDeque::new(),
        state_tx,
        meta: Arc::clone(&meta),
        attempt: 0,
        expect_close: false,
    };
    tokio::spawn(driver.run());

    DriverLink { commands: commands_tx, state: state_rx, meta }
}

enum Next {
    Connect,
    Backoff(Duration),
    Idle,
    Shutdown,
}

enum Interrupt {
    Restart,
    Shutdown,
}

struct SocketDriver {
    settings: DriverSettings,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
    subscribers: Vec<SubscriberSlot>,
    /// Sends issued while not open, flushed FIFO on the next open.
    pending: VecDeque<(SubscriberId, String)>,
    state_tx: watch::Sender<ConnectionState>,
    meta: Arc<SocketMeta>,
    /// Reconnect attempts since the last successful open.
    attempt: u32,
    /// Set once teardown is requested; no later result may be applied.
    expect_close: bool,
}

impl SocketDriver {
    async fn run(mut self) {
        let mut next = Next::Connect;
        loop {
            next = match next {
                Next::Connect => self.connect_cycle().await,
                Next::Backoff(delay) => self.wait(Some(delay)).await,
                Next::Idle => self.wait(None).await,
                Next::Shutdown => break,
            };
        }
        self.set_state(ConnectionState::Closed);
        debug!("socket driver stopped ({} queued sends dropped)", self.pending.len());
    }

    fn set_state(&mut self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("socket state: {previous} -> {state}");
            self.broadcast(SocketEvent::State(state));
        }
    }

    fn broadcast(&self, event: SocketEvent) {
        for slot in &self.subscribers {
            let _ = slot.events.send(event.clone());
        }
    }

    fn deliver(&self, text: String) {
        for slot in &self.subscribers {
            let accepted = slot.filter.as_ref().map_or(true, |filter| filter(&text));
            if accepted {
                let _ = slot.events.send(SocketEvent::Message(text.clone()));
            }
        }
    }

    fn attach(&mut self, slot: SubscriberSlot) {
        let _ = slot.events.send(SocketEvent::State(*self.state_tx.borrow()));
        debug!("subscriber {} attached ({} total)", slot.id, self.subscribers.len() + 1);
        self.subscribers.push(slot);
    }

    fn detach(&mut self, id: SubscriberId) {
        self.subscribers.retain(|slot| slot.id != id);
        self.pending.retain(|(from, _)| *from != id);
        debug!("subscriber {id} detached ({} remaining)", self.subscribers.len());
    }

    /// Apply a command while no connection is open.
    fn handle_offline_command(&mut self, command: DriverCommand) -> Option<Interrupt> {
        match command {
            DriverCommand::Attach(slot) => self.attach(slot),
            DriverCommand::Detach(id) => self.detach(id),
            DriverCommand::Send { from, payload } => {
                debug!("socket not open, queueing send ({} pending)", self.pending.len() + 1);
                self.pending.push_back((from, payload));
            }
            DriverCommand::Reconnect => return Some(Interrupt::Restart),
            DriverCommand::Shutdown => {
                self.expect_close = true;
                return Some(Interrupt::Shutdown);
            }
        }
        None
    }

    /// Drive `fut` to completion while servicing commands.
    ///
    /// Returns early, dropping `fut` and its eventual result, when a command
    /// interrupts the wait.
    async fn service_until<F: Future>(&mut self, fut: F) -> Result<F::Output, Interrupt> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                output = &mut fut => return Ok(output),
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Some(interrupt) = self.handle_offline_command(command) {
                            return Err(interrupt);
                        }
                    }
                    None => {
                        self.expect_close = true;
                        return Err(Interrupt::Shutdown);
                    }
                },
            }
        }
    }

    fn interrupted(&mut self, interrupt: Interrupt) -> Next {
        match interrupt {
            Interrupt::Restart => {
                self.attempt = 0;
                Next::Connect
            }
            Interrupt::Shutdown => Next::Shutdown,
        }
    }

    async fn wait(&mut self, delay: Option<Duration>) -> Next {
        let sleep = async move {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };
        match self.service_until(sleep).await {
            Ok(()) => Next::Connect,
            Err(interrupt) => self.interrupted(interrupt),
        }
    }

    async fn connect_cycle(&mut self) -> Next {
        self.set_state(ConnectionState::Connecting);

        let source = self.settings.source.clone();
        let resolved = match self.service_until(async move { source.resolve().await }).await {
            Ok(resolved) => resolved.and_then(|url| apply_query_params(&url, &self.settings.query_params)),
            Err(interrupt) => return self.interrupted(interrupt),
        };
        let url = match resolved {
            Ok(url) => url,
            Err(e) => {
                // No retry until an explicit reconnect
                warn!("socket URL resolution failed: {e}");
                self.broadcast(SocketEvent::Error(e.to_string()));
                self.set_state(ConnectionState::Closed);
                return Next::Idle;
            }
        };
        *self.meta.url.write() = Some(url.clone());

        info!("socket connecting to {url} (attempt {})", self.attempt);
        let connector = Arc::clone(&self.connector);
        let protocols = self.settings.protocols.clone();
        let target_url = url.clone();
        let connect = async move { connector.connect(&target_url, &protocols).await };

        match self.service_until(connect).await {
            Ok(Ok((writer, reader))) => self.pump(writer, reader).await,
            Ok(Err(e)) => {
                warn!("socket connect to {url} failed: {e}");
                self.broadcast(SocketEvent::Error(e.to_string()));
                self.on_closed(CloseInfo::abnormal(e.to_string()))
            }
            Err(interrupt) => self.interrupted(interrupt),
        }
    }

    async fn pump(&mut self, mut writer: Box<dyn WsWriter>, mut reader: Box<dyn WsReader>) -> Next {
        self.attempt = 0;
        self.set_state(ConnectionState::Open);

        if !self.pending.is_empty() {
            debug!("flushing {} queued sends", self.pending.len());
        }
        while let Some((from, payload)) = self.pending.pop_front() {
            if let Err(e) = writer.send_text(&payload).await {
                self.pending.push_front((from, payload));
                self.broadcast(SocketEvent::Error(e.to_string()));
                return self.on_closed(CloseInfo::abnormal(e.to_string()));
            }
        }

        loop {
            tokio::select! {
                frame = reader.recv() => match frame {
                    Some(Ok(Frame::Text(text))) => self.deliver(text),
                    Some(Ok(Frame::Binary(data))) => {
                        self.deliver(String::from_utf8_lossy(&data).into_owned());
                    }
                    Some(Ok(Frame::Close(info))) => {
                        info!("socket closed by peer ({}: {})", info.code, info.reason);
                        return self.on_closed(info);
                    }
                    Some(Err(e)) => {
                        warn!("socket read failed: {e}");
                        self.broadcast(SocketEvent::Error(e.to_string()));
                        return self.on_closed(CloseInfo::abnormal(e.to_string()));
                    }
                    None => return self.on_closed(CloseInfo::abnormal("connection lost")),
                },
                command = self.commands.recv() => match command {
                    Some(DriverCommand::Send { payload, .. }) => {
                        if let Err(e) = writer.send_text(&payload).await {
                            warn!("socket send failed: {e}");
                            self.broadcast(SocketEvent::Error(e.to_string()));
                            return self.on_closed(CloseInfo::abnormal(e.to_string()));
                        }
                    }
                    Some(DriverCommand::Attach(slot)) => self.attach(slot),
                    Some(DriverCommand::Detach(id)) => self.detach(id),
                    Some(DriverCommand::Reconnect) => {
                        info!("socket reconnect requested");
                        self.close_writer(&mut writer, "reconnect").await;
                        self.attempt = 0;
                        return Next::Connect;
                    }
                    Some(DriverCommand::Shutdown) | None => {
                        self.expect_close = true;
                        self.close_writer(&mut writer, "client closed").await;
                        return Next::Shutdown;
                    }
                },
            }
        }
    }

    async fn close_writer(&mut self, writer: &mut Box<dyn WsWriter>, reason: &str) {
        self.set_state(ConnectionState::Closing);
        if let Err(e) = writer.close(CLOSE_NORMAL, reason).await {
            debug!("close frame not sent: {e}");
        }
        self.set_state(ConnectionState::Closed);
        self.broadcast(SocketEvent::Closed(CloseInfo::normal(reason)));
    }

    fn on_closed(&mut self, info: CloseInfo) -> Next {
        self.set_state(ConnectionState::Closed);
        self.broadcast(SocketEvent::Closed(info.clone()));
        if self.expect_close {
            return Next::Shutdown;
        }

        let approved = self
            .settings
            .should_reconnect
            .as_ref()
            .map_or(true, |predicate| predicate(&info));

        match self.settings.policy.decide(self.attempt, &info, approved) {
            ReconnectDecision::Retry { delay } => {
                self.attempt += 1;
                info!(
                    "socket reconnect attempt {}/{} in {:.1}s",
                    self.attempt,
                    self.settings.policy.limit,
                    delay.as_secs_f64()
                );
                Next::Backoff(delay)
            }
            ReconnectDecision::Exhausted => {
                error!("socket reconnect attempts exhausted after {}", self.attempt);
                self.broadcast(SocketEvent::ReconnectStopped { attempts: self.attempt });
                Next::Idle
            }
            ReconnectDecision::Disabled => {
                debug!("socket closed with code {}, not reconnecting", info.code);
                Next::Idle
            }
        }
    }
}
