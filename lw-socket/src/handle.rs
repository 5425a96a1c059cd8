//! Connection handles and the guarded socket view.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use lw_core::error::LwResult;

use crate::driver::{DriverCommand, DriverLink, SocketMeta, SubscriberId};
use crate::events::{ConnectionState, SocketEvent};
use crate::registry::SharedTable;

/// How a handle gives its socket back.
pub(crate) enum Release {
    /// Stop the private driver.
    Exclusive,
    /// Drop one subscription from the shared table.
    Shared { key: String, table: Arc<SharedTable> },
    /// Nothing to release (the handle never reached a driver).
    Inert,
}

/// One consumer's view of a socket.
///
/// Sends made before the socket opens are queued and flushed in FIFO order
/// once it does. Events arrive in order through [`ConnectionHandle::recv`].
/// Dropping the handle releases it: an exclusive socket closes with code
/// 1000, a shared socket closes only when its last handle is released.
pub struct ConnectionHandle {
    id: SubscriberId,
    link: DriverLink,
    events: mpsc::UnboundedReceiver<SocketEvent>,
    last_message: Option<String>,
    release: Release,
}

impl ConnectionHandle {
    pub(crate) fn new(
        id: SubscriberId,
        link: DriverLink,
        events: mpsc::UnboundedReceiver<SocketEvent>,
        release: Release,
    ) -> Self {
        Self { id, link, events, last_message: None, release }
    }

    /// A handle already in the closed state, carrying `error` as its only event.
    pub(crate) fn closed(error: String, protocols: Vec<String>, shared: bool) -> Self {
        let (commands, _) = mpsc::unbounded_channel();
        let (_, state) = watch::channel(ConnectionState::Closed);
        let (events_tx, events) = mpsc::unbounded_channel();
        let _ = events_tx.send(SocketEvent::State(ConnectionState::Closed));
        let _ = events_tx.send(SocketEvent::Error(error));
        let meta = Arc::new(SocketMeta { url: RwLock::new(None), protocols, shared });
        Self::new(
            uuid::Uuid::new_v4(),
            DriverLink { commands, state, meta },
            events,
            Release::Inert,
        )
    }

    /// Unique id of this handle.
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.link.state.borrow()
    }

    /// Receiver for state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.link.state.clone()
    }

    /// Send a text payload, queueing it if the socket is not open yet.
    ///
    /// Returns `false` when the socket is gone for good.
    pub fn send(&self, payload: impl Into<String>) -> bool {
        let command = DriverCommand::Send { from: self.id, payload: payload.into() };
        if self.link.commands.send(command).is_err() {
            debug!("send on a released socket dropped");
            return false;
        }
        true
    }

    /// Serialize `value` as JSON and send it.
    pub fn send_json<T: Serialize>(&self, value: &T) -> LwResult<bool> {
        let payload = serde_json::to_string(value)?;
        Ok(self.send(payload))
    }

    /// Wait for the next event. Returns `None` once the socket is gone and
    /// every buffered event has been read.
    ///
    /// Cancel-safe.
    pub async fn recv(&mut self) -> Option<SocketEvent> {
        let event = self.events.recv().await?;
        self.observe(&event);
        Some(event)
    }

    /// Take the next event if one is buffered.
    pub fn try_recv(&mut self) -> Option<SocketEvent> {
        let event = self.events.try_recv().ok()?;
        self.observe(&event);
        Some(event)
    }

    fn observe(&mut self, event: &SocketEvent) {
        if let SocketEvent::Message(text) = event {
            self.last_message = Some(text.clone());
        }
    }

    /// Most recent message received through this handle.
    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    /// Most recent message parsed as JSON.
    ///
    /// `None` before any message; an empty object when the message is not
    /// valid JSON.
    pub fn last_json_message(&self) -> Option<serde_json::Value> {
        let text = self.last_message.as_deref()?;
        Some(
            serde_json::from_str(text)
                .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new())),
        )
    }

    /// Guarded view of the underlying socket.
    pub fn underlying(&self) -> SocketView {
        SocketView { link: self.link.clone() }
    }

    /// Release this handle now. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.release, Release::Inert) {
            Release::Exclusive => {
                let _ = self.link.commands.send(DriverCommand::Shutdown);
            }
            Release::Shared { key, table } => table.release(&key, self.id),
            Release::Inert => {}
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("shared", &self.link.meta.shared)
            .finish()
    }
}

/// Read-only view of a socket, plus `reconnect()`.
///
/// It cannot send or close; only the owning handle can.
#[derive(Clone)]
pub struct SocketView {
    link: DriverLink,
}

impl SocketView {
    /// URL of the current or last connection attempt.
    pub fn url(&self) -> Option<String> {
        self.link.meta.url.read().clone()
    }

    /// Subprotocols offered during the handshake.
    pub fn protocols(&self) -> &[String] {
        &self.link.meta.protocols
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.link.state.borrow()
    }

    /// Whether the socket is shared between handles.
    pub fn is_shared(&self) -> bool {
        self.link.meta.shared
    }

    /// Whether the driver is still running.
    pub fn is_alive(&self) -> bool {
        self.link.is_alive()
    }

    /// Close and re-open the socket, resetting the attempt counter.
    ///
    /// Also restarts a socket that exhausted its reconnect attempts or failed
    /// to resolve its URL.
    pub fn reconnect(&self) -> bool {
        self.link.commands.send(DriverCommand::Reconnect).is_ok()
    }
}

impl std::fmt::Debug for SocketView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketView")
            .field("url", &self.url())
            .field("state", &self.state())
            .field("shared", &self.is_shared())
            .finish()
    }
}
