//! Socket registry.
//!
//! Exclusive targets get a private driver per acquire. Shared targets are
//! keyed by their resolved URL: the first acquire opens the socket, later
//! ones attach to it, and the socket closes when the last handle is released.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::driver::{self, DriverCommand, DriverLink, DriverSettings, SubscriberId, SubscriberSlot};
use crate::handle::{ConnectionHandle, Release};
use crate::target::{apply_query_params, ConnectionTarget, ShareMode, UrlSource};
use crate::transport::{Connector, TungsteniteConnector};

struct SharedEntry {
    link: DriverLink,
    subscribers: HashSet<SubscriberId>,
}

/// Table of shared sockets keyed by resolved URL.
#[derive(Default)]
pub(crate) struct SharedTable {
    entries: Mutex<HashMap<String, SharedEntry>>,
}

impl SharedTable {
    /// Drop `id` from the socket at `key`, closing it when no subscriber remains.
    pub(crate) fn release(&self, key: &str, id: SubscriberId) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if !entry.subscribers.remove(&id) {
            return;
        }
        let _ = entry.link.commands.send(DriverCommand::Detach(id));
        if entry.subscribers.is_empty() {
            if let Some(entry) = entries.remove(key) {
                let _ = entry.link.commands.send(DriverCommand::Shutdown);
            }
            info!("last subscriber released, closing shared socket {key}");
        } else {
            debug!("shared socket {key} has {} subscribers", entry.subscribers.len());
        }
    }
}

/// Hands out connection handles backed by exclusive or shared sockets.
///
/// Cheap to clone; clones share the same table of shared sockets.
#[derive(Clone)]
pub struct SocketRegistry {
    connector: Arc<dyn Connector>,
    table: Arc<SharedTable>,
}

impl SocketRegistry {
    /// Create a registry that opens sockets through `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector, table: Arc::new(SharedTable::default()) }
    }

    /// Create a registry backed by real WebSocket connections.
    pub fn with_tungstenite() -> Self {
        Self::new(Arc::new(TungsteniteConnector::new()))
    }

    /// Acquire a handle for `target`.
    ///
    /// Shared targets resolve their URL here; when resolution fails the
    /// returned handle is already closed and carries the error. Dropping the
    /// returned future before it completes discards the resolution.
    pub async fn acquire(&self, target: ConnectionTarget) -> ConnectionHandle {
        match target.mode {
            ShareMode::Exclusive => self.acquire_exclusive(target),
            ShareMode::Shared => self.acquire_shared(target).await,
        }
    }

    fn acquire_exclusive(&self, target: ConnectionTarget) -> ConnectionHandle {
        let (slot, events) = SubscriberSlot::new(target.filter.clone());
        let id = slot.id;
        let settings = DriverSettings {
            source: target.source,
            query_params: target.query_params,
            protocols: target.protocols,
            policy: target.policy,
            should_reconnect: target.should_reconnect,
            shared: false,
        };
        let link = driver::spawn(settings, Arc::clone(&self.connector), slot);
        ConnectionHandle::new(id, link, events, Release::Exclusive)
    }

    async fn acquire_shared(&self, target: ConnectionTarget) -> ConnectionHandle {
        let resolved = target
            .source
            .resolve()
            .await
            .and_then(|url| apply_query_params(&url, &target.query_params));
        let url = match resolved {
            Ok(url) => url,
            Err(e) => {
                warn!("shared socket URL resolution failed: {e}");
                return ConnectionHandle::closed(e.to_string(), target.protocols, true);
            }
        };

        let (slot, events) = SubscriberSlot::new(target.filter.clone());
        let id = slot.id;
        let release = Release::Shared { key: url.clone(), table: Arc::clone(&self.table) };

        let mut entries = self.table.entries.lock();
        if entries.get(&url).is_some_and(|entry| !entry.link.is_alive()) {
            entries.remove(&url);
        }

        if let Some(entry) = entries.get_mut(&url) {
            let _ = entry.link.commands.send(DriverCommand::Attach(slot));
            entry.subscribers.insert(id);
            debug!("attached to shared socket {url} ({} subscribers)", entry.subscribers.len());
            return ConnectionHandle::new(id, entry.link.clone(), events, release);
        }

        let settings = DriverSettings {
            source: UrlSource::Static(url.clone()),
            query_params: Vec::new(),
            protocols: target.protocols,
            policy: target.policy,
            should_reconnect: target.should_reconnect,
            shared: true,
        };
        let link = driver::spawn(settings, Arc::clone(&self.connector), slot);
        entries.insert(
            url.clone(),
            SharedEntry { link: link.clone(), subscribers: HashSet::from([id]) },
        );
        info!("opened shared socket {url}");
        ConnectionHandle::new(id, link, events, release)
    }

    /// Release a handle. Equivalent to dropping it.
    pub fn release(&self, handle: ConnectionHandle) {
        drop(handle);
    }

    /// Number of live shared sockets.
    pub fn shared_socket_count(&self) -> usize {
        self.table.entries.lock().len()
    }

    /// Whether a shared socket exists for `url`.
    pub fn has_shared(&self, url: &str) -> bool {
        self.table.entries.lock().contains_key(url)
    }

    /// Number of handles attached to the shared socket at `url`.
    pub fn shared_subscriber_count(&self, url: &str) -> usize {
        self.table
            .entries
            .lock()
            .get(url)
            .map_or(0, |entry| entry.subscribers.len())
    }
}
