//! Activity gate and the gated run loop.
//!
//! A protocol client is connected only while the gate reports active. The
//! gate is derived from which screen is showing (against a set of "live"
//! screens) or set directly.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::event_bus::{AppEvent, EventBus};

/// Gate phase as seen by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// Gate closed; client disconnected.
    Inactive,
    /// Gate open; client connected.
    Active,
    /// The gate was dropped; the run loop has ended.
    Stopped,
}

impl std::fmt::Display for GatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Active => write!(f, "active"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Publishes whether real-time clients should be connected.
#[derive(Clone)]
pub struct ActivityGate {
    sender: Arc<watch::Sender<bool>>,
    live_screens: Arc<HashSet<String>>,
    event_bus: Option<EventBus>,
}

impl ActivityGate {
    /// Create a gate, initially inactive. `live_screens` lists the screens
    /// that keep clients connected.
    pub fn new<I, S>(live_screens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            live_screens: Arc::new(live_screens.into_iter().map(Into::into).collect()),
            event_bus: None,
        }
    }

    /// Publish gate changes on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Whether the gate is currently open.
    pub fn is_active(&self) -> bool {
        *self.sender.borrow()
    }

    /// Open or close the gate directly.
    pub fn set_active(&self, active: bool) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == active {
                return false;
            }
            *current = active;
            true
        });
        if changed {
            info!("activity gate {}", if active { "opened" } else { "closed" });
            if let Some(bus) = &self.event_bus {
                bus.emit(AppEvent::GateChanged { active });
            }
        }
    }

    /// Derive the gate from the screen now showing.
    pub fn set_screen(&self, screen: &str) {
        let active = self.live_screens.contains(screen);
        debug!("screen changed to {screen} (live: {active})");
        self.set_active(active);
    }

    /// Receiver for gate changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// A client whose connection follows the activity gate.
///
/// `next_input` must be cancel-safe: the run loop races it against gate
/// changes. `handle_input` runs to completion.
#[async_trait]
pub trait GatedClient: Send {
    /// Work item produced while connected.
    type Input: Send;

    /// Name used in logs.
    fn name(&self) -> &str;

    /// Establish the connection (gate opened).
    async fn activate(&mut self);

    /// Tear the connection down (gate closed or run loop ending).
    async fn deactivate(&mut self);

    /// Wait for the next input. `None` means no more input until reactivated.
    async fn next_input(&mut self) -> Option<Self::Input>;

    /// Process one input.
    async fn handle_input(&mut self, input: Self::Input);
}

/// Drive `client` according to `gate` until the gate is dropped.
pub async fn run_gated<C: GatedClient>(client: &mut C, mut gate: watch::Receiver<bool>) {
    let mut phase = GatePhase::Inactive;

    loop {
        let active = *gate.borrow_and_update();
        match (phase, active) {
            (GatePhase::Inactive, true) => {
                info!("{}: gate active, connecting", client.name());
                client.activate().await;
                phase = GatePhase::Active;
            }
            (GatePhase::Active, false) => {
                info!("{}: gate inactive, disconnecting", client.name());
                client.deactivate().await;
                phase = GatePhase::Inactive;
            }
            _ => {}
        }

        if phase == GatePhase::Active {
            tokio::select! {
                changed = gate.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                input = client.next_input() => match input {
                    Some(input) => client.handle_input(input).await,
                    None => {
                        debug!("{}: input ended, waiting for gate change", client.name());
                        if gate.changed().await.is_err() {
                            break;
                        }
                    }
                },
            }
        } else if gate.changed().await.is_err() {
            break;
        }
    }

    if phase == GatePhase::Active {
        client.deactivate().await;
    }
    debug!("{}: run loop {}", client.name(), GatePhase::Stopped);
}
