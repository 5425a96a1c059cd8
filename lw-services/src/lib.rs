//! Livewire Services - protocol clients and their coordination.
//!
//! This crate provides the two real-time protocol clients and the pieces that
//! drive them:
//! - Chat client (line codec, framing, typed events, filtering, replies)
//! - Event-notification session (welcome, keepalive watchdog, redirects,
//!   per-topic callbacks, time-boxed subscription cleanup)
//! - Activity gate (connect only while a live screen is showing)
//! - Event bus (typed lifecycle events for observers)
//! - Ordered callback lists with failure isolation

pub mod callbacks;
pub mod event_bus;
pub mod gate;
pub mod chat;
pub mod eventsub;

// Re-export key types
pub use callbacks::{Callback, CallbackList, CallbackToken};
pub use event_bus::{AppEvent, EventBus};
pub use gate::{run_gated, ActivityGate, GatePhase, GatedClient};
pub use chat::{ChatClient, ChatMessage, Credentials, ReplyTo};
pub use eventsub::{EventSubClient, EventSubInput, EventSubSession, Notification};
