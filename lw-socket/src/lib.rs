//! Livewire Socket - multiplexing WebSocket manager.
//!
//! This crate provides the connection layer both protocol clients sit on:
//! - A socket registry with exclusive (one owner) and shared (fan-out) sockets
//! - A reconnect policy with capped exponential backoff
//! - Connection handles that queue sends until the socket opens
//! - A guarded socket view exposing read accessors and `reconnect()` only
//! - A transport abstraction over `tokio-tungstenite`, plus an in-memory
//!   mock transport for tests

pub mod events;
pub mod transport;
pub mod policy;
pub mod target;
mod driver;
pub mod handle;
pub mod registry;
pub mod testing;

// Re-export key types
pub use events::{CloseInfo, ConnectionState, SocketEvent};
pub use transport::{Connector, Frame, TungsteniteConnector, WsReader, WsWriter};
pub use policy::{backoff_delay, ReconnectDecision, ReconnectPolicy};
pub use target::{ConnectionTarget, ShareMode, UrlResolver, UrlSource};
pub use handle::{ConnectionHandle, SocketView};
pub use registry::SocketRegistry;
