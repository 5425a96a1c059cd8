//! Livewire Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by all other Livewire crates:
//! - Application configuration (credentials, socket policy, chat and eventsub options)
//! - Global error types covering all error categories
//! - Structured logging with tracing
//! - Per-user config and log directories
//! - Common constants and type aliases

pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod constants;

// Re-export commonly used items at the crate root
pub use config::{AppConfig, ConfigHandle};
pub use error::{LwError, LwResult};
pub use logging::init_logging;
