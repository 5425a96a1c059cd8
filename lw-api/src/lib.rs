//! Livewire API - HTTP client for the event-subscription REST API.
//!
//! This crate provides the REST collaborator the event-notification session
//! uses to register and remove server-side subscriptions. It handles the
//! client-id and bearer-token headers, timeouts, and automatic retry with
//! exponential backoff.

pub mod client;
pub mod endpoints;
pub mod response;
pub mod subscription;

// Re-export key types
pub use client::{ApiClient, RetryConfig};
pub use endpoints::eventsub::{SubscriptionFilter, SubscriptionInfo, TransportInfo};
pub use response::{HelixResponse, Pagination};
pub use subscription::SubscriptionApi;
