//! CLI command implementations.

pub mod chat;
pub mod eventsub;
pub mod config;

use lw_api::ApiClient;
use lw_core::config::ConfigHandle;
use lw_core::error::{LwError, LwResult};

/// Helper to create an API client from config.
pub async fn create_api_client(config: &ConfigHandle) -> LwResult<ApiClient> {
    let cfg = config.read().await;
    ApiClient::new(&cfg)
}

/// Map a prompt failure into the CLI's error type.
pub fn prompt_error(e: dialoguer::Error) -> LwError {
    LwError::Internal(format!("prompt failed: {e}"))
}

/// Truncate a string to a maximum number of characters, appending an ellipsis if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max_len).collect()
    }
}
