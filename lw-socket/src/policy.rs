//! Reconnect policy: capped exponential backoff with an attempt limit.

use std::time::Duration;

use lw_core::config::SocketConfig;
use lw_core::constants::{
    BACKOFF_GROWTH, BACKOFF_MAX_MULTIPLIER, DEFAULT_RECONNECT_INTERVAL_MS,
    DEFAULT_RECONNECT_LIMIT,
};

use crate::events::CloseInfo;

/// Delay before reconnect attempt `attempt` (0-based).
///
/// `round(base * min(1.5^attempt, 8))`: the multiplier grows by half each
/// attempt and is capped at eight times the base interval.
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let exponent = attempt.min(64) as i32;
    let multiplier = BACKOFF_GROWTH.powi(exponent).min(BACKOFF_MAX_MULTIPLIER);
    let millis = (base.as_millis() as f64 * multiplier).round();
    Duration::from_millis(millis as u64)
}

/// What to do after a connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconnect after `delay`.
    Retry {
        /// Wait before the next attempt.
        delay: Duration,
    },
    /// The attempt limit is reached; report and stop.
    Exhausted,
    /// Reconnecting does not apply (normal close or vetoed by the owner).
    Disabled,
}

/// Reconnect policy attached to a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Maximum number of consecutive attempts.
    pub limit: u32,
    /// Base interval the backoff grows from.
    pub base_interval: Duration,
    /// Make the first attempt immediately instead of after the base interval.
    pub immediate_first_retry: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RECONNECT_LIMIT,
            base_interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
            immediate_first_retry: true,
        }
    }
}

impl ReconnectPolicy {
    /// Build a policy from the socket configuration section.
    pub fn from_config(config: &SocketConfig) -> Self {
        Self {
            limit: config.reconnect_limit,
            base_interval: Duration::from_millis(config.reconnect_interval_ms),
            immediate_first_retry: config.immediate_first_retry,
        }
    }

    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self { limit: 0, ..Self::default() }
    }

    /// Decide what follows a close, given how many attempts were already made
    /// since the last successful open and whether the owner approves.
    pub fn decide(&self, attempt: u32, close: &CloseInfo, approved: bool) -> ReconnectDecision {
        if close.is_normal() || !approved {
            return ReconnectDecision::Disabled;
        }
        if attempt >= self.limit {
            return ReconnectDecision::Exhausted;
        }
        let delay = if attempt == 0 && self.immediate_first_retry {
            Duration::ZERO
        } else {
            backoff_delay(attempt, self.base_interval)
        };
        ReconnectDecision::Retry { delay }
    }
}
