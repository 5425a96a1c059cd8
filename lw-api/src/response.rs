//! Response envelope types.
//!
//! Collection endpoints wrap their results in a common envelope:
//! ```json
//! { "data": [ ... ], "total": 1, "pagination": { "cursor": "..." } }
//! ```

use serde::{Deserialize, Serialize};

/// Standard collection response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelixResponse<T = serde_json::Value> {
    /// Result items.
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    /// Total number of matching items, when the endpoint reports it.
    #[serde(default)]
    pub total: Option<u64>,
    /// Cost of all subscriptions held by the client, when reported.
    #[serde(default)]
    pub total_cost: Option<u64>,
    /// Pagination cursor.
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl<T> HelixResponse<T> {
    /// The first item, if any.
    pub fn first(&self) -> Option<&T> {
        self.data.first()
    }

    /// Consume the envelope, returning the first item.
    pub fn into_first(self) -> Option<T> {
        self.data.into_iter().next()
    }

    /// Whether another page is available.
    pub fn has_more(&self) -> bool {
        self.pagination
            .as_ref()
            .and_then(|p| p.cursor.as_deref())
            .is_some_and(|cursor| !cursor.is_empty())
    }
}

/// Pagination metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pagination {
    /// Cursor for the next page.
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Error body returned alongside 4xx/5xx statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short error name.
    #[serde(default)]
    pub error: String,
    /// Status echoed in the body.
    #[serde(default)]
    pub status: u16,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}
