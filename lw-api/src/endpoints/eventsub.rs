//! Event-subscription endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use lw_core::error::{LwError, LwResult};

use crate::client::ApiClient;
use crate::response::HelixResponse;

const SUBSCRIPTIONS_PATH: &str = "/eventsub/subscriptions";

/// Transport details of a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportInfo {
    /// Delivery method; always "websocket" for subscriptions made here.
    pub method: String,
    /// Session the subscription delivers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl TransportInfo {
    /// WebSocket transport bound to `session_id`.
    pub fn websocket(session_id: impl Into<String>) -> Self {
        Self { method: "websocket".into(), session_id: Some(session_id.into()) }
    }
}

/// A server-side subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Remote subscription id.
    pub id: String,
    /// Topic, e.g. "channel.follow".
    #[serde(rename = "type")]
    pub subscription_type: String,
    /// Topic version.
    #[serde(default)]
    pub version: String,
    /// Status, e.g. "enabled" or "websocket_disconnected".
    #[serde(default)]
    pub status: String,
    /// Topic-specific condition object.
    #[serde(default)]
    pub condition: serde_json::Value,
    /// Where notifications are delivered.
    pub transport: TransportInfo,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Cost counted against the client's subscription budget.
    #[serde(default)]
    pub cost: u64,
}

/// Filter for listing subscriptions. All fields are optional; the API
/// accepts at most one of them per request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionFilter {
    /// Only subscriptions with this status.
    pub status: Option<String>,
    /// Only subscriptions for this topic.
    pub subscription_type: Option<String>,
    /// Only subscriptions whose condition references this user id.
    pub user_id: Option<String>,
}

impl SubscriptionFilter {
    /// Filter by topic.
    pub fn by_type(topic: impl Into<String>) -> Self {
        Self { subscription_type: Some(topic.into()), ..Self::default() }
    }

    /// Filter by status.
    pub fn by_status(status: impl Into<String>) -> Self {
        Self { status: Some(status.into()), ..Self::default() }
    }

    /// Query pairs for the set fields, in a fixed order.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("status", &self.status),
            ("type", &self.subscription_type),
            ("user_id", &self.user_id),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }
}

/// Request body for creating a subscription.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSubscriptionParams<'a> {
    #[serde(rename = "type")]
    pub subscription_type: &'a str,
    pub version: &'a str,
    pub condition: &'a serde_json::Value,
    pub transport: TransportInfo,
}

impl ApiClient {
    /// Create a subscription delivered to the WebSocket session `session_id`.
    pub async fn create_eventsub_subscription(
        &self,
        topic: &str,
        version: &str,
        condition: &serde_json::Value,
        session_id: &str,
    ) -> LwResult<SubscriptionInfo> {
        let params = CreateSubscriptionParams {
            subscription_type: topic,
            version,
            condition,
            transport: TransportInfo::websocket(session_id),
        };
        let body = serde_json::to_value(&params)?;
        let resp: HelixResponse<SubscriptionInfo> =
            self.post_json(SUBSCRIPTIONS_PATH, &body).await?;
        let created = resp.into_first().ok_or_else(|| {
            LwError::Protocol(format!("create subscription for {topic} returned no data"))
        })?;
        info!("created subscription {} for {topic} v{version}", created.id);
        Ok(created)
    }

    /// Delete a subscription by id.
    pub async fn delete_eventsub_subscription(&self, id: &str) -> LwResult<()> {
        self.delete_with_query(SUBSCRIPTIONS_PATH, &[("id", id)]).await?;
        info!("deleted subscription {id}");
        Ok(())
    }

    /// List subscriptions, following pagination to the end.
    pub async fn list_eventsub_subscriptions(
        &self,
        filter: &SubscriptionFilter,
    ) -> LwResult<Vec<SubscriptionInfo>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = filter.query_pairs();
            if let Some(after) = cursor.as_deref() {
                query.push(("after", after));
            }
            let resp: HelixResponse<SubscriptionInfo> =
                self.get_json_with_query(SUBSCRIPTIONS_PATH, &query).await?;
            let more = resp.has_more();
            cursor = resp.pagination.as_ref().and_then(|p| p.cursor.clone());
            all.extend(resp.data);
            if !more {
                break;
            }
        }

        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_query() {
        assert!(SubscriptionFilter::default().query_pairs().is_empty());
        assert_eq!(
            SubscriptionFilter::by_type("channel.follow").query_pairs(),
            vec![("type", "channel.follow")]
        );
        let filter = SubscriptionFilter {
            status: Some("enabled".into()),
            user_id: Some("42".into()),
            ..SubscriptionFilter::default()
        };
        assert_eq!(filter.query_pairs(), vec![("status", "enabled"), ("user_id", "42")]);
    }

    #[test]
    fn test_create_params_serialize() {
        let condition = serde_json::json!({"broadcaster_user_id": "1"});
        let params = CreateSubscriptionParams {
            subscription_type: "channel.follow",
            version: "2",
            condition: &condition,
            transport: TransportInfo::websocket("s1"),
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["type"], "channel.follow");
        assert_eq!(value["version"], "2");
        assert_eq!(value["condition"]["broadcaster_user_id"], "1");
        assert_eq!(value["transport"]["method"], "websocket");
        assert_eq!(value["transport"]["session_id"], "s1");
    }

    #[test]
    fn test_parse_subscription_info() {
        let json = r#"{
            "id": "f1c2a387-161a-49f9-a165-0f21d7a4e1c4",
            "status": "enabled",
            "type": "channel.follow",
            "version": "2",
            "cost": 1,
            "condition": {"broadcaster_user_id": "1234"},
            "transport": {"method": "websocket", "session_id": "AQoQexAWVYKSTIu4ec_2VAxyuhAB"},
            "created_at": "2023-04-11T10:11:12.123Z"
        }"#;
        let info: SubscriptionInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.subscription_type, "channel.follow");
        assert_eq!(info.transport.session_id.as_deref(), Some("AQoQexAWVYKSTIu4ec_2VAxyuhAB"));
        assert_eq!(info.cost, 1);
        assert!(info.created_at.is_some());
    }
}
