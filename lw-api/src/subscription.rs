//! Subscription-management boundary used by the event-notification session.

use async_trait::async_trait;

use lw_core::error::LwResult;

use crate::client::ApiClient;
use crate::endpoints::eventsub::{SubscriptionFilter, SubscriptionInfo};

/// Creates and removes server-side subscriptions bound to a session.
#[async_trait]
pub trait SubscriptionApi: Send + Sync {
    /// Create a subscription for `topic` delivered to `session_id`; returns its id.
    async fn create_subscription(
        &self,
        topic: &str,
        version: &str,
        condition: &serde_json::Value,
        session_id: &str,
    ) -> LwResult<String>;

    /// Delete a subscription by id.
    async fn delete_subscription(&self, id: &str) -> LwResult<()>;

    /// List existing subscriptions.
    async fn list_subscriptions(&self, filter: &SubscriptionFilter) -> LwResult<Vec<SubscriptionInfo>>;
}

#[async_trait]
impl SubscriptionApi for ApiClient {
    async fn create_subscription(
        &self,
        topic: &str,
        version: &str,
        condition: &serde_json::Value,
        session_id: &str,
    ) -> LwResult<String> {
        let created = self
            .create_eventsub_subscription(topic, version, condition, session_id)
            .await?;
        Ok(created.id)
    }

    async fn delete_subscription(&self, id: &str) -> LwResult<()> {
        self.delete_eventsub_subscription(id).await
    }

    async fn list_subscriptions(&self, filter: &SubscriptionFilter) -> LwResult<Vec<SubscriptionInfo>> {
        self.list_eventsub_subscriptions(filter).await
    }
}
