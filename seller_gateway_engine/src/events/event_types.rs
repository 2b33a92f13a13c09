use chrono::{DateTime, Utc};
use meli_tools::{Notification, NotificationTopic};
use serde::Serialize;
use sgw_common::UserId;

/// The "something changed" signal pushed to a user's live connections after a webhook is
/// processed. Carries enough for the UI to decide what to refetch, nothing more; the
/// event stream makes no promises about processing outcome.
#[derive(Debug, Clone, Serialize)]
pub struct MarketplaceEvent {
    pub user_id: UserId,
    pub topic: NotificationTopic,
    pub resource: String,
    pub published_at: DateTime<Utc>,
}

impl MarketplaceEvent {
    pub fn from_notification(user_id: UserId, notification: &Notification) -> Self {
        Self {
            user_id,
            topic: notification.topic,
            resource: notification.resource.clone(),
            published_at: Utc::now(),
        }
    }
}
