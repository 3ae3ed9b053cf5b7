//! REST service for the notification mailbox.

use std::sync::Arc;

use async_trait::async_trait;

use gigboard_core::{NotificationApi, NotificationPage, Result, UnreadCount};

use crate::http::ApiClient;

/// `NotificationApi` backed by the shared [`ApiClient`].
pub struct NotificationService {
    client: Arc<ApiClient>,
}

impl NotificationService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationApi for NotificationService {
    async fn list(&self, page: u32, limit: u32) -> Result<NotificationPage> {
        self.client
            .get_json(
                "/notifications",
                &[("page", page.to_string()), ("limit", limit.to_string())],
            )
            .await
    }

    async fn unread_count(&self) -> Result<u64> {
        let body: UnreadCount = self
            .client
            .get_json("/notifications/unread-count", &[])
            .await?;
        Ok(body.count)
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        self.client
            .patch(&format!("/notifications/{}/read", id))
            .await
    }

    async fn mark_all_read(&self) -> Result<()> {
        self.client.patch("/notifications/read-all").await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.client.delete(&format!("/notifications/{}", id)).await
    }
}
