//! Thread-store collaborator calls: plain request/response, no streaming.

use reqwest::Response;
use serde_json::json;

use crate::client::ChatApiClient;
use crate::error::{parse_error_message, ChatApiError};
use crate::payload::{CreatedThread, Thread, ThreadMessage};
use crate::url::{messages_url, thread_url, threads_url};

impl ChatApiClient {
    pub async fn create_thread(&self) -> Result<CreatedThread, ChatApiError> {
        let response = self
            .http()
            .post(threads_url(&self.config().base_url))
            .headers(self.header_map()?)
            .send()
            .await?;
        let response = require_success(response).await?;
        Ok(response.json().await?)
    }

    pub async fn list_threads(&self) -> Result<Vec<Thread>, ChatApiError> {
        let response = self
            .http()
            .get(threads_url(&self.config().base_url))
            .headers(self.header_map()?)
            .send()
            .await?;
        let response = require_success(response).await?;
        Ok(response.json().await?)
    }

    pub async fn delete_thread(&self, thread_id: &str) -> Result<(), ChatApiError> {
        let response = self
            .http()
            .delete(thread_url(&self.config().base_url, thread_id))
            .headers(self.header_map()?)
            .send()
            .await?;
        require_success(response).await?;
        Ok(())
    }

    pub async fn rename_thread(&self, thread_id: &str, title: &str) -> Result<(), ChatApiError> {
        let response = self
            .http()
            .patch(thread_url(&self.config().base_url, thread_id))
            .headers(self.header_map()?)
            .json(&json!({ "title": title }))
            .send()
            .await?;
        require_success(response).await?;
        Ok(())
    }

    pub async fn fetch_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<ThreadMessage>, ChatApiError> {
        let response = self
            .http()
            .get(messages_url(&self.config().base_url, thread_id))
            .headers(self.header_map()?)
            .send()
            .await?;
        let response = require_success(response).await?;
        Ok(response.json().await?)
    }
}

async fn require_success(response: Response) -> Result<Response, ChatApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ChatApiError::Status(
        status,
        parse_error_message(status, &body),
    ))
}
