//! HTTP implementation of the history and read-receipt collaborators.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{ChatRoomId, MessageId},
    error::ApiError,
    protocol::{ChatRoom, MessagePayload},
};
use tracing::debug;
use url::Url;

use crate::{config::FeedSettings, HistoryPage, MessageHistory, ReadReceiptSink};

#[derive(Serialize)]
struct ListMessagesQuery {
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    before: Option<i64>,
}

#[derive(Clone)]
pub struct RestChatBackend {
    http: Client,
    base_url: Url,
}

impl RestChatBackend {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    pub fn from_settings(settings: &FeedSettings) -> Result<Self> {
        Ok(Self::new(settings.server_base_url()?))
    }

    pub async fn fetch_chat_room(&self, chat_room_id: ChatRoomId) -> Result<ChatRoom> {
        let url = self.endpoint(&format!("chat_rooms/{chat_room_id}"))?;
        let response = self.http.get(url).send().await?;
        decode_json(response).await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid endpoint path '{path}'"))
    }
}

#[async_trait]
impl MessageHistory for RestChatBackend {
    async fn fetch_older_messages(
        &self,
        chat_room_id: ChatRoomId,
        before: Option<MessageId>,
        page_size: u32,
    ) -> Result<HistoryPage> {
        let url = self.endpoint(&format!("chat_rooms/{chat_room_id}/messages"))?;
        let response = self
            .http
            .get(url)
            .query(&ListMessagesQuery {
                limit: page_size,
                before: before.map(|id| id.0),
            })
            .send()
            .await?;
        let messages: Vec<MessagePayload> = decode_json(response).await?;
        debug!(
            %chat_room_id,
            before = ?before.map(|id| id.0),
            returned = messages.len(),
            "rest: fetched history page"
        );
        Ok(HistoryPage {
            messages,
            end_of_history: false,
        })
    }
}

#[async_trait]
impl ReadReceiptSink for RestChatBackend {
    async fn submit_read_receipt(&self, message_id: MessageId) -> Result<()> {
        let url = self.endpoint(&format!("messages/{message_id}/read"))?;
        let response = self.http.post(url).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = ensure_success(response).await?;
    Ok(response.json().await?)
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => {
            Err(anyhow::Error::new(api_error).context(format!("request failed with status {status}")))
        }
        Err(_) => Err(anyhow!("request failed with status {status}: {body}")),
    }
}

#[cfg(test)]
#[path = "tests/rest_tests.rs"]
mod tests;
