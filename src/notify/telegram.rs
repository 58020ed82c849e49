//! Telegram Bot API transport: notifications out, operator commands in.

use super::Notifier;
use crate::command::{CommandSource, IncomingMessage};
use crate::config::TelegramConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Pause before polling again after a failed getUpdates.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Thin Bot API client bound to one chat.
#[derive(Clone)]
pub struct TelegramApi {
    http: Client,
    bot_url: String,
    chat_id: String,
}

impl TelegramApi {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        Self::with_api_url(DEFAULT_API_URL, config)
    }

    pub fn with_api_url(api_url: &str, config: &TelegramConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()
            .context("Failed to create Telegram HTTP client")?;

        Ok(Self {
            http,
            bot_url: format!("{}/bot{}", api_url.trim_end_matches('/'), config.bot_token),
            chat_id: config.chat_id.clone(),
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Send `text` to the configured chat, optionally as a reply.
    pub async fn send_message(&self, text: &str, reply_to: Option<i64>) -> Result<()> {
        let mut body = json!({ "chat_id": self.chat_id, "text": text });
        if let Some(message_id) = reply_to {
            body["reply_to_message_id"] = json!(message_id);
        }

        let response: ApiResponse<serde_json::Value> = self
            .http
            .post(format!("{}/sendMessage", self.bot_url))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(anyhow!(
                "sendMessage rejected: {}",
                response.description.unwrap_or_default()
            ));
        }
        Ok(())
    }

    /// Long-poll for updates with `update_id >= offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let response: ApiResponse<Vec<Update>> = self
            .http
            .get(format!("{}/getUpdates", self.bot_url))
            .query(&[("offset", offset.to_string()), ("timeout", timeout_secs.to_string())])
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(anyhow!(
                "getUpdates rejected: {}",
                response.description.unwrap_or_default()
            ));
        }
        Ok(response.result.unwrap_or_default())
    }
}

#[async_trait]
impl Notifier for TelegramApi {
    async fn notify(&self, message: &str) {
        match self.send_message(message, None).await {
            Ok(()) => info!("Telegram message sent: {}", message),
            Err(e) => error!("Failed to send Telegram message: {}", e),
        }
    }
}

/// Operator commands read from the configured chat via getUpdates.
pub struct TelegramCommands {
    api: TelegramApi,
    offset: i64,
    poll_timeout_secs: u64,
    pending: VecDeque<IncomingMessage>,
}

impl TelegramCommands {
    pub fn new(api: TelegramApi, poll_timeout_secs: u64) -> Self {
        Self {
            api,
            offset: 0,
            poll_timeout_secs,
            pending: VecDeque::new(),
        }
    }

    /// Queue text messages from our chat and advance the offset past every update.
    fn absorb(&mut self, updates: Vec<Update>) {
        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            if message.chat.id.to_string() != self.api.chat_id() {
                debug!(chat = message.chat.id, "Ignoring message from foreign chat");
                continue;
            }
            if let Some(text) = message.text {
                self.pending.push_back(IncomingMessage {
                    text,
                    message_id: Some(message.message_id),
                });
            }
        }
    }
}

#[async_trait]
impl CommandSource for TelegramCommands {
    async fn next_message(&mut self) -> Option<IncomingMessage> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Some(message);
            }

            match self.api.get_updates(self.offset, self.poll_timeout_secs).await {
                Ok(updates) => self.absorb(updates),
                Err(e) => {
                    warn!("Telegram polling failed: {}", e);
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                }
            }
        }
    }

    async fn reply(&self, to: &IncomingMessage, text: &str) {
        if let Err(e) = self.api.send_message(text, to.message_id).await {
            error!("Failed to reply on Telegram: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> TelegramConfig {
        TelegramConfig {
            bot_token: "TOKEN".to_string(),
            chat_id: "42".to_string(),
            poll_timeout_secs: 0,
        }
    }

    #[tokio::test]
    async fn test_send_message_targets_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_json(json!({ "chat_id": "42", "text": "hello", "reply_to_message_id": 7 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
            .expect(1)
            .mount(&server)
            .await;

        let api = TelegramApi::with_api_url(&server.uri(), &config()).unwrap();
        api.send_message("hello", Some(7)).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_send_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "ok": false, "description": "Bad Request: chat not found" }),
            ))
            .mount(&server)
            .await;

        let api = TelegramApi::with_api_url(&server.uri(), &config()).unwrap();
        let err = api.send_message("hello", None).await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn test_commands_filter_chat_and_advance_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botTOKEN/getUpdates"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    { "update_id": 10, "message": { "message_id": 1, "chat": { "id": 99 }, "text": "/update_price 1" } },
                    { "update_id": 11, "message": { "message_id": 2, "chat": { "id": 42 }, "text": "/update_price 60.5" } },
                    { "update_id": 12 }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/botTOKEN/getUpdates"))
            .and(query_param("offset", "13"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    { "update_id": 13, "message": { "message_id": 3, "chat": { "id": 42 }, "text": "hi" } }
                ]
            })))
            .mount(&server)
            .await;

        let api = TelegramApi::with_api_url(&server.uri(), &config()).unwrap();
        let mut commands = TelegramCommands::new(api, 0);

        let first = commands.next_message().await.unwrap();
        assert_eq!(first.text, "/update_price 60.5");
        assert_eq!(first.message_id, Some(2));

        let second = commands.next_message().await.unwrap();
        assert_eq!(second.text, "hi");
        assert_eq!(commands.offset, 14);
    }
}
