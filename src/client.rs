use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use crate::error::{RelayError, RelayResult};
use crate::notifier::{ChatId, MessageId, Notifier};
use crate::rest_types::{
    ApiResponse, EditMessageTextRequest, SendMessageRequest, SentMessage, SetWebhookRequest,
};

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

const SEND_MESSAGE_METHOD: &str = "sendMessage";
const EDIT_MESSAGE_TEXT_METHOD: &str = "editMessageText";
const SEND_DOCUMENT_METHOD: &str = "sendDocument";
const SET_WEBHOOK_METHOD: &str = "setWebhook";

/// Bot API client used as the relay's [`Notifier`].
pub struct TelegramClient {
    client: Client,
    api_base_url: Url,
    token: String,
}

fn delivery_error(err: reqwest::Error) -> RelayError {
    // The request URL carries the bot token.
    RelayError::Notifier(err.without_url().to_string())
}

impl TelegramClient {
    pub fn new(api_base_url: Url, token: String) -> Self {
        Self {
            client: Client::new(),
            api_base_url,
            token,
        }
    }

    fn method_url(&self, method: &str) -> RelayResult<Url> {
        let mut url = self.api_base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RelayError::Notifier("Bot API URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push(&format!("bot{}", self.token))
            .push(method);
        Ok(url)
    }

    async fn read_response<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> RelayResult<T> {
        let status = response.status();
        let body: ApiResponse<T> = response.json().await.map_err(delivery_error)?;

        match (body.ok, body.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(RelayError::Notifier(format!(
                "{} failed ({}): {}",
                method,
                body.error_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| status.as_u16().to_string()),
                body.description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> RelayResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method)?)
            .json(body)
            .send()
            .await
            .map_err(delivery_error)?;

        Self::read_response(method, response).await
    }

    pub async fn send_message(&self, chat: ChatId, text: &str) -> RelayResult<MessageId> {
        let request = SendMessageRequest {
            chat_id: chat,
            text,
            disable_web_page_preview: Some(true),
        };
        let sent: SentMessage = self.call(SEND_MESSAGE_METHOD, &request).await?;
        Ok(sent.message_id)
    }

    pub async fn edit_message_text(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> RelayResult<()> {
        let request = EditMessageTextRequest {
            chat_id: chat,
            message_id: message,
            text,
        };
        // editMessageText answers with the edited Message, or `true` for inline messages.
        let _: serde_json::Value = self.call(EDIT_MESSAGE_TEXT_METHOD, &request).await?;
        Ok(())
    }

    pub async fn send_document(
        &self,
        chat: ChatId,
        data: Bytes,
        file_name: &str,
    ) -> RelayResult<()> {
        let len = data.len() as u64;
        let document = Part::stream_with_length(reqwest::Body::from(data), len)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")
            .map_err(delivery_error)?;

        let form = Form::new()
            .text("chat_id", chat.to_string())
            .part("document", document);

        let response = self
            .client
            .post(self.method_url(SEND_DOCUMENT_METHOD)?)
            .multipart(form)
            .send()
            .await
            .map_err(delivery_error)?;

        let _: serde_json::Value = Self::read_response(SEND_DOCUMENT_METHOD, response).await?;
        Ok(())
    }

    /// Point the bot's webhook at `url`.
    pub async fn set_webhook(&self, url: &Url, secret_token: Option<&str>) -> RelayResult<()> {
        let request = SetWebhookRequest {
            url: url.as_str(),
            secret_token,
        };
        let _: bool = self.call(SET_WEBHOOK_METHOD, &request).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn notify_text(&self, chat: ChatId, text: &str) -> RelayResult<MessageId> {
        self.send_message(chat, text).await
    }

    async fn notify_file(&self, chat: ChatId, bytes: Bytes, file_name: &str) -> RelayResult<()> {
        tracing::debug!(chat = %chat, file_name, bytes = bytes.len(), "sending document");
        self.send_document(chat, bytes, file_name).await
    }

    async fn update_text(&self, chat: ChatId, message: MessageId, text: &str) -> RelayResult<()> {
        self.edit_message_text(chat, message, text).await
    }
}
