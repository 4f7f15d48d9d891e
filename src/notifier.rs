//! Delivery of text and files to a chat.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::RelayResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of a sent text message, used to edit it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

/// The messaging capability the relay delivers through.
///
/// Message bodies are opaque; implementations own any markup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_text(&self, chat: ChatId, text: &str) -> RelayResult<MessageId>;

    async fn notify_file(&self, chat: ChatId, bytes: Bytes, file_name: &str) -> RelayResult<()>;

    async fn update_text(&self, chat: ChatId, message: MessageId, text: &str) -> RelayResult<()>;
}
