//! Relay files from a URL to a Telegram chat.
//!
//! [`SourceProbe`] learns the size and name of a remote file with a single
//! HEAD request. [`TransferOrchestrator`] then either relays the whole body,
//! or splits it into fixed-size parts fetched with range requests, delivers
//! them one by one through a [`Notifier`] and finishes with merge
//! instructions.

pub mod bot;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod messages;
pub mod notifier;
pub mod plan;
pub mod probe;
pub mod rest_types;
pub mod serde_utils;
pub mod transfer;
pub mod webhook;

pub use bot::Bot;
pub use client::TelegramClient;
pub use error::{RelayError, RelayResult};
pub use fetch::{ByteRange, FetchResponse, Fetcher, ReqwestFetcher, RetryPolicy};
pub use notifier::{ChatId, MessageId, Notifier};
pub use plan::{ChunkPlan, ChunkRange, part_name, split_file_name};
pub use probe::{ResourceMetadata, SourceProbe, derive_file_name, parse_source_url};
pub use transfer::{
    Outbound, TransferMode, TransferOrchestrator, TransferOutcome, TransferProgress,
    TransferSettings, select_mode,
};
