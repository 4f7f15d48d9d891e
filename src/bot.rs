//! Turns an inbound chat message into a reply or a transfer.

use std::sync::Arc;

use crate::error::RelayError;
use crate::fetch::Fetcher;
use crate::messages;
use crate::notifier::{ChatId, Notifier};
use crate::probe::{SourceProbe, parse_source_url};
use crate::transfer::{TransferOrchestrator, TransferOutcome, TransferSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    About,
}

/// Parse a reserved command token, ignoring a `@botname` suffix.
///
/// Returns `Some(Err(token))` for slash tokens that are not commands.
pub fn parse_command(text: &str) -> Option<Result<Command, &str>> {
    let token = text.trim().split_whitespace().next()?;
    if !token.starts_with('/') {
        return None;
    }

    let name = token.split('@').next().unwrap_or(token);
    Some(match name {
        "/start" => Ok(Command::Start),
        "/help" => Ok(Command::Help),
        "/about" => Ok(Command::About),
        _ => Err(token),
    })
}

#[derive(Debug)]
pub enum Handled {
    Ignored,
    Command(Command),
    UnknownCommand,
    Transferred(TransferOutcome),
    Failed(RelayError),
}

pub struct Bot {
    probe: SourceProbe,
    orchestrator: TransferOrchestrator,
    notifier: Arc<dyn Notifier>,
}

impl Bot {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn Notifier>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            probe: SourceProbe::new(fetcher.clone()),
            orchestrator: TransferOrchestrator::new(fetcher, settings),
            notifier,
        }
    }

    async fn reply(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.notifier.notify_text(chat, text).await {
            tracing::warn!(chat = %chat, error = %e, "failed to send reply");
        }
    }

    fn command_text(&self, command: Command) -> String {
        let settings = self.orchestrator.settings();
        match command {
            Command::Start => messages::welcome(
                settings.max_file_size,
                settings.chunk_size,
                settings.chunking_enabled,
            ),
            Command::Help => messages::help(),
            Command::About => messages::about(),
        }
    }

    /// Handle one message. Failures are reported to `chat`, never returned.
    pub async fn handle_text(&self, chat: ChatId, text: &str) -> Handled {
        if text.trim().is_empty() {
            return Handled::Ignored;
        }

        match parse_command(text) {
            Some(Ok(command)) => {
                self.reply(chat, &self.command_text(command)).await;
                return Handled::Command(command);
            }
            Some(Err(token)) => {
                self.reply(chat, &messages::unknown_command(token)).await;
                return Handled::UnknownCommand;
            }
            None => {}
        }

        let result = async {
            let url = parse_source_url(text)?;
            let metadata = self.probe.probe(&url).await?;
            self.orchestrator
                .transfer(chat, &url, &metadata, self.notifier.as_ref())
                .await
        }
        .await;

        match result {
            Ok(outcome) => {
                tracing::info!(chat = %chat, outcome = ?outcome, "transfer complete");
                Handled::Transferred(outcome)
            }
            Err(err) => {
                if err.is_rejection() {
                    tracing::info!(chat = %chat, error = %err, "request rejected");
                } else {
                    tracing::error!(chat = %chat, error = %err, "transfer failed");
                }
                self.reply(chat, &messages::error(&err)).await;
                Handled::Failed(err)
            }
        }
    }
}
