use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueHint};
use iocraft::prelude::*;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;
use url::Url;

use file_relay::{
    Bot, ReqwestFetcher, SourceProbe, TelegramClient, TransferMode, config, parse_source_url,
    select_mode, webhook,
};

use crate::ui::{ErrorMessage, ProbeReport};

mod ui;

#[derive(Parser)]
#[command(name = "file-relay")]
#[command(version)]
#[command(about = "A Telegram bot that downloads files by URL and sends them back")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },
    /// Show how a URL would be relayed without downloading it
    Probe {
        #[arg(value_hint = ValueHint::Url)]
        url: String,
    },
    /// Register the webhook URL with Telegram
    SetWebhook {
        #[arg(value_hint = ValueHint::Url)]
        url: Url,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;
    let cli = Cli::parse();

    rt.block_on(async {
        let config = config::read_config(cli.config.as_deref())?;

        match cli.command {
            Commands::Serve { listen } => serve(config, listen).await,
            Commands::Probe { url } => probe(config, &url).await,
            Commands::SetWebhook { url } => set_webhook(config, url).await,
        }
    })
}

fn build_fetcher(config: &config::Config) -> Result<Arc<ReqwestFetcher>> {
    let fetcher = ReqwestFetcher::new(&config.user_agent, config.retry, config.fetch_timeout)
        .context("Failed to build HTTP client")?;
    Ok(Arc::new(fetcher))
}

async fn serve(config: config::Config, listen: Option<SocketAddr>) -> Result<()> {
    let token = config.telegram_token()?.to_string();
    let telegram = TelegramClient::new(config.telegram_api_url.clone(), token);
    let bot = Bot::new(build_fetcher(&config)?, Arc::new(telegram), config.transfer);

    let app = webhook::create_router(webhook::AppState::new(bot, config.webhook_secret.clone()));
    let addr = listen.unwrap_or(config.listen_addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        %addr,
        max_file_size = config.transfer.max_file_size,
        chunk_size = config.transfer.chunk_size,
        chunking_enabled = config.transfer.chunking_enabled,
        "webhook server listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

async fn probe(config: config::Config, url: &str) -> Result<()> {
    let url = match parse_source_url(url) {
        Ok(url) => url,
        Err(e) => {
            element!(ErrorMessage(message: e.to_string())).print();
            return Err(e.into());
        }
    };

    let probe = SourceProbe::new(build_fetcher(&config)?);
    let metadata = probe.probe(&url).await?;

    let (parts, merge_instructions) = match select_mode(&metadata, &config.transfer) {
        Ok(TransferMode::PassThrough) => (Vec::new(), None),
        Ok(TransferMode::Chunked(plan)) => {
            let instructions = plan.merge_instructions();
            (plan.parts().to_vec(), Some(instructions))
        }
        Err(e) => {
            element!(ErrorMessage(message: e.to_string())).print();
            return Err(e.into());
        }
    };

    element! {
        ProbeReport(
            url: url.to_string(),
            file_name: metadata.file_name,
            total_bytes: metadata.total_bytes,
            content_type: metadata.content_type,
            parts: parts,
            merge_instructions: merge_instructions,
        )
    }
    .print();

    Ok(())
}

async fn set_webhook(config: config::Config, url: Url) -> Result<()> {
    let token = config.telegram_token()?.to_string();
    let telegram = TelegramClient::new(config.telegram_api_url.clone(), token);
    telegram
        .set_webhook(&url, config.webhook_secret.as_deref())
        .await?;
    println!("Webhook set to {}", url);
    Ok(())
}
