//! User-facing texts.

use crate::error::{RelayError, megabytes};

pub fn welcome(max_file_size: u64, chunk_size: u64, chunking_enabled: bool) -> String {
    let limits = if chunking_enabled {
        format!(
            "Maximum file size: {} MB\nEach part: {} MB",
            megabytes(&max_file_size),
            megabytes(&chunk_size)
        )
    } else {
        format!("Maximum file size: {} MB", megabytes(&max_file_size.min(chunk_size)))
    };

    format!(
        "Welcome to File Grabber Bot\n\
         \n\
         This bot downloads a file from a link and sends it to you.\n\
         \n\
         How to use:\n\
         1. Send a file URL\n\
         2. The bot downloads and sends the file\n\
         3. Large files are split into parts\n\
         4. Merge instructions are sent after the last part\n\
         \n\
         Limits:\n\
         {limits}"
    )
}

pub fn help() -> String {
    "Send a direct link to a file (http or https) and the bot sends the file back.\n\
     \n\
     Commands:\n\
     /start - introduction and limits\n\
     /help - this message\n\
     /about - about this bot"
        .to_string()
}

pub fn about() -> String {
    format!(
        "File Grabber Bot {}\n\
         Fetches files by URL and relays them, splitting large ones into parts.",
        env!("CARGO_PKG_VERSION")
    )
}

pub fn unknown_command(command: &str) -> String {
    format!("Unknown command {command}. Send /help to see what the bot can do.")
}

pub fn download_started(file_name: &str, total_bytes: u64) -> String {
    format!(
        "Downloading {file_name}\nSize: {} MB",
        megabytes(&total_bytes)
    )
}

pub fn split_announcement(chunk_count: u64) -> String {
    format!("File will be split into {chunk_count} parts")
}

pub fn progress(bytes_fetched: u64, total_bytes: u64) -> String {
    let percent = if total_bytes == 0 {
        100
    } else {
        bytes_fetched.saturating_mul(100) / total_bytes
    };
    format!(
        "Downloaded {} of {} MB ({percent}%)",
        megabytes(&bytes_fetched),
        megabytes(&total_bytes)
    )
}

pub fn file_sent() -> String {
    "File sent successfully!".to_string()
}

pub fn error(err: &RelayError) -> String {
    match err {
        RelayError::InvalidInput(_) => {
            "Error: invalid URL\n\nPlease send a valid file URL.".to_string()
        }
        other => format!("Error: {other}\n\nPlease try again."),
    }
}
