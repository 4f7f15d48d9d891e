//! Error types for the relay core.
//!
//! Every variant renders to a sentence that can be shown to the chat user
//! as-is, so `Display` output is part of the user-facing contract.

use reqwest::StatusCode;
use thiserror::Error;

pub const MEGABYTE: u64 = 1024 * 1024;

/// Render a byte count as megabytes with two decimals.
pub fn megabytes(bytes: &u64) -> String {
    format!("{:.2}", *bytes as f64 / MEGABYTE as f64)
}

#[derive(Debug, Error)]
pub enum RelayError {
    /// The text supplied by the user is not an absolute http(s) URL.
    #[error("invalid URL: {0}")]
    InvalidInput(String),

    /// The metadata probe returned a non-success status.
    #[error("cannot access file (server answered {status})")]
    UnreachableResource { status: StatusCode },

    /// No usable `Content-Length` on the probe response.
    #[error("could not determine file size")]
    SizeUnknown,

    #[error(
        "file too large: maximum allowed size is {} MB, your file is {} MB",
        megabytes(.limit),
        megabytes(.actual)
    )]
    PayloadTooLarge { limit: u64, actual: u64 },

    /// Whole-body fetch failed after the probe succeeded.
    #[error("failed to download file (server answered {status})")]
    TransferFailed { status: StatusCode },

    /// A range fetch failed; `index` is zero-based, the message is one-based.
    #[error("failed to download part {} ({})", .index + 1, .reason)]
    ChunkFetch { index: u64, reason: String },

    #[error("failed to deliver message: {0}")]
    Notifier(String),

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// True for errors raised before any body was requested.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RelayError::InvalidInput(_)
                | RelayError::UnreachableResource { .. }
                | RelayError::SizeUnknown
                | RelayError::PayloadTooLarge { .. }
        )
    }
}
