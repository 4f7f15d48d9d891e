//! Resolve size and name of a remote file before anything is downloaded.

use std::sync::Arc;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{RelayError, RelayResult};
use crate::fetch::Fetcher;
use crate::plan::split_file_name;

/// Name used when neither the path nor the query yields one.
pub const FALLBACK_FILE_NAME: &str = "downloaded_file";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    pub total_bytes: u64,
    pub file_name: String,
    pub content_type: Option<String>,
}

/// Parse user text into a source URL. No network activity.
pub fn parse_source_url(text: &str) -> RelayResult<Url> {
    let url = Url::parse(text.trim()).map_err(|e| RelayError::InvalidInput(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(RelayError::InvalidInput(format!(
            "unsupported scheme '{other}'"
        ))),
    }
}

fn has_extension(name: &str) -> bool {
    split_file_name(name).1.is_some()
}

/// Replace path separators and characters that are special inside a quoted
/// shell or `cmd` argument, since names end up in merge commands.
fn sanitize(name: &str) -> String {
    name.replace(['/', '\\', '"', '$', '`', '%'], "_")
        .trim()
        .to_string()
}

/// Derive a file name from the URL.
///
/// Order: last path segment with an extension, then a query value with a dot
/// whose key mentions `file` or `name`, then the last path segment as is,
/// then [`FALLBACK_FILE_NAME`].
pub fn derive_file_name(url: &Url) -> String {
    let last_segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|segment| sanitize(&percent_decode_str(segment).decode_utf8_lossy()))
        .filter(|segment| !segment.is_empty());

    if let Some(segment) = last_segment.as_ref().filter(|s| has_extension(s)) {
        return segment.clone();
    }

    url.query_pairs()
        .find(|(key, value)| {
            let key = key.to_ascii_lowercase();
            (key.contains("file") || key.contains("name")) && value.contains('.')
        })
        .map(|(_, value)| sanitize(&value))
        .filter(|name| !name.is_empty())
        .or(last_segment)
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

pub struct SourceProbe {
    fetcher: Arc<dyn Fetcher>,
}

impl SourceProbe {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn probe(&self, url: &Url) -> RelayResult<ResourceMetadata> {
        let response = self.fetcher.head(url).await?;

        if !response.status.is_success() {
            tracing::info!(url = %url, status = %response.status, "source unreachable");
            return Err(RelayError::UnreachableResource {
                status: response.status,
            });
        }

        let total_bytes = match response.content_length {
            Some(length) if length > 0 => length,
            _ => return Err(RelayError::SizeUnknown),
        };

        let metadata = ResourceMetadata {
            total_bytes,
            file_name: derive_file_name(url),
            content_type: response.content_type,
        };

        tracing::debug!(
            url = %url,
            total_bytes,
            file_name = %metadata.file_name,
            "probed source"
        );

        Ok(metadata)
    }
}
