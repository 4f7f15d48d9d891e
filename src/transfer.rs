//! Pass-through and chunked relaying of a probed file.
//!
//! [`TransferOrchestrator::events`] describes a transfer as a lazy stream of
//! [`Outbound`] commands. Nothing is fetched until the stream is polled, and
//! the next range is only requested after the previous command was consumed,
//! so at most one fetch per transfer is in flight. [`TransferOrchestrator::transfer`]
//! drives that stream into a [`Notifier`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use reqwest::StatusCode;
use url::Url;

use crate::error::{MEGABYTE, RelayError, RelayResult};
use crate::fetch::Fetcher;
use crate::messages;
use crate::notifier::{ChatId, MessageId, Notifier};
use crate::plan::ChunkPlan;
use crate::probe::ResourceMetadata;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1500 * MEGABYTE;
pub const DEFAULT_CHUNK_SIZE: u64 = 45 * MEGABYTE;
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    /// Largest file accepted at all.
    pub max_file_size: u64,
    /// Largest single delivery; files above it are split when chunking is on.
    pub chunk_size: u64,
    /// Pause between two part deliveries.
    pub chunk_delay: Duration,
    pub chunking_enabled: bool,
    pub progress_updates: bool,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            chunking_enabled: true,
            progress_updates: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMode {
    PassThrough,
    Chunked(ChunkPlan),
}

/// Decide how `metadata` is relayed, or reject it.
pub fn select_mode(
    metadata: &ResourceMetadata,
    settings: &TransferSettings,
) -> RelayResult<TransferMode> {
    if metadata.total_bytes > settings.max_file_size {
        return Err(RelayError::PayloadTooLarge {
            limit: settings.max_file_size,
            actual: metadata.total_bytes,
        });
    }

    if metadata.total_bytes <= settings.chunk_size {
        return Ok(TransferMode::PassThrough);
    }

    if !settings.chunking_enabled {
        return Err(RelayError::PayloadTooLarge {
            limit: settings.chunk_size,
            actual: metadata.total_bytes,
        });
    }

    Ok(TransferMode::Chunked(ChunkPlan::new(
        &metadata.file_name,
        metadata.total_bytes,
        settings.chunk_size,
    )))
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_fetched: u64,
    pub total_bytes: u64,
}

/// One message the transfer wants delivered, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Informational text; a failed delivery does not abort the transfer.
    Notice(String),
    Text(String),
    File { name: String, bytes: Bytes },
    Progress(TransferProgress),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    PassedThrough { file_name: String, bytes: u64 },
    Chunked { file_name: String, parts: u64, bytes: u64 },
}

pub struct TransferOrchestrator {
    fetcher: Arc<dyn Fetcher>,
    settings: TransferSettings,
}

impl TransferOrchestrator {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: TransferSettings) -> Self {
        Self { fetcher, settings }
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    pub fn events<'a>(
        &'a self,
        url: &'a Url,
        metadata: &'a ResourceMetadata,
        mode: TransferMode,
    ) -> BoxStream<'a, RelayResult<Outbound>> {
        let stream = async_stream::try_stream! {
            yield Outbound::Notice(messages::download_started(
                &metadata.file_name,
                metadata.total_bytes,
            ));

            match mode {
                TransferMode::PassThrough => {
                    let response = self.fetcher.get(url, None).await?;
                    if !response.status.is_success() {
                        Err(RelayError::TransferFailed { status: response.status })?;
                    }

                    yield Outbound::Progress(TransferProgress {
                        bytes_fetched: response.body.len() as u64,
                        total_bytes: metadata.total_bytes,
                    });
                    yield Outbound::File {
                        name: metadata.file_name.clone(),
                        bytes: response.body,
                    };
                    yield Outbound::Text(messages::file_sent());
                }
                TransferMode::Chunked(plan) => {
                    yield Outbound::Notice(messages::split_announcement(plan.chunk_count()));

                    let mut bytes_fetched = 0u64;
                    for part in plan.parts() {
                        if part.index > 0 {
                            tokio::time::sleep(self.settings.chunk_delay).await;
                        }

                        let response = self
                            .fetcher
                            .get(url, Some(part.byte_range()))
                            .await
                            .map_err(|e| RelayError::ChunkFetch {
                                index: part.index,
                                reason: e.to_string(),
                            })?;
                        if response.status != StatusCode::PARTIAL_CONTENT {
                            Err(RelayError::ChunkFetch {
                                index: part.index,
                                reason: format!("server answered {}", response.status),
                            })?;
                        }
                        if response.body.len() as u64 != part.len() {
                            Err(RelayError::ChunkFetch {
                                index: part.index,
                                reason: format!(
                                    "expected {} bytes, received {}",
                                    part.len(),
                                    response.body.len()
                                ),
                            })?;
                        }

                        tracing::debug!(
                            part = part.index + 1,
                            of = plan.chunk_count(),
                            start = part.start,
                            end = part.end,
                            "fetched part"
                        );

                        bytes_fetched += response.body.len() as u64;
                        yield Outbound::Progress(TransferProgress {
                            bytes_fetched,
                            total_bytes: metadata.total_bytes,
                        });
                        yield Outbound::File {
                            name: part.name.clone(),
                            bytes: response.body,
                        };
                    }

                    yield Outbound::Text(plan.merge_instructions());
                }
            }
        };

        Box::pin(stream)
    }

    /// Relay the file at `url` to `chat`.
    ///
    /// Parts delivered before a failure stay delivered.
    pub async fn transfer(
        &self,
        chat: ChatId,
        url: &Url,
        metadata: &ResourceMetadata,
        notifier: &dyn Notifier,
    ) -> RelayResult<TransferOutcome> {
        let mode = select_mode(metadata, &self.settings)?;
        let chunked = matches!(mode, TransferMode::Chunked(_));

        tracing::info!(
            chat = %chat,
            file_name = %metadata.file_name,
            total_bytes = metadata.total_bytes,
            chunked,
            "starting transfer"
        );

        let mut events = self.events(url, metadata, mode);
        let mut progress_message: Option<MessageId> = None;
        let mut files = 0u64;
        let mut bytes = 0u64;

        while let Some(event) = events.next().await {
            match event? {
                Outbound::Notice(text) => {
                    if let Err(e) = notifier.notify_text(chat, &text).await {
                        tracing::warn!(chat = %chat, error = %e, "failed to send notice");
                    }
                }
                Outbound::Text(text) => {
                    notifier.notify_text(chat, &text).await?;
                }
                Outbound::File { name, bytes: payload } => {
                    let len = payload.len() as u64;
                    notifier.notify_file(chat, payload, &name).await?;
                    files += 1;
                    bytes += len;
                    tracing::info!(chat = %chat, file_name = %name, bytes = len, "delivered file");
                }
                Outbound::Progress(progress) => {
                    if self.settings.progress_updates {
                        progress_message = self
                            .report_progress(chat, progress_message, &progress, notifier)
                            .await;
                    }
                }
            }
        }

        let file_name = metadata.file_name.clone();
        Ok(if chunked {
            TransferOutcome::Chunked {
                file_name,
                parts: files,
                bytes,
            }
        } else {
            TransferOutcome::PassedThrough { file_name, bytes }
        })
    }

    async fn report_progress(
        &self,
        chat: ChatId,
        message: Option<MessageId>,
        progress: &TransferProgress,
        notifier: &dyn Notifier,
    ) -> Option<MessageId> {
        let text = messages::progress(progress.bytes_fetched, progress.total_bytes);
        match message {
            Some(id) => {
                if let Err(e) = notifier.update_text(chat, id, &text).await {
                    tracing::debug!(chat = %chat, error = %e, "failed to update progress");
                }
                Some(id)
            }
            None => match notifier.notify_text(chat, &text).await {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::debug!(chat = %chat, error = %e, "failed to send progress");
                    None
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ByteRange;
    use crate::fetch::testing::FakeFetcher;
    use crate::notifier::MockNotifier;
    use crate::notifier::testing::{Delivery, RecordingNotifier};

    const CHAT: ChatId = ChatId(42);

    fn url() -> Url {
        Url::parse("https://example.com/files/base.ext").unwrap()
    }

    fn metadata(total_bytes: u64) -> ResourceMetadata {
        ResourceMetadata {
            total_bytes,
            file_name: "base.ext".to_string(),
            content_type: None,
        }
    }

    fn quiet(settings: TransferSettings) -> TransferSettings {
        TransferSettings {
            progress_updates: false,
            ..settings
        }
    }

    #[test]
    fn test_select_mode_boundaries() {
        let settings = TransferSettings::default();

        assert_eq!(
            select_mode(&metadata(DEFAULT_CHUNK_SIZE), &settings).unwrap(),
            TransferMode::PassThrough
        );
        assert!(matches!(
            select_mode(&metadata(DEFAULT_CHUNK_SIZE + 1), &settings).unwrap(),
            TransferMode::Chunked(plan) if plan.chunk_count() == 2
        ));
        assert!(matches!(
            select_mode(&metadata(DEFAULT_MAX_FILE_SIZE), &settings),
            Ok(TransferMode::Chunked(_))
        ));
        assert!(matches!(
            select_mode(&metadata(DEFAULT_MAX_FILE_SIZE + 1), &settings),
            Err(RelayError::PayloadTooLarge { limit, actual })
                if limit == DEFAULT_MAX_FILE_SIZE && actual == DEFAULT_MAX_FILE_SIZE + 1
        ));
    }

    #[test]
    fn test_select_mode_without_chunking() {
        let settings = TransferSettings {
            chunking_enabled: false,
            ..TransferSettings::default()
        };
        assert!(matches!(
            select_mode(&metadata(DEFAULT_CHUNK_SIZE + 1), &settings),
            Err(RelayError::PayloadTooLarge { limit, .. }) if limit == DEFAULT_CHUNK_SIZE
        ));
    }

    #[tokio::test]
    async fn test_small_file_passes_through() {
        let fake = Arc::new(FakeFetcher::sized(10485760));
        let orchestrator = TransferOrchestrator::new(fake.clone(), quiet(TransferSettings::default()));
        let notifier = RecordingNotifier::default();

        let outcome = orchestrator
            .transfer(CHAT, &url(), &metadata(10485760), &notifier)
            .await
            .unwrap();

        assert_eq!(fake.get_calls(), vec![None]);
        assert_eq!(
            notifier.files(),
            vec![("base.ext".to_string(), Bytes::from_static(b"whole"))]
        );
        assert!(matches!(outcome, TransferOutcome::PassedThrough { .. }));
        assert_eq!(notifier.texts().last().unwrap(), "File sent successfully!");
    }

    #[tokio::test]
    async fn test_exact_chunk_size_is_not_split() {
        let settings = quiet(TransferSettings {
            chunk_size: 10,
            ..TransferSettings::default()
        });
        let fake = Arc::new(FakeFetcher::with_payload(b"0123456789"));
        let orchestrator = TransferOrchestrator::new(fake.clone(), settings);
        let notifier = RecordingNotifier::default();

        orchestrator
            .transfer(CHAT, &url(), &metadata(10), &notifier)
            .await
            .unwrap();

        assert_eq!(fake.get_calls(), vec![None]);
        assert_eq!(notifier.files().len(), 1);
    }

    #[tokio::test]
    async fn test_pass_through_failure() {
        let fake = Arc::new(FakeFetcher::sized(100).failing_get(0, StatusCode::FORBIDDEN));
        let orchestrator = TransferOrchestrator::new(fake, quiet(TransferSettings::default()));
        let notifier = RecordingNotifier::default();

        let err = orchestrator
            .transfer(CHAT, &url(), &metadata(100), &notifier)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RelayError::TransferFailed {
                status: StatusCode::FORBIDDEN
            }
        ));
        assert!(notifier.files().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hundred_megabytes_are_sent_in_three_parts() {
        let fake = Arc::new(FakeFetcher::sized(104857600));
        let orchestrator = TransferOrchestrator::new(fake.clone(), quiet(TransferSettings::default()));
        let notifier = RecordingNotifier::default();

        let started = tokio::time::Instant::now();
        let outcome = orchestrator
            .transfer(CHAT, &url(), &metadata(104857600), &notifier)
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(
            fake.get_calls(),
            vec![
                Some(ByteRange { start: 0, end: 47185919 }),
                Some(ByteRange { start: 47185920, end: 94371839 }),
                Some(ByteRange { start: 94371840, end: 104857599 }),
            ]
        );
        let names: Vec<String> = notifier.files().into_iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["base_part1of3.ext", "base_part2of3.ext", "base_part3of3.ext"]
        );

        // Announcement first, merge instructions last.
        let deliveries = notifier.deliveries();
        assert_eq!(
            deliveries[1],
            Delivery::Text("File will be split into 3 parts".to_string())
        );
        assert!(matches!(
            deliveries.last().unwrap(),
            Delivery::Text(text) if text.starts_with("How to merge the 3 parts")
        ));

        // Two pauses between three parts.
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed < Duration::from_secs(9));

        assert!(matches!(outcome, TransferOutcome::Chunked { parts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parts_reassemble_to_original() {
        let payload: &'static [u8] = b"The quick brown fox jumps over the lazy dog";
        let settings = quiet(TransferSettings {
            chunk_size: 10,
            ..TransferSettings::default()
        });
        let fake = Arc::new(FakeFetcher::with_payload(payload));
        let orchestrator = TransferOrchestrator::new(fake, settings);
        let notifier = RecordingNotifier::default();

        let outcome = orchestrator
            .transfer(CHAT, &url(), &metadata(payload.len() as u64), &notifier)
            .await
            .unwrap();

        let rebuilt: Vec<u8> = notifier
            .files()
            .into_iter()
            .flat_map(|(_, bytes)| bytes.to_vec())
            .collect();
        assert_eq!(rebuilt, payload);
        assert_eq!(
            outcome,
            TransferOutcome::Chunked {
                file_name: "base.ext".to_string(),
                parts: 5,
                bytes: payload.len() as u64,
            }
        );
    }

    #[tokio::test]
    async fn test_too_large_is_rejected_without_fetching() {
        let fake = Arc::new(FakeFetcher::sized(DEFAULT_MAX_FILE_SIZE + 1));
        let orchestrator = TransferOrchestrator::new(fake.clone(), TransferSettings::default());
        let notifier = RecordingNotifier::default();

        let err = orchestrator
            .transfer(CHAT, &url(), &metadata(DEFAULT_MAX_FILE_SIZE + 1), &notifier)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::PayloadTooLarge { .. }));
        assert!(fake.calls().is_empty());
        assert!(notifier.deliveries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_second_part_aborts() {
        let fake = Arc::new(FakeFetcher::sized(104857600).failing_get(1, StatusCode::BAD_GATEWAY));
        let orchestrator = TransferOrchestrator::new(fake.clone(), quiet(TransferSettings::default()));
        let notifier = RecordingNotifier::default();

        let err = orchestrator
            .transfer(CHAT, &url(), &metadata(104857600), &notifier)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::ChunkFetch { index: 1, .. }));
        assert_eq!(fake.get_calls().len(), 2);
        assert_eq!(notifier.files().len(), 1);
        assert!(!notifier.texts().iter().any(|t| t.starts_with("How to merge")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_ignoring_range_aborts_first_part() {
        let payload: &'static [u8] = b"0123456789abcdefghijklmnopqrst";
        let settings = quiet(TransferSettings {
            chunk_size: 10,
            ..TransferSettings::default()
        });
        let mut fake = FakeFetcher::with_payload(payload);
        fake.ignore_range = true;
        let fake = Arc::new(fake);
        let orchestrator = TransferOrchestrator::new(fake.clone(), settings);
        let notifier = RecordingNotifier::default();

        let err = orchestrator
            .transfer(CHAT, &url(), &metadata(30), &notifier)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::ChunkFetch { index: 0, .. }));
        assert_eq!(fake.get_calls().len(), 1);
        assert!(notifier.files().is_empty());
        assert!(!notifier.texts().iter().any(|t| t.starts_with("How to merge")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_part_body_aborts() {
        let settings = quiet(TransferSettings {
            chunk_size: 10,
            ..TransferSettings::default()
        });
        // Ten bytes advertised per part, but the source only has 25 of 30.
        let mut fake = FakeFetcher::with_payload(b"0123456789abcdefghijklmno");
        fake.content_length = Some(30);
        let fake = Arc::new(fake);
        let orchestrator = TransferOrchestrator::new(fake, settings);
        let notifier = RecordingNotifier::default();

        let err = orchestrator
            .transfer(CHAT, &url(), &metadata(30), &notifier)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::ChunkFetch { index: 2, .. }));
        assert_eq!(notifier.files().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_edits_one_message() {
        let payload: &'static [u8] = b"0123456789abcdefghijklmnopqrst";
        let settings = TransferSettings {
            chunk_size: 10,
            ..TransferSettings::default()
        };
        let orchestrator =
            TransferOrchestrator::new(Arc::new(FakeFetcher::with_payload(payload)), settings);
        let notifier = RecordingNotifier::default();

        orchestrator
            .transfer(CHAT, &url(), &metadata(30), &notifier)
            .await
            .unwrap();

        let updates: Vec<Delivery> = notifier
            .deliveries()
            .into_iter()
            .filter(|d| matches!(d, Delivery::Update { .. }))
            .collect();
        assert_eq!(updates.len(), 2);
        assert!(matches!(
            updates.last().unwrap(),
            Delivery::Update { text, .. } if text.ends_with("(100%)")
        ));
    }

    #[tokio::test]
    async fn test_notifier_failure_on_file_is_propagated() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify_text()
            .returning(|_, _| Err(RelayError::Notifier("rate limited".into())));
        notifier
            .expect_notify_file()
            .times(1)
            .returning(|_, _, _| Err(RelayError::Notifier("file too big".into())));

        let orchestrator = TransferOrchestrator::new(
            Arc::new(FakeFetcher::sized(100)),
            quiet(TransferSettings::default()),
        );

        let err = orchestrator
            .transfer(CHAT, &url(), &metadata(100), &notifier)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Notifier(msg) if msg == "file too big"));
    }
}
