//! Mailbox scanner that feeds newsletter candidates into the registry.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::broadcast::{ProgressBroadcaster, ProgressEvent};
use crate::cancel::CancelFlag;
use crate::config::ScanLimit;
use crate::registry::NewsletterRegistry;

use super::error::{EmailError, Result};
use super::header::{is_one_click, parse_list_unsubscribe, TargetSet};
use super::parser::{parse_message, Message};
use super::session::{FetchItem, MailSession};

/// Knobs for a scan pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub limit: ScanLimit,
    pub batch_size: usize,
    pub fetch_timeout: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            limit: ScanLimit::Bounded(200),
            batch_size: 50,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// One element of a folder scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem {
    Message(Message),
    /// Could not be fetched or parsed; counted, never fatal.
    Skipped { uid: u32, reason: String },
}

/// Lazy, newest-first walk over one folder.
///
/// UIDs are listed once when the cursor opens; headers are fetched a batch at
/// a time as the caller pulls items. Not restartable: open a new cursor to
/// scan again.
pub struct FolderCursor {
    folder: String,
    pending: VecDeque<u32>,
    buffer: VecDeque<ScanItem>,
    total: usize,
    batch_size: usize,
    fetch_timeout: Duration,
}

impl FolderCursor {
    /// Lists the folder and keeps the newest `limit` UIDs.
    pub async fn open(
        session: &mut dyn MailSession,
        folder: &str,
        settings: &ScanSettings,
    ) -> Result<Self> {
        let mut uids = tokio::time::timeout(settings.fetch_timeout, session.message_uids(folder))
            .await
            .map_err(|_| {
                EmailError::ConnectionFailed(format!("Listing '{}' timed out", folder))
            })??;

        uids.sort_unstable_by(|a, b| b.cmp(a));
        uids.dedup();
        if let ScanLimit::Bounded(limit) = settings.limit {
            uids.truncate(limit as usize);
        }

        debug!("Folder '{}': {} messages to scan", folder, uids.len());

        Ok(Self {
            folder: folder.to_string(),
            total: uids.len(),
            pending: uids.into(),
            buffer: VecDeque::new(),
            batch_size: settings.batch_size.max(1),
            fetch_timeout: settings.fetch_timeout,
        })
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Number of messages this cursor will yield in total.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of messages already handed out or buffered.
    pub fn fetched(&self) -> usize {
        self.total - self.pending.len()
    }

    /// Whether the next call to [`FolderCursor::next`] is served without I/O.
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Next item, fetching another batch when the buffer runs dry.
    ///
    /// Session-level failures are returned as errors; everything scoped to a
    /// single message comes back as [`ScanItem::Skipped`].
    pub async fn next(&mut self, session: &mut dyn MailSession) -> Result<Option<ScanItem>> {
        if self.buffer.is_empty() && !self.pending.is_empty() {
            self.fetch_batch(session).await?;
        }
        Ok(self.buffer.pop_front())
    }

    async fn fetch_batch(&mut self, session: &mut dyn MailSession) -> Result<()> {
        let take = self.batch_size.min(self.pending.len());
        let batch: Vec<u32> = self.pending.drain(..take).collect();

        let fetched =
            tokio::time::timeout(self.fetch_timeout, session.fetch_headers(&self.folder, &batch))
                .await;

        let items = match fetched {
            Ok(Ok(items)) => items,
            Ok(Err(e)) if e.is_fatal() => return Err(e),
            Ok(Err(e)) => {
                warn!("Batch of {} in '{}' failed: {}", batch.len(), self.folder, e);
                self.skip_all(&batch, &e.to_string());
                return Ok(());
            }
            Err(_) => {
                warn!(
                    "Batch of {} in '{}' timed out after {:?}",
                    batch.len(),
                    self.folder,
                    self.fetch_timeout
                );
                self.skip_all(&batch, "fetch timed out");
                return Ok(());
            }
        };

        for item in items {
            let scan_item = match item {
                FetchItem::Fetched(raw) => match parse_message(&raw.bytes, &self.folder, raw.uid) {
                    Ok(message) => ScanItem::Message(message),
                    Err(e) => ScanItem::Skipped {
                        uid: raw.uid,
                        reason: e.to_string(),
                    },
                },
                FetchItem::Failed { uid, reason } => {
                    debug!("UID {} in '{}' not fetched: {}", uid, self.folder, reason);
                    ScanItem::Skipped { uid, reason }
                }
            };
            self.buffer.push_back(scan_item);
        }
        Ok(())
    }

    fn skip_all(&mut self, uids: &[u32], reason: &str) {
        self.buffer.extend(uids.iter().map(|&uid| ScanItem::Skipped {
            uid,
            reason: reason.to_string(),
        }));
    }
}

/// Per-folder counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderStats {
    pub folder: String,
    pub messages_seen: u32,
    pub newsletter_messages: u32,
    pub skipped: u32,
}

/// Outcome of a scan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub folders: Vec<FolderStats>,
    /// Messages fetched and parsed.
    pub messages_seen: u32,
    /// Messages registered as part of a newsletter.
    pub newsletter_messages: u32,
    /// Messages whose unsubscribe header had no usable entry.
    pub rejected_messages: u32,
    /// Individual header entries that were skipped.
    pub rejected_entries: u32,
    /// Messages that could not be fetched or parsed.
    pub skipped: u32,
    pub cancelled: bool,
}

impl ScanSummary {
    pub fn folder_names(&self) -> Vec<&str> {
        self.folders.iter().map(|f| f.folder.as_str()).collect()
    }
}

/// Drives [`FolderCursor`]s over a set of folders.
pub struct MailboxScanner {
    settings: ScanSettings,
    cancel: CancelFlag,
    progress: Option<ProgressBroadcaster>,
}

impl MailboxScanner {
    pub fn new(settings: ScanSettings, cancel: CancelFlag) -> Self {
        Self {
            settings,
            cancel,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBroadcaster) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Scans the folders in order and registers every newsletter message.
    ///
    /// Stops early, keeping what was aggregated, when the cancel flag is set.
    /// Session-level errors abort the pass.
    pub async fn scan_folders(
        &self,
        session: &mut dyn MailSession,
        folders: &[String],
        registry: &mut NewsletterRegistry,
    ) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();

        for folder in folders {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let span = info_span!("scan_folder", folder = %folder);
            let stats = self
                .scan_folder(session, folder, registry, &mut summary)
                .instrument(span)
                .await?;
            summary.folders.push(stats);

            if summary.cancelled {
                break;
            }
        }

        info!(
            "Scan finished: {} messages, {} newsletter messages from {} senders, {} skipped{}",
            summary.messages_seen,
            summary.newsletter_messages,
            registry.len(),
            summary.skipped,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        Ok(summary)
    }

    async fn scan_folder(
        &self,
        session: &mut dyn MailSession,
        folder: &str,
        registry: &mut NewsletterRegistry,
        summary: &mut ScanSummary,
    ) -> Result<FolderStats> {
        let mut cursor = FolderCursor::open(session, folder, &self.settings).await?;
        let mut stats = FolderStats {
            folder: folder.to_string(),
            ..Default::default()
        };
        info!("Scanning {} messages in '{}'", cursor.total(), folder);

        loop {
            if !cursor.has_buffered() {
                self.report(&cursor);
                if self.cancel.is_cancelled() {
                    info!("Scan of '{}' cancelled", folder);
                    summary.cancelled = true;
                    break;
                }
            }

            let Some(item) = cursor.next(session).await? else {
                break;
            };

            match item {
                ScanItem::Skipped { uid, reason } => {
                    debug!("Skipping UID {} in '{}': {}", uid, folder, reason);
                    stats.skipped += 1;
                    summary.skipped += 1;
                }
                ScanItem::Message(message) => {
                    stats.messages_seen += 1;
                    summary.messages_seen += 1;
                    if classify(&message, registry, summary) {
                        stats.newsletter_messages += 1;
                    }
                }
            }
        }

        Ok(stats)
    }

    fn report(&self, cursor: &FolderCursor) {
        if let Some(progress) = &self.progress {
            progress.send(ProgressEvent::scanning(
                cursor.folder(),
                cursor.fetched() as u32,
                cursor.total() as u32,
            ));
        }
    }
}

/// Parses the unsubscribe metadata of one message and registers it.
///
/// Returns whether the message became part of a newsletter.
fn classify(message: &Message, registry: &mut NewsletterRegistry, summary: &mut ScanSummary) -> bool {
    if !message.has_unsubscribe_header() {
        return false;
    }

    let one_click = is_one_click(message.list_unsubscribe_post.as_deref());
    let parsed = parse_list_unsubscribe(&message.joined_unsubscribe_header(), one_click);
    summary.rejected_entries += parsed.rejected.len() as u32;

    match TargetSet::from_candidates(parsed.targets) {
        Some(targets) => {
            if registry.register(message, targets) {
                summary.newsletter_messages += 1;
                true
            } else {
                false
            }
        }
        None => {
            debug!(
                "Message {} from {} has no usable unsubscribe entry",
                message.id, message.sender
            );
            summary.rejected_messages += 1;
            false
        }
    }
}
