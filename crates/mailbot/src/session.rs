//! The user-facing session tying scanning, unsubscribing and reporting
//! together.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{error, info, warn};
use serde::Serialize;
use tracing::{info_span, Instrument};

use crate::broadcast::{ProgressBroadcaster, ProgressEvent, ProgressPhase};
use crate::cancel::CancelFlag;
use crate::config::{MailbotConfig, StoreKind};
use crate::email::{find_spam_folder, EmailError, MailSession, MailboxScanner, ScanSummary};
use crate::error::{ConfigError, Result};
use crate::registry::{normalize_sender, Newsletter, NewsletterRegistry};
use crate::report::Report;
use crate::sanitize::url_host;
use crate::store::{JsonFileStore, ProcessedLedger, SqliteStore, StoreBackend};
use crate::unsubscribe::{
    build_client, AttemptReport, HtmlFormConfirmer, MailSender, NoPageAutomation, PageConfirmer,
    UnsubscribeExecutor,
};

/// Outcome of one unsubscribe run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeRun {
    pub attempts: Vec<AttemptReport>,
    /// Requested senders that are not part of the current scan.
    pub unknown: Vec<String>,
    pub cancelled: bool,
}

/// One user's scan-then-unsubscribe workflow.
///
/// All operations take `&mut self`, so only one scan or unsubscribe run is
/// active at a time. The cancel flag applies to the operation running when it
/// is set and is cleared when the next one starts.
pub struct UnsubscribeSession {
    config: MailbotConfig,
    registry: NewsletterRegistry,
    executor: UnsubscribeExecutor,
    progress: ProgressBroadcaster,
    cancel: CancelFlag,
    last_scan: Option<ScanSummary>,
    attempts: HashMap<String, AttemptReport>,
}

impl UnsubscribeSession {
    pub fn new(
        config: MailbotConfig,
        ledger: Arc<ProcessedLedger>,
        executor: UnsubscribeExecutor,
    ) -> Self {
        Self {
            config,
            registry: NewsletterRegistry::new(ledger),
            executor,
            progress: ProgressBroadcaster::default(),
            cancel: CancelFlag::new(),
            last_scan: None,
            attempts: HashMap::new(),
        }
    }

    /// Opens the configured store and builds the executor.
    pub fn from_config(config: MailbotConfig, mail: Option<Arc<dyn MailSender>>) -> Result<Self> {
        let ledger = Arc::new(open_ledger(&config)?);
        let mut executor = build_executor(&config)?;
        if let Some(mail) = mail {
            executor = executor.with_mail_sender(mail);
        }
        Ok(Self::new(config, ledger, executor))
    }

    pub fn with_progress(mut self, progress: ProgressBroadcaster) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &MailbotConfig {
        &self.config
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn progress(&self) -> &ProgressBroadcaster {
        &self.progress
    }

    pub fn registry(&self) -> &NewsletterRegistry {
        &self.registry
    }

    pub fn last_scan(&self) -> Option<&ScanSummary> {
        self.last_scan.as_ref()
    }

    /// Newsletters of the last scan that still await a decision.
    pub fn pending(&self) -> Vec<Newsletter> {
        self.registry.list_pending()
    }

    /// Runs a fresh scan pass over the configured folders and, if enabled,
    /// the spam folder.
    ///
    /// Aggregates of a previous pass are discarded; processed state is kept.
    pub async fn scan(&mut self, session: &mut dyn MailSession) -> Result<ScanSummary> {
        self.cancel.reset();
        let folders = self.resolve_folders(session).await?;

        let span = info_span!("scan_pass", folders = folders.len(), limit = %self.config.limit);
        let summary = async {
            self.registry.begin_pass();
            self.attempts.clear();

            let scanner = MailboxScanner::new(self.config.scan_settings(), self.cancel.clone())
                .with_progress(self.progress.clone());
            scanner
                .scan_folders(session, &folders, &mut self.registry)
                .await
        }
        .instrument(span)
        .await?;

        let phase = if summary.cancelled {
            ProgressPhase::Cancelled
        } else {
            ProgressPhase::ScanCompleted
        };
        self.progress.send(ProgressEvent::new(
            phase,
            summary.messages_seen,
            summary.messages_seen,
            &format!("{} newsletters found", self.registry.len()),
        ));

        self.last_scan = Some(summary.clone());
        Ok(summary)
    }

    async fn resolve_folders(&self, session: &mut dyn MailSession) -> Result<Vec<String>> {
        let mut folders = self.config.folders.clone();
        if !self.config.include_spam {
            return Ok(folders);
        }

        let fetch_timeout = self.config.scan_settings().fetch_timeout;
        let listing = match tokio::time::timeout(fetch_timeout, session.list_folders()).await {
            Err(_) => {
                let reason = "Listing folders timed out".to_string();
                return Err(EmailError::ConnectionFailed(reason).into());
            }
            Ok(Ok(listing)) => listing,
            Ok(Err(e)) if e.is_fatal() => return Err(e.into()),
            Ok(Err(e)) => {
                warn!("Could not list folders, skipping spam folder: {}", e);
                return Ok(folders);
            }
        };

        match find_spam_folder(&listing) {
            Some(spam) if !folders.iter().any(|f| f.eq_ignore_ascii_case(&spam)) => {
                info!("Including spam folder '{}'", spam);
                folders.push(spam);
            }
            Some(_) => {}
            None => info!("No spam folder found on this account"),
        }
        Ok(folders)
    }

    /// Unsubscribes from the given senders of the last scan, in order.
    ///
    /// Senders already processed are attempted again when named explicitly.
    /// A cancel lets the running attempt finish and starts no further ones.
    /// If the store cannot persist an outcome the run stops with that error;
    /// attempts completed so far remain visible through [`Self::report`].
    pub async fn unsubscribe(&mut self, senders: &[String]) -> Result<UnsubscribeRun> {
        self.cancel.reset();
        let span = info_span!("unsubscribe_run", senders = senders.len());
        self.run_unsubscribe(senders).instrument(span).await
    }

    /// Unsubscribes from every pending newsletter.
    pub async fn unsubscribe_all_pending(&mut self) -> Result<UnsubscribeRun> {
        let senders: Vec<String> = self.pending().into_iter().map(|n| n.sender).collect();
        self.unsubscribe(&senders).await
    }

    async fn run_unsubscribe(&mut self, senders: &[String]) -> Result<UnsubscribeRun> {
        let mut run = UnsubscribeRun::default();
        let mut work = Vec::new();
        let mut queued = HashSet::new();
        for sender in senders {
            match self.registry.get(sender) {
                Some(newsletter) => {
                    if queued.insert(newsletter.sender.clone()) {
                        work.push((newsletter.sender.clone(), newsletter.targets.clone()));
                    }
                }
                None => {
                    warn!("{} is not a newsletter of the last scan", sender);
                    run.unknown.push(normalize_sender(sender));
                }
            }
        }

        let total = work.len() as u32;
        for (idx, (sender, targets)) in work.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("Unsubscribe run cancelled after {} of {}", idx, total);
                run.cancelled = true;
                self.progress.send(ProgressEvent::new(
                    ProgressPhase::Cancelled,
                    idx as u32,
                    total,
                    "Unsubscribe run cancelled",
                ));
                break;
            }

            let host = targets
                .primary
                .url()
                .map(url_host)
                .unwrap_or_else(|| "mail".to_string());
            let span = info_span!("unsubscribe_attempt", sender = %sender, host = %host);
            let attempt = self
                .executor
                .execute(&sender, &targets)
                .instrument(span)
                .await?;
            self.progress.send(ProgressEvent::attempt(
                &sender,
                attempt.state,
                idx as u32 + 1,
                total,
            ));

            let persisted = match attempt.state.outcome() {
                Some(outcome) => self
                    .registry
                    .mark_processed(&sender, outcome, attempt.detail())
                    .await
                    .map(|_| ()),
                None => Ok(()),
            };

            self.attempts.insert(sender.clone(), attempt.clone());
            run.attempts.push(attempt);

            if let Err(e) = persisted {
                error!("Could not persist outcome for {}: {}", sender, e);
                return Err(e.into());
            }
        }

        if !run.cancelled {
            self.progress.send(ProgressEvent::new(
                ProgressPhase::UnsubscribeCompleted,
                total,
                total,
                &format!("{} attempts finished", run.attempts.len()),
            ));
        }
        Ok(run)
    }

    /// Makes a sender eligible again.
    pub fn reset(&mut self, sender: &str) -> Result<bool> {
        self.attempts.remove(&normalize_sender(sender));
        Ok(self.registry.reset(sender)?)
    }

    /// Makes every sender eligible again.
    pub fn reset_all(&mut self) -> Result<usize> {
        self.attempts.clear();
        Ok(self.registry.reset_all()?)
    }

    /// Current state of every newsletter of the last scan.
    pub fn report(&self) -> Report {
        let ledger = self.registry.ledger();
        Report::build(
            &self.registry.all(),
            &self.attempts,
            |sender| ledger.get(sender),
            self.last_scan.as_ref(),
        )
    }
}

/// Opens the processed-state ledger configured in `config.store`.
pub fn open_ledger(config: &MailbotConfig) -> Result<ProcessedLedger> {
    let path = config
        .store
        .resolved_path()
        .ok_or_else(|| ConfigError::Validation {
            message: "cannot determine the store path: no home directory".to_string(),
        })?;

    let backend: Box<dyn StoreBackend> = match config.store.kind {
        StoreKind::Sqlite => Box::new(SqliteStore::open(&path)?),
        StoreKind::Json => Box::new(JsonFileStore::new(path)),
    };
    Ok(ProcessedLedger::open(backend)?)
}

/// Builds the executor, with HTML form automation unless disabled.
pub fn build_executor(config: &MailbotConfig) -> Result<UnsubscribeExecutor> {
    let settings = config.executor_settings();
    let page: Arc<dyn PageConfirmer> = if config.page_automation {
        Arc::new(HtmlFormConfirmer::new(build_client(&settings)?))
    } else {
        Arc::new(NoPageAutomation)
    };
    Ok(UnsubscribeExecutor::new(settings, page)?)
}
