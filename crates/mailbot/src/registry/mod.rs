//! Newsletter aggregation and processed-state tracking.
//!
//! The registry groups messages by sender, keeps the first unsubscribe
//! target seen for each sender and consults the [`ProcessedLedger`] so that
//! senders handled in a previous run are not offered again.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

use crate::email::{Message, TargetSet};
use crate::store::{Outcome, ProcessedLedger, ProcessedRecord, Result};

/// Canonical form of a sender address used as the aggregation key.
pub fn normalize_sender(sender: &str) -> String {
    sender.trim().to_lowercase()
}

/// All messages of one sender that carry unsubscribe metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Newsletter {
    pub sender: String,
    pub display_name: Option<String>,
    pub count: u32,
    pub targets: TargetSet,
    pub folders: BTreeSet<String>,
    pub latest_subject: Option<String>,
    pub latest_date: Option<DateTime<Utc>>,
    pub processed: bool,
}

impl Newsletter {
    fn from_message(message: &Message, targets: TargetSet, processed: bool) -> Self {
        Self {
            sender: normalize_sender(&message.sender),
            display_name: message.display_name.clone(),
            count: 1,
            targets,
            folders: BTreeSet::from([message.folder.clone()]),
            latest_subject: message.subject.clone(),
            latest_date: message.date,
            processed,
        }
    }

    fn absorb(&mut self, message: &Message) {
        self.count += 1;
        self.folders.insert(message.folder.clone());
        if self.display_name.is_none() {
            self.display_name = message.display_name.clone();
        }

        let newer = match (message.date, self.latest_date) {
            (Some(new), Some(current)) => new > current,
            (Some(_), None) => true,
            _ => false,
        };
        if newer {
            self.latest_date = message.date;
            self.latest_subject = message.subject.clone();
        }
    }
}

/// Sender-keyed newsletter aggregate for one scan pass.
pub struct NewsletterRegistry {
    ledger: Arc<ProcessedLedger>,
    newsletters: BTreeMap<String, Newsletter>,
    seen_messages: HashSet<String>,
}

impl NewsletterRegistry {
    pub fn new(ledger: Arc<ProcessedLedger>) -> Self {
        Self {
            ledger,
            newsletters: BTreeMap::new(),
            seen_messages: HashSet::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<ProcessedLedger> {
        &self.ledger
    }

    /// Drops the aggregates of the previous pass. Processed state is kept.
    pub fn begin_pass(&mut self) {
        self.newsletters.clear();
        self.seen_messages.clear();
    }

    /// Merges a message into its sender's newsletter.
    ///
    /// Returns `false` when the message id was already registered in this
    /// pass, in which case nothing changes.
    pub fn register(&mut self, message: &Message, targets: TargetSet) -> bool {
        if !self.seen_messages.insert(message.id.clone()) {
            debug!("Message {} already registered", message.id);
            return false;
        }

        let key = normalize_sender(&message.sender);
        match self.newsletters.get_mut(&key) {
            Some(existing) => existing.absorb(message),
            None => {
                let processed = self.ledger.is_processed(&key);
                debug!("New newsletter sender {} (processed: {})", key, processed);
                self.newsletters
                    .insert(key, Newsletter::from_message(message, targets, processed));
            }
        }
        true
    }

    /// Newsletters not yet processed, by count descending then sender.
    pub fn list_pending(&self) -> Vec<Newsletter> {
        let mut pending: Vec<Newsletter> = self
            .newsletters
            .values()
            .filter(|n| !n.processed && !self.ledger.is_processed(&n.sender))
            .cloned()
            .collect();
        sort_by_count(&mut pending);
        pending
    }

    /// Every newsletter of the pass, processed or not, in report order.
    pub fn all(&self) -> Vec<Newsletter> {
        let mut all: Vec<Newsletter> = self.newsletters.values().cloned().collect();
        sort_by_count(&mut all);
        all
    }

    pub fn get(&self, sender: &str) -> Option<&Newsletter> {
        self.newsletters.get(&normalize_sender(sender))
    }

    pub fn len(&self) -> usize {
        self.newsletters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.newsletters.is_empty()
    }

    /// Persists the outcome, then flags the in-memory newsletter.
    ///
    /// The write runs on the blocking pool. If the store rejects it the
    /// newsletter stays pending.
    pub async fn mark_processed(
        &mut self,
        sender: &str,
        outcome: Outcome,
        detail: Option<String>,
    ) -> Result<ProcessedRecord> {
        let ledger = Arc::clone(&self.ledger);
        let key = sender.to_string();
        let record =
            tokio::task::spawn_blocking(move || ledger.record(&key, outcome, detail)).await??;
        if let Some(newsletter) = self.newsletters.get_mut(&normalize_sender(sender)) {
            newsletter.processed = true;
        }
        Ok(record)
    }

    /// Makes a sender eligible again. Returns whether it had been processed.
    pub fn reset(&mut self, sender: &str) -> Result<bool> {
        let was_processed = self.ledger.reset(sender)?;
        if let Some(newsletter) = self.newsletters.get_mut(&normalize_sender(sender)) {
            newsletter.processed = false;
        }
        Ok(was_processed)
    }

    /// Makes every sender eligible again. Returns how many were processed.
    pub fn reset_all(&mut self) -> Result<usize> {
        let removed = self.ledger.reset_all()?;
        for newsletter in self.newsletters.values_mut() {
            newsletter.processed = false;
        }
        info!("All {} processed senders reset", removed);
        Ok(removed)
    }
}

fn sort_by_count(list: &mut [Newsletter]) {
    list.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.sender.cmp(&b.sender)));
}
