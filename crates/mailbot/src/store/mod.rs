//! Durable "already processed" state.
//!
//! The [`ProcessedLedger`] owns the in-memory [`ProcessedStore`] and a
//! [`StoreBackend`] that persists it. Every mutation is a locked
//! read-modify-write that is flushed before the lock is released, so a crash
//! never loses more than the attempt that was in flight.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod json;
mod migrations;
pub mod sqlite;

pub use error::{Result, StoreError};
pub use json::JsonFileStore;
pub use sqlite::SqliteStore;

use crate::registry::normalize_sender;

/// Final result of an unsubscribe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    RequiresManualConfirmation,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::RequiresManualConfirmation => "requires_manual_confirmation",
            Outcome::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(Outcome::Succeeded),
            "requires_manual_confirmation" => Ok(Outcome::RequiresManualConfirmation),
            "failed" => Ok(Outcome::Failed),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

/// What is remembered about a processed sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRecord {
    pub outcome: Outcome,
    /// Manual link or failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub processed_at: DateTime<Utc>,
    /// Number of attempts made for this sender, including this one.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

/// Mapping from sender address to its processed record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedStore {
    #[serde(default)]
    senders: BTreeMap<String, ProcessedRecord>,
}

impl ProcessedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sender: &str) -> Option<&ProcessedRecord> {
        self.senders.get(&normalize_sender(sender))
    }

    pub fn contains(&self, sender: &str) -> bool {
        self.senders.contains_key(&normalize_sender(sender))
    }

    /// Inserts or replaces a record, returning the previous one.
    pub fn insert(&mut self, sender: &str, record: ProcessedRecord) -> Option<ProcessedRecord> {
        self.senders.insert(normalize_sender(sender), record)
    }

    pub fn remove(&mut self, sender: &str) -> Option<ProcessedRecord> {
        self.senders.remove(&normalize_sender(sender))
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Records in sender order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProcessedRecord)> {
        self.senders.iter()
    }
}

/// Durable key-value persistence for [`ProcessedStore`].
pub trait StoreBackend: Send + Sync {
    /// Reads the full store. A missing store is an empty one.
    fn load(&self) -> Result<ProcessedStore>;

    /// Replaces the persisted store with `store`.
    fn save(&self, store: &ProcessedStore) -> Result<()>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Processed state shared between the registry and its callers.
pub struct ProcessedLedger {
    backend: Box<dyn StoreBackend>,
    state: Mutex<ProcessedStore>,
}

impl ProcessedLedger {
    /// Loads the store from `backend`.
    pub fn open(backend: Box<dyn StoreBackend>) -> Result<Self> {
        let store = backend.load()?;
        info!(
            "Loaded {} processed senders from {}",
            store.len(),
            backend.describe()
        );
        Ok(Self {
            backend,
            state: Mutex::new(store),
        })
    }

    /// Records the outcome of an attempt and flushes it.
    ///
    /// The in-memory store only changes once the backend accepted the write.
    pub fn record(
        &self,
        sender: &str,
        outcome: Outcome,
        detail: Option<String>,
    ) -> Result<ProcessedRecord> {
        let mut guard = self.lock()?;
        let attempts = guard.get(sender).map(|r| r.attempts + 1).unwrap_or(1);
        let record = ProcessedRecord {
            outcome,
            detail,
            processed_at: Utc::now(),
            attempts,
        };

        let mut next = guard.clone();
        next.insert(sender, record.clone());
        self.backend.save(&next)?;
        *guard = next;

        debug!("Recorded {} for {} (attempt {})", outcome, sender, attempts);
        Ok(record)
    }

    /// Forgets a sender so it is offered again. Returns whether it was known.
    pub fn reset(&self, sender: &str) -> Result<bool> {
        let mut guard = self.lock()?;
        if !guard.contains(sender) {
            return Ok(false);
        }

        let mut next = guard.clone();
        next.remove(sender);
        self.backend.save(&next)?;
        *guard = next;

        info!("Reset processed state for {}", sender);
        Ok(true)
    }

    /// Forgets every sender. Returns how many were removed.
    pub fn reset_all(&self) -> Result<usize> {
        let mut guard = self.lock()?;
        let removed = guard.len();
        let next = ProcessedStore::new();
        self.backend.save(&next)?;
        *guard = next;

        info!("Reset processed state for {} senders", removed);
        Ok(removed)
    }

    pub fn get(&self, sender: &str) -> Option<ProcessedRecord> {
        self.read().get(sender).cloned()
    }

    pub fn is_processed(&self, sender: &str) -> bool {
        self.read().contains(sender)
    }

    /// Copy of the current store.
    pub fn snapshot(&self) -> ProcessedStore {
        self.read().clone()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ProcessedStore>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // Reads tolerate a poisoned lock: writers only swap in fully flushed state.
    fn read(&self) -> MutexGuard<'_, ProcessedStore> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
