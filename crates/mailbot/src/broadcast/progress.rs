//! Progress broadcaster for scan and unsubscribe runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::unsubscribe::AttemptState;

/// What a session is currently doing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Scanning,
    ScanCompleted,
    Unsubscribing,
    UnsubscribeCompleted,
    Cancelled,
}

impl std::fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressPhase::Scanning => write!(f, "Scanning"),
            ProgressPhase::ScanCompleted => write!(f, "Scan completed"),
            ProgressPhase::Unsubscribing => write!(f, "Unsubscribing"),
            ProgressPhase::UnsubscribeCompleted => write!(f, "Unsubscribe completed"),
            ProgressPhase::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// One progress update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    /// Items done so far (messages while scanning, senders while unsubscribing).
    pub current: u32,
    /// Total items, when known.
    pub total: u32,
    /// Percentage in 0..=100.
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<AttemptState>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(phase: ProgressPhase, current: u32, total: u32, message: &str) -> Self {
        Self {
            phase,
            current,
            total,
            percent: percent(current, total),
            folder: None,
            sender: None,
            state: None,
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Progress through one folder of a scan.
    pub fn scanning(folder: &str, current: u32, total: u32) -> Self {
        let mut event = Self::new(
            ProgressPhase::Scanning,
            current,
            total,
            &format!("Scanned {}/{} messages in {}", current, total, folder),
        );
        event.folder = Some(folder.to_string());
        event
    }

    /// Result of one unsubscribe attempt.
    pub fn attempt(sender: &str, state: AttemptState, current: u32, total: u32) -> Self {
        let mut event = Self::new(
            ProgressPhase::Unsubscribing,
            current,
            total,
            &format!("{}: {}", sender, state),
        );
        event.sender = Some(sender.to_string());
        event.state = Some(state);
        event
    }
}

fn percent(current: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    ((current.min(total) as u64 * 100) / total as u64) as u8
}

/// Broadcasts progress events to any number of listeners.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    sender: Arc<broadcast::Sender<ProgressEvent>>,
}

impl ProgressBroadcaster {
    /// Creates a broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: ProgressEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
