//! Unsubscribing by mail.

use async_trait::async_trait;
use serde::Serialize;

use crate::email::UnsubscribeTarget;

use super::error::Result;

/// Subject used when the mailto URI does not specify one.
pub const DEFAULT_SUBJECT: &str = "unsubscribe";

/// A message to send to a list's unsubscribe address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailtoRequest {
    pub to: String,
    pub subject: String,
    pub body: Option<String>,
}

impl MailtoRequest {
    /// Builds the request for a `MailTo` target; `None` for other targets.
    pub fn from_target(target: &UnsubscribeTarget) -> Option<Self> {
        match target {
            UnsubscribeTarget::MailTo {
                address,
                subject,
                body,
            } => Some(Self {
                to: address.clone(),
                subject: subject
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
                body: body.clone(),
            }),
            _ => None,
        }
    }
}

/// Outgoing mail capability, provided by whoever owns the mail transport.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, request: &MailtoRequest) -> Result<()>;
}
