//! Turns fetched header bytes into [`Message`] values.

use chrono::{DateTime, Utc};
use log::debug;
use mail_parser::MessageParser;
use serde::Serialize;

use super::error::{EmailError, Result};
use super::header::{LIST_UNSUBSCRIBE, LIST_UNSUBSCRIBE_POST};

/// A fetched message, reduced to what newsletter detection needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Identifier unique within a scan pass: the Message-ID header, or
    /// `folder:uid` when the header is absent.
    pub id: String,
    /// Folder-relative UID.
    pub uid: u32,
    /// Folder the message was fetched from.
    pub folder: String,
    /// Lowercased sender address.
    pub sender: String,
    /// Sender display name, if any.
    pub display_name: Option<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// Raw `List-Unsubscribe` values, in header order.
    pub list_unsubscribe: Vec<String>,
    /// Raw `List-Unsubscribe-Post` value.
    pub list_unsubscribe_post: Option<String>,
    /// Date header.
    pub date: Option<DateTime<Utc>>,
}

impl Message {
    /// Whether the message carries any unsubscribe metadata at all.
    pub fn has_unsubscribe_header(&self) -> bool {
        !self.list_unsubscribe.is_empty()
    }

    /// All `List-Unsubscribe` values joined into one comma-separated value.
    pub fn joined_unsubscribe_header(&self) -> String {
        self.list_unsubscribe.join(", ")
    }
}

/// Parses a raw RFC 5322 message (headers alone are enough).
pub fn parse_message(raw: &[u8], folder: &str, uid: u32) -> Result<Message> {
    let message = MessageParser::default()
        .parse_headers(raw)
        .ok_or_else(|| {
            EmailError::ParseError(format!("Message {} in '{}' is not mail", uid, folder))
        })?;

    let (sender, display_name) = message
        .from()
        .and_then(|addr| addr.first())
        .map(|addr| {
            (
                addr.address().unwrap_or_default().trim().to_lowercase(),
                addr.name().map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            )
        })
        .unwrap_or_default();

    if sender.is_empty() {
        return Err(EmailError::ParseError(format!(
            "Message {} in '{}' has no sender address",
            uid, folder
        )));
    }

    let raw_bytes = message.raw_message();
    let raw_value = |name: &str| -> Vec<String> {
        message
            .headers()
            .iter()
            .filter(|h| h.name.as_str().eq_ignore_ascii_case(name))
            .filter_map(|h| raw_bytes.get(h.offset_start as usize..h.offset_end as usize))
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    };

    let list_unsubscribe = raw_value(LIST_UNSUBSCRIBE);
    let list_unsubscribe_post = raw_value(LIST_UNSUBSCRIBE_POST).into_iter().next();

    let id = message
        .message_id()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("{}:{}", folder, uid));

    let date = message
        .date()
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0));

    debug!(
        "Parsed message UID={} in '{}' from {} ({} unsubscribe header(s))",
        uid,
        folder,
        sender,
        list_unsubscribe.len()
    );

    Ok(Message {
        id,
        uid,
        folder: folder.to_string(),
        sender,
        display_name,
        subject: message.subject().map(|s| s.to_string()),
        list_unsubscribe,
        list_unsubscribe_post,
        date,
    })
}
