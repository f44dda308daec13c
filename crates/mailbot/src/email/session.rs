//! The authenticated mailbox capability consumed by the scanner.

use async_trait::async_trait;

use super::error::Result;

/// Header bytes of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub uid: u32,
    pub bytes: Vec<u8>,
}

/// Per-message result of a batch fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    Fetched(RawMessage),
    Failed { uid: u32, reason: String },
}

impl FetchItem {
    pub fn uid(&self) -> u32 {
        match self {
            FetchItem::Fetched(raw) => raw.uid,
            FetchItem::Failed { uid, .. } => *uid,
        }
    }
}

/// An already-authenticated mail session.
///
/// The core never opens, authenticates or closes the session; callers hand in
/// a live one. Errors returned from these methods are session-level: they end
/// the scan. Failures of individual messages belong in [`FetchItem::Failed`].
#[async_trait]
pub trait MailSession: Send {
    /// Names of all selectable folders.
    async fn list_folders(&mut self) -> Result<Vec<String>>;

    /// All message UIDs of a folder, in any order. Higher UIDs are newer.
    async fn message_uids(&mut self, folder: &str) -> Result<Vec<u32>>;

    /// Fetches the header block of the given messages without marking them read.
    async fn fetch_headers(&mut self, folder: &str, uids: &[u32]) -> Result<Vec<FetchItem>>;
}

/// Well-known spam folder names across providers.
const SPAM_FOLDER_NAMES: &[&str] = &["junk", "spam", "junk e-mail", "junk email", "bulk mail"];

/// Picks the spam folder out of a folder listing.
///
/// Matches case-insensitively on the full name and on the last hierarchy
/// segment, so `[Gmail]/Spam` and `INBOX.Junk` are found too.
pub fn find_spam_folder(folders: &[String]) -> Option<String> {
    let is_spam = |name: &str| {
        let lower = name.to_lowercase();
        let last = lower
            .rsplit(['/', '.'])
            .next()
            .unwrap_or(lower.as_str())
            .to_string();
        SPAM_FOLDER_NAMES.contains(&lower.as_str()) || SPAM_FOLDER_NAMES.contains(&last.as_str())
    };

    folders.iter().find(|f| is_spam(f)).cloned()
}
