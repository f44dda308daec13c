//! Mailbox access and newsletter detection.
//!
//! This module provides:
//! - The [`MailSession`] capability with IMAP and local-directory implementations
//! - `List-Unsubscribe` header parsing into [`UnsubscribeTarget`]s
//! - A batched, newest-first [`MailboxScanner`]

pub mod client;
pub mod error;
pub mod header;
pub mod local;
pub mod parser;
pub mod scanner;
pub mod session;

pub use client::ImapMailSession;
pub use error::{EmailError, Result};
pub use header::{
    is_one_click, parse_list_unsubscribe, HeaderError, ParsedUnsubscribe, TargetSet,
    UnsubscribeTarget,
};
pub use local::LocalMailSession;
pub use parser::{parse_message, Message};
pub use scanner::{FolderCursor, FolderStats, MailboxScanner, ScanItem, ScanSettings, ScanSummary};
pub use session::{find_spam_folder, FetchItem, MailSession, RawMessage};
