//! Mailbox access error types.

use thiserror::Error;

/// Errors that can occur while reading a mailbox.
///
/// Only [`EmailError::is_fatal`] errors abort a scan pass. Everything else is
/// scoped to the single message it concerns and counted as a skip.
#[derive(Error, Debug)]
pub enum EmailError {
    /// The mail session is gone or refused a folder-level command.
    #[error("Mail connection failed: {0}")]
    ConnectionFailed(String),

    /// IMAP protocol error on a session-level command.
    #[error("IMAP protocol error: {0}")]
    ProtocolError(String),

    /// Folder not found.
    #[error("Mail folder '{0}' not found")]
    FolderNotFound(String),

    /// A single message could not be fetched.
    #[error("Failed to fetch message {uid}: {reason}")]
    FetchFailed { uid: u32, reason: String },

    /// Failed to parse a fetched message.
    #[error("Failed to parse email: {0}")]
    ParseError(String),

    /// Operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// IO error when reading a local mail directory.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl EmailError {
    /// Whether this error ends the whole scan rather than a single message.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EmailError::ConnectionFailed(_)
                | EmailError::ProtocolError(_)
                | EmailError::FolderNotFound(_)
                | EmailError::IoError(_)
        )
    }
}

impl EmailError {
    /// Maps a failed EXAMINE: a tagged NO means the folder is not there.
    pub fn from_examine(folder: &str, err: async_imap::error::Error) -> Self {
        match err {
            async_imap::error::Error::No(_) => EmailError::FolderNotFound(folder.to_string()),
            other => EmailError::from(other),
        }
    }
}

impl From<async_imap::error::Error> for EmailError {
    fn from(err: async_imap::error::Error) -> Self {
        match err {
            async_imap::error::Error::Io(e) => EmailError::ConnectionFailed(e.to_string()),
            async_imap::error::Error::ConnectionLost => {
                EmailError::ConnectionFailed("connection lost".to_string())
            }
            other => EmailError::ProtocolError(other.to_string()),
        }
    }
}

/// Result type for mailbox operations.
pub type Result<T> = std::result::Result<T, EmailError>;
