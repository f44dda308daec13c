//! Unsubscribe execution error types.

use std::time::Duration;

use thiserror::Error;

use super::state::AttemptState;

/// Why an unsubscribe attempt did not succeed.
///
/// The `Display` output is what ends up as the failure reason in reports, so
/// HTTP status failures render as the bare code (e.g. `503`).
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The server answered with a non-2xx status.
    #[error("{0}")]
    Status(u16),

    /// The request could not be sent or the response not read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The request did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A mailto target with nobody to send it.
    #[error("no mail sender configured")]
    NoMailSender,

    /// The mail sender reported an error.
    #[error("sending unsubscribe mail failed: {0}")]
    MailSend(String),

    /// The HTTP client could not be built.
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),

    /// A state change that would break the attempt lifecycle.
    #[error("invalid attempt transition {from} -> {to}")]
    InvalidTransition { from: AttemptState, to: AttemptState },
}

impl ExecutionError {
    /// Whether the target could not be reached at all, as opposed to
    /// answering with an error.
    pub fn is_unreachable(&self) -> bool {
        match self {
            ExecutionError::Request(e) => e.is_connect() || e.is_timeout(),
            ExecutionError::Timeout(_) => true,
            _ => false,
        }
    }
}

/// Result type for unsubscribe execution.
pub type Result<T> = std::result::Result<T, ExecutionError>;
