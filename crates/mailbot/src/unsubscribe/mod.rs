//! Unsubscribe execution.
//!
//! This module provides:
//! - The per-attempt [`AttemptState`] machine
//! - [`UnsubscribeExecutor`] for HTTP GET, RFC 8058 one-click POST, mailto
//!   and confirmation page targets
//! - Confirmation page detection and the [`PageConfirmer`] capability

pub mod error;
pub mod executor;
pub mod mailto;
pub mod page;
pub mod state;

pub use error::{ExecutionError, Result};
pub use executor::{
    build_client, AttemptReport, ExecutorSettings, UnsubscribeExecutor, DEFAULT_USER_AGENT,
};
pub use mailto::{MailSender, MailtoRequest};
pub use page::{
    analyze_page, looks_like_confirmation_page, ConfirmReport, HtmlFormConfirmer,
    NoPageAutomation, PageAnalysis, PageConfirmer,
};
pub use state::AttemptState;
