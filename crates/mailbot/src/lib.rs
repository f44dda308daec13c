pub mod broadcast;
pub mod cancel;
pub mod config;
pub mod email;
pub mod error;
pub mod logging;
pub mod registry;
pub mod report;
pub mod sanitize;
pub mod session;
pub mod store;
pub mod unsubscribe;

pub use broadcast::{ProgressBroadcaster, ProgressEvent, ProgressPhase};
pub use cancel::CancelFlag;
pub use config::{load_config, load_or_default, MailbotConfig, ScanLimit};
pub use email::{
    parse_list_unsubscribe, ImapMailSession, LocalMailSession, MailSession, MailboxScanner,
    Message, ScanSummary, TargetSet, UnsubscribeTarget,
};
pub use error::{ConfigError, MailbotError, Result};
pub use registry::{Newsletter, NewsletterRegistry};
pub use report::{Report, ReportEntry};
pub use session::{UnsubscribeRun, UnsubscribeSession};
pub use store::{JsonFileStore, Outcome, ProcessedLedger, SqliteStore, StoreBackend};
pub use unsubscribe::{
    AttemptReport, AttemptState, HtmlFormConfirmer, MailSender, MailtoRequest, NoPageAutomation,
    PageConfirmer, UnsubscribeExecutor,
};
