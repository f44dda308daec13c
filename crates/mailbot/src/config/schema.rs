use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::email::ScanSettings;
use crate::unsubscribe::{ExecutorSettings, DEFAULT_USER_AGENT};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailbotConfig {
    #[serde(default = "default_folders")]
    pub folders: Vec<String>,
    #[serde(default = "default_true")]
    pub include_spam: bool,
    #[serde(default)]
    pub limit: ScanLimit,
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub page_automation: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_folders() -> Vec<String> {
    vec!["INBOX".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_fetch_batch_size() -> usize {
    50
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_page_timeout_secs() -> u64 {
    20
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for MailbotConfig {
    fn default() -> Self {
        Self {
            folders: default_folders(),
            include_spam: true,
            limit: ScanLimit::default(),
            fetch_batch_size: default_fetch_batch_size(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            page_timeout_secs: default_page_timeout_secs(),
            page_automation: true,
            user_agent: default_user_agent(),
            store: StoreConfig::default(),
        }
    }
}

impl MailbotConfig {
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            limit: self.limit,
            batch_size: self.fetch_batch_size,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            page_timeout: Duration::from_secs(self.page_timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// How many messages per folder a scan looks at.
///
/// Serialized as a number or the string `"all"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanLimit {
    Bounded(u32),
    All,
}

impl Default for ScanLimit {
    fn default() -> Self {
        ScanLimit::Bounded(200)
    }
}

impl fmt::Display for ScanLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanLimit::Bounded(n) => write!(f, "{}", n),
            ScanLimit::All => write!(f, "all"),
        }
    }
}

impl std::str::FromStr for ScanLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(ScanLimit::All);
        }
        s.parse::<u32>()
            .map(ScanLimit::Bounded)
            .map_err(|_| format!("expected a number or \"all\", got '{}'", s))
    }
}

impl Serialize for ScanLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScanLimit::Bounded(n) => serializer.serialize_u32(*n),
            ScanLimit::All => serializer.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for ScanLimit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u32),
            Word(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(ScanLimit::Bounded(n)),
            Raw::Word(word) => word.parse().map_err(D::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    /// Defaults to `~/.mailbot/data/mailbot.db` (sqlite) or
    /// `~/.mailbot/data/processed.json` (json).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.path {
            return Some(path.clone());
        }
        let db_path = crate::store::sqlite::default_database_path()?;
        Some(match self.kind {
            StoreKind::Sqlite => db_path,
            StoreKind::Json => db_path.with_file_name(crate::store::json::DEFAULT_FILE_NAME),
        })
    }
}
