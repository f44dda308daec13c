//! Builders for raw messages and configs.

#![allow(dead_code)]

use std::path::Path;

use mailbot::config::{StoreConfig, StoreKind};
use mailbot::{MailbotConfig, ScanLimit};

/// Builds the header block of an RFC 5322 message.
pub struct MessageBuilder {
    from: String,
    subject: String,
    message_id: Option<String>,
    unsubscribe: Vec<String>,
    one_click: bool,
}

impl MessageBuilder {
    pub fn new(from: &str) -> Self {
        Self {
            from: from.to_string(),
            subject: "Hello".to_string(),
            message_id: None,
            unsubscribe: Vec::new(),
            one_click: false,
        }
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn message_id(mut self, id: &str) -> Self {
        self.message_id = Some(id.to_string());
        self
    }

    /// Adds one `List-Unsubscribe` header with the given raw value.
    pub fn unsubscribe(mut self, raw: &str) -> Self {
        self.unsubscribe.push(raw.to_string());
        self
    }

    pub fn one_click(mut self) -> Self {
        self.one_click = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = format!("From: {}\r\nTo: me@home.example\r\nSubject: {}\r\n", self.from, self.subject);
        out.push_str("Date: Mon, 6 Jan 2025 10:00:00 +0000\r\n");
        if let Some(id) = &self.message_id {
            out.push_str(&format!("Message-ID: <{}>\r\n", id));
        }
        for value in &self.unsubscribe {
            out.push_str(&format!("List-Unsubscribe: {}\r\n", value));
        }
        if self.one_click {
            out.push_str("List-Unsubscribe-Post: List-Unsubscribe=One-Click\r\n");
        }
        out.push_str("\r\nBody\r\n");
        out.into_bytes()
    }
}

/// Builder for `MailbotConfig` instances pointing at a temp store.
pub struct ConfigBuilder {
    config: MailbotConfig,
}

impl ConfigBuilder {
    pub fn new(store_dir: &Path) -> Self {
        let config = MailbotConfig {
            request_timeout_secs: 5,
            page_timeout_secs: 5,
            store: StoreConfig {
                kind: StoreKind::Sqlite,
                path: Some(store_dir.join("mailbot.db")),
            },
            ..Default::default()
        };
        Self { config }
    }

    pub fn folders(mut self, folders: &[&str]) -> Self {
        self.config.folders = folders.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn include_spam(mut self, include: bool) -> Self {
        self.config.include_spam = include;
        self
    }

    pub fn limit(mut self, limit: ScanLimit) -> Self {
        self.config.limit = limit;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn page_automation(mut self, enabled: bool) -> Self {
        self.config.page_automation = enabled;
        self
    }

    pub fn json_store(mut self, path: &Path) -> Self {
        self.config.store = StoreConfig {
            kind: StoreKind::Json,
            path: Some(path.to_path_buf()),
        };
        self
    }

    pub fn build(self) -> MailbotConfig {
        self.config
    }
}
