//! `List-Unsubscribe` header parsing (RFC 2369 / RFC 8058).
//!
//! A header value carries one or more angle-bracket delimited URIs separated
//! by commas. HTTP(S) URIs are preferred over `mailto:` URIs because they can
//! be acted on without a mail round-trip. When the companion
//! `List-Unsubscribe-Post: List-Unsubscribe=One-Click` header is present the
//! HTTP candidates become one-click POST targets.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Name of the header carrying unsubscribe URIs.
pub const LIST_UNSUBSCRIBE: &str = "List-Unsubscribe";

/// Name of the one-click companion header.
pub const LIST_UNSUBSCRIBE_POST: &str = "List-Unsubscribe-Post";

/// Value of the one-click companion header, and the POST body sent for it.
pub const ONE_CLICK_VALUE: &str = "List-Unsubscribe=One-Click";

/// A normalized unsubscribe action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnsubscribeTarget {
    /// Plain link; visiting it may land on a confirmation page.
    HttpGet { url: String },
    /// RFC 8058 one-click endpoint.
    HttpPost { url: String },
    /// Unsubscribe by sending a message.
    MailTo {
        address: String,
        subject: Option<String>,
        body: Option<String>,
    },
    /// Human-facing confirmation page discovered while executing a GET.
    PageConfirm { url: String },
}

impl UnsubscribeTarget {
    /// Shorthand for a mailto target without subject or body.
    pub fn mail_to(address: impl Into<String>) -> Self {
        UnsubscribeTarget::MailTo {
            address: address.into(),
            subject: None,
            body: None,
        }
    }

    /// Whether the action goes over HTTP.
    pub fn is_http(&self) -> bool {
        !matches!(self, UnsubscribeTarget::MailTo { .. })
    }

    /// The URL for HTTP targets.
    pub fn url(&self) -> Option<&str> {
        match self {
            UnsubscribeTarget::HttpGet { url }
            | UnsubscribeTarget::HttpPost { url }
            | UnsubscribeTarget::PageConfirm { url } => Some(url),
            UnsubscribeTarget::MailTo { .. } => None,
        }
    }

    /// A link the user can follow by hand to finish the job.
    pub fn manual_link(&self) -> String {
        match self {
            UnsubscribeTarget::MailTo {
                address, subject, ..
            } => match subject {
                Some(subject) => {
                    format!("mailto:{}?subject={}", address, urlencoding::encode(subject))
                }
                None => format!("mailto:{}", address),
            },
            other => other.url().unwrap_or_default().to_string(),
        }
    }
}

impl fmt::Display for UnsubscribeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsubscribeTarget::HttpGet { url } => write!(f, "GET {}", url),
            UnsubscribeTarget::HttpPost { url } => write!(f, "POST {}", url),
            UnsubscribeTarget::MailTo { address, .. } => write!(f, "MAILTO {}", address),
            UnsubscribeTarget::PageConfirm { url } => write!(f, "PAGE {}", url),
        }
    }
}

/// Primary target plus an optional fallback of the other family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSet {
    pub primary: UnsubscribeTarget,
    pub fallback: Option<UnsubscribeTarget>,
}

impl TargetSet {
    /// Builds a target set from preference-ordered candidates.
    ///
    /// Returns `None` when there are no candidates.
    pub fn from_candidates(candidates: Vec<UnsubscribeTarget>) -> Option<Self> {
        let mut iter = candidates.into_iter();
        let primary = iter.next()?;
        let fallback = iter.find(|c| c.is_http() != primary.is_http());
        Some(Self { primary, fallback })
    }
}

/// Why a header entry was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("entry '{0}' is not enclosed in angle brackets")]
    MissingBrackets(String),

    #[error("unsupported URI scheme in '{0}'")]
    UnsupportedScheme(String),

    #[error("invalid URI '{entry}': {reason}")]
    InvalidUri { entry: String, reason: String },

    #[error("mailto URI '{0}' has no usable address")]
    EmptyAddress(String),
}

/// Outcome of parsing one or more `List-Unsubscribe` header values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUnsubscribe {
    /// Valid targets, HTTP before mail, header order otherwise.
    pub targets: Vec<UnsubscribeTarget>,
    /// Entries that were skipped.
    pub rejected: Vec<HeaderError>,
}

/// Parses a raw `List-Unsubscribe` value.
///
/// `one_click` is the result of [`is_one_click`] on the companion header.
pub fn parse_list_unsubscribe(raw: &str, one_click: bool) -> ParsedUnsubscribe {
    let unfolded = unfold(raw);
    let mut http = Vec::new();
    let mut mail = Vec::new();
    let mut rejected = Vec::new();

    for entry in split_entries(&unfolded) {
        match parse_entry(entry, one_click) {
            Ok(target) if target.is_http() => http.push(target),
            Ok(target) => mail.push(target),
            Err(e) => {
                debug!("Skipping unsubscribe entry: {}", e);
                rejected.push(e);
            }
        }
    }

    http.extend(mail);
    ParsedUnsubscribe {
        targets: http,
        rejected,
    }
}

/// Checks whether a `List-Unsubscribe-Post` value announces one-click support.
pub fn is_one_click(post_header: Option<&str>) -> bool {
    post_header
        .map(|v| unfold(v).trim().eq_ignore_ascii_case(ONE_CLICK_VALUE))
        .unwrap_or(false)
}

/// Removes header folding (CRLF followed by whitespace).
fn unfold(raw: &str) -> String {
    raw.replace("\r\n", "").replace('\n', "").replace('\r', "")
}

/// Splits on commas that are outside angle brackets, dropping empty pieces.
fn split_entries(value: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (idx, ch) in value.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                entries.push(&value[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    entries.push(&value[start..]);

    entries
        .into_iter()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect()
}

fn parse_entry(entry: &str, one_click: bool) -> Result<UnsubscribeTarget, HeaderError> {
    let inner = entry
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .ok_or_else(|| HeaderError::MissingBrackets(entry.to_string()))?;

    // Whitespace inside the brackets is not significant (RFC 2369, section 2).
    let uri: String = inner.chars().filter(|c| !c.is_whitespace()).collect();

    let parsed = Url::parse(&uri).map_err(|e| HeaderError::InvalidUri {
        entry: entry.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => {
            if parsed.host_str().map(str::is_empty).unwrap_or(true) {
                return Err(HeaderError::InvalidUri {
                    entry: entry.to_string(),
                    reason: "missing host".to_string(),
                });
            }
            Ok(if one_click {
                UnsubscribeTarget::HttpPost { url: uri }
            } else {
                UnsubscribeTarget::HttpGet { url: uri }
            })
        }
        "mailto" => parse_mailto(&parsed, entry),
        _ => Err(HeaderError::UnsupportedScheme(entry.to_string())),
    }
}

fn parse_mailto(url: &Url, entry: &str) -> Result<UnsubscribeTarget, HeaderError> {
    let path = url.path();
    let first = path.split(',').next().unwrap_or_default();
    let address = urlencoding::decode(first)
        .map(|a| a.trim().to_string())
        .unwrap_or_else(|_| first.trim().to_string());

    if address.is_empty() || !address.contains('@') {
        return Err(HeaderError::EmptyAddress(entry.to_string()));
    }

    let mut subject = None;
    let mut body = None;
    for (key, value) in url.query_pairs() {
        if key.eq_ignore_ascii_case("subject") {
            subject = Some(value.into_owned());
        } else if key.eq_ignore_ascii_case("body") {
            body = Some(value.into_owned());
        }
    }

    Ok(UnsubscribeTarget::MailTo {
        address,
        subject,
        body,
    })
}
