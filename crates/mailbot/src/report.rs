//! Structured results for whatever renders them.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::email::ScanSummary;
use crate::registry::{normalize_sender, Newsletter};
use crate::store::{Outcome, ProcessedRecord};
use crate::unsubscribe::{AttemptReport, AttemptState};

/// One newsletter line of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub sender: String,
    pub display_name: Option<String>,
    pub count: u32,
    pub folders: Vec<String>,
    pub state: AttemptState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

/// Newsletters with their current state, plus the scan counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub entries: Vec<ReportEntry>,
    pub messages_seen: u32,
    pub newsletter_messages: u32,
    pub skipped_messages: u32,
    pub rejected_messages: u32,
    pub rejected_entries: u32,
    pub cancelled: bool,
}

impl Report {
    /// Combines the newsletters of a pass with this run's attempts and the
    /// persisted outcomes of earlier runs. An attempt from this run wins over
    /// a stored record.
    pub fn build(
        newsletters: &[Newsletter],
        attempts: &HashMap<String, AttemptReport>,
        stored: impl Fn(&str) -> Option<ProcessedRecord>,
        scan: Option<&ScanSummary>,
    ) -> Self {
        let mut entries: Vec<ReportEntry> = newsletters
            .iter()
            .map(|n| {
                let mut entry = ReportEntry {
                    sender: n.sender.clone(),
                    display_name: n.display_name.clone(),
                    count: n.count,
                    folders: n.folders.iter().cloned().collect(),
                    state: AttemptState::Pending,
                    manual_link: None,
                    error_reason: None,
                };

                if let Some(attempt) = attempts.get(&normalize_sender(&n.sender)) {
                    entry.state = attempt.state;
                    entry.manual_link = attempt.manual_link.clone();
                    entry.error_reason = attempt.error_reason.clone();
                } else if let Some(record) = stored(&n.sender) {
                    entry.state = record.outcome.into();
                    match record.outcome {
                        Outcome::RequiresManualConfirmation => entry.manual_link = record.detail,
                        Outcome::Failed => entry.error_reason = record.detail,
                        Outcome::Succeeded => {}
                    }
                }
                entry
            })
            .collect();

        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.sender.cmp(&b.sender)));

        let mut report = Report {
            entries,
            ..Default::default()
        };
        if let Some(scan) = scan {
            report.messages_seen = scan.messages_seen;
            report.newsletter_messages = scan.newsletter_messages;
            report.skipped_messages = scan.skipped;
            report.rejected_messages = scan.rejected_messages;
            report.rejected_entries = scan.rejected_entries;
            report.cancelled = scan.cancelled;
        }
        report
    }

    pub fn count_in(&self, state: AttemptState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text table, one newsletter per line.
    pub fn render_table(&self) -> String {
        let sender_width = self
            .entries
            .iter()
            .map(|e| e.sender.chars().count())
            .max()
            .unwrap_or(0)
            .max("SENDER".len());
        let state_width = "requires_manual_confirmation".len();

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<sw$}  {:>5}  {:<tw$}  {:<16}  DETAIL",
            "SENDER",
            "COUNT",
            "STATE",
            "FOLDERS",
            sw = sender_width,
            tw = state_width
        );
        for entry in &self.entries {
            let detail = entry
                .manual_link
                .as_deref()
                .or(entry.error_reason.as_deref())
                .unwrap_or("");
            let _ = writeln!(
                out,
                "{:<sw$}  {:>5}  {:<tw$}  {:<16}  {}",
                entry.sender,
                entry.count,
                entry.state.as_str(),
                entry.folders.join(","),
                detail,
                sw = sender_width,
                tw = state_width
            );
        }
        let _ = writeln!(
            out,
            "\n{} newsletters, {} messages seen, {} skipped, {} rejected{}",
            self.entries.len(),
            self.messages_seen,
            self.skipped_messages,
            self.rejected_messages,
            if self.cancelled { " (scan cancelled)" } else { "" }
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::email::{TargetSet, UnsubscribeTarget};

    fn newsletter(sender: &str, count: u32) -> Newsletter {
        Newsletter {
            sender: sender.to_string(),
            display_name: None,
            count,
            targets: TargetSet {
                primary: UnsubscribeTarget::HttpGet {
                    url: format!("https://{}/u", sender),
                },
                fallback: None,
            },
            folders: BTreeSet::from(["INBOX".to_string()]),
            latest_subject: None,
            latest_date: None,
            processed: false,
        }
    }

    fn attempt(sender: &str, state: AttemptState, reason: Option<&str>) -> AttemptReport {
        AttemptReport {
            sender: sender.to_string(),
            state,
            target: UnsubscribeTarget::mail_to("x@y.example"),
            used_fallback: false,
            manual_link: None,
            error_reason: reason.map(|r| r.to_string()),
            evidence: None,
        }
    }

    #[test]
    fn test_states_and_order() {
        let newsletters = vec![
            newsletter("b@x.example", 2),
            newsletter("a@x.example", 2),
            newsletter("c@x.example", 5),
        ];
        let mut attempts = HashMap::new();
        attempts.insert(
            "a@x.example".to_string(),
            attempt("a@x.example", AttemptState::Failed, Some("503")),
        );
        let stored = |sender: &str| {
            (sender == "c@x.example").then(|| ProcessedRecord {
                outcome: Outcome::RequiresManualConfirmation,
                detail: Some("https://c/confirm".to_string()),
                processed_at: "2026-01-01T00:00:00Z".parse().unwrap(),
                attempts: 1,
            })
        };

        let report = Report::build(&newsletters, &attempts, stored, None);
        let order: Vec<&str> = report.entries.iter().map(|e| e.sender.as_str()).collect();
        assert_eq!(order, vec!["c@x.example", "a@x.example", "b@x.example"]);

        assert_eq!(report.entries[0].state, AttemptState::RequiresManualConfirmation);
        assert_eq!(report.entries[0].manual_link.as_deref(), Some("https://c/confirm"));
        assert_eq!(report.entries[1].error_reason.as_deref(), Some("503"));
        assert_eq!(report.entries[2].state, AttemptState::Pending);
        assert_eq!(report.count_in(AttemptState::Pending), 1);
    }

    #[test]
    fn test_json_is_camel_case() {
        let report = Report::build(&[newsletter("a@x.example", 1)], &HashMap::new(), |_| None, None);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["entries"][0]["state"], "pending");
        assert!(json["entries"][0].get("displayName").is_some());
        assert!(json["entries"][0].get("manualLink").is_none());
        assert!(json.get("skippedMessages").is_some());
    }

    #[test]
    fn test_table_lists_every_entry() {
        let mut attempts = HashMap::new();
        attempts.insert(
            "a@x.example".to_string(),
            attempt("a@x.example", AttemptState::Failed, Some("503")),
        );
        let report = Report::build(&[newsletter("a@x.example", 3)], &attempts, |_| None, None);
        let table = report.render_table();
        let line = table.lines().nth(1).unwrap();
        assert!(line.starts_with("a@x.example"));
        assert!(line.contains("failed"));
        assert!(line.ends_with("503"));
    }
}
