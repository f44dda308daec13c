//! Confirmation page detection and automated confirmation.
//!
//! Many `List-Unsubscribe` links land on a page that asks the user to press a
//! button. [`looks_like_confirmation_page`] recognizes such pages and a
//! [`PageConfirmer`] tries to press the button. Pages protected by a CAPTCHA
//! are left to the user.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

use crate::sanitize::redact_url;

static RE_CONFIRM_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(confirm|unsubscribe|abmelden|abbestellen|bestätigen|opt[\s-]?out|remove me)")
        .unwrap()
});

static RE_SUCCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(successfully unsubscribed|you have been unsubscribed|you've been unsubscribed|you are now unsubscribed|unsubscribe successful|have been removed from|erfolgreich abgemeldet|abmeldung erfolgreich|wurden abgemeldet)",
    )
    .unwrap()
});

static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Class or attribute markers of common CAPTCHA widgets.
const CAPTCHA_MARKERS: &[&str] = &[
    "g-recaptcha",
    "grecaptcha",
    "h-captcha",
    "hcaptcha.com",
    "cf-turnstile",
    "challenges.cloudflare.com",
];

/// What a page offers, as far as unsubscribing goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageAnalysis {
    pub forms: usize,
    pub confirm_controls: usize,
    pub success_marker: bool,
    pub captcha: bool,
}

impl PageAnalysis {
    /// A page the user would have to act on.
    pub fn needs_confirmation(&self) -> bool {
        !self.success_marker && (self.forms > 0 || self.confirm_controls > 0)
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn control_label(el: &ElementRef<'_>) -> String {
    let text: String = el.text().collect();
    let value = el.value().attr("value").unwrap_or_default();
    let aria = el.value().attr("aria-label").unwrap_or_default();
    format!("{} {} {}", text.trim(), value, aria)
}

/// Visible text of a page with whitespace collapsed.
pub fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
    RE_WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

pub fn has_success_marker(text: &str) -> bool {
    RE_SUCCESS.is_match(text)
}

pub fn has_captcha(html: &str) -> bool {
    let lower = html.to_lowercase();
    CAPTCHA_MARKERS.iter().any(|m| lower.contains(m))
}

pub fn analyze_page(html: &str) -> PageAnalysis {
    let document = Html::parse_document(html);

    let forms = selector("form")
        .map(|s| document.select(&s).count())
        .unwrap_or(0);
    let confirm_controls = selector("button, input[type=submit], input[type=button]")
        .map(|s| {
            document
                .select(&s)
                .filter(|el| RE_CONFIRM_LABEL.is_match(&control_label(el)))
                .count()
        })
        .unwrap_or(0);

    let text: String = document.root_element().text().collect::<Vec<_>>().join(" ");

    PageAnalysis {
        forms,
        confirm_controls,
        success_marker: has_success_marker(&text),
        captcha: has_captcha(html),
    }
}

/// Whether an HTML body is a human-facing confirmation page: a form or a
/// confirm/unsubscribe-labelled control, and no explicit success message.
pub fn looks_like_confirmation_page(html: &str) -> bool {
    analyze_page(html).needs_confirmation()
}

/// Result of an automated confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmReport {
    pub success: bool,
    pub final_url: String,
    /// Short human-readable explanation of the verdict.
    pub evidence: String,
}

impl ConfirmReport {
    fn failed(url: &str, evidence: impl Into<String>) -> Self {
        Self {
            success: false,
            final_url: url.to_string(),
            evidence: evidence.into(),
        }
    }
}

/// Capability to confirm an unsubscribe on a web page.
#[async_trait]
pub trait PageConfirmer: Send + Sync {
    /// Loads the page, activates its confirmation control and verifies the
    /// result, all within `timeout`.
    async fn try_confirm(&self, url: &str, timeout: Duration) -> ConfirmReport;
}

/// Page automation switched off: every page needs the user.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPageAutomation;

#[async_trait]
impl PageConfirmer for NoPageAutomation {
    async fn try_confirm(&self, url: &str, _timeout: Duration) -> ConfirmReport {
        ConfirmReport::failed(url, "page automation disabled")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmitMethod {
    Get,
    Post,
}

/// A form submission planned from a parsed page.
///
/// Built synchronously so no parsed document is held across an await.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FormSubmission {
    method: SubmitMethod,
    action: Url,
    fields: Vec<(String, String)>,
    control: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Plan {
    Submit(FormSubmission),
    AlreadyDone,
    Refuse(String),
}

/// Confirms pages by submitting their HTML form over plain HTTP.
///
/// Covers the common single-button pages; anything needing script execution
/// ends up as a manual confirmation.
#[derive(Clone)]
pub struct HtmlFormConfirmer {
    client: Client,
}

impl HtmlFormConfirmer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn confirm(&self, url: &str) -> ConfirmReport {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return ConfirmReport::failed(url, format!("page load failed: {}", e)),
        };
        if !response.status().is_success() {
            return ConfirmReport::failed(url, format!("page load returned {}", response.status()));
        }
        let page_url = response.url().clone();
        let html = match response.text().await {
            Ok(t) => t,
            Err(e) => return ConfirmReport::failed(url, format!("page read failed: {}", e)),
        };

        let submission = match plan_submission(&html, &page_url) {
            Plan::Submit(s) => s,
            Plan::AlreadyDone => {
                return ConfirmReport {
                    success: true,
                    final_url: page_url.to_string(),
                    evidence: "page already reports success".to_string(),
                }
            }
            Plan::Refuse(reason) => return ConfirmReport::failed(page_url.as_str(), reason),
        };

        debug!(
            "Submitting '{}' on {} via {:?}",
            submission.control,
            redact_url(submission.action.as_str()),
            submission.method
        );

        let request = match submission.method {
            SubmitMethod::Get => self
                .client
                .get(submission.action.clone())
                .query(&submission.fields),
            SubmitMethod::Post => self
                .client
                .post(submission.action.clone())
                .form(&submission.fields),
        };
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return ConfirmReport::failed(page_url.as_str(), format!("submit failed: {}", e)),
        };
        let status = response.status();
        let final_url = response.url().clone();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return ConfirmReport::failed(final_url.as_str(), format!("submit returned {}", status));
        }

        let report = verify(&html, &body, &page_url, &submission.action, &final_url);
        info!(
            "Confirmation on {}: {} ({})",
            redact_url(page_url.as_str()),
            if report.success { "confirmed" } else { "not confirmed" },
            report.evidence
        );
        report
    }
}

#[async_trait]
impl PageConfirmer for HtmlFormConfirmer {
    async fn try_confirm(&self, url: &str, timeout: Duration) -> ConfirmReport {
        match tokio::time::timeout(timeout, self.confirm(url)).await {
            Ok(report) => report,
            Err(_) => ConfirmReport::failed(url, format!("timed out after {:?}", timeout)),
        }
    }
}

/// Picks the control to activate and the form it submits.
///
/// Priority: a confirm/unsubscribe-labelled button, then a generic submit
/// button, then nothing.
fn plan_submission(html: &str, page_url: &Url) -> Plan {
    if has_captcha(html) {
        return Plan::Refuse("page is protected by a CAPTCHA".to_string());
    }

    let document = Html::parse_document(html);
    let page_text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
    if has_success_marker(&page_text) {
        return Plan::AlreadyDone;
    }

    let (Some(controls), Some(form_sel)) = (
        selector("button, input[type=submit], input[type=button], input[type=image]"),
        selector("form"),
    ) else {
        return Plan::Refuse("selector setup failed".to_string());
    };

    let candidates: Vec<ElementRef<'_>> = document.select(&controls).collect();
    let labelled = candidates
        .iter()
        .find(|el| RE_CONFIRM_LABEL.is_match(&control_label(el)));
    let generic = candidates.iter().find(|el| is_submit_control(el));

    let Some(control) = labelled.or(generic) else {
        return Plan::Refuse("no confirmation control found".to_string());
    };

    let form = control
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "form")
        .or_else(|| document.select(&form_sel).next());
    let Some(form) = form else {
        return Plan::Refuse("confirmation control is not part of a form".to_string());
    };
    if asks_for_password(&form) {
        return Plan::Refuse("form asks for a password".to_string());
    }

    let action = match form.value().attr("action").map(str::trim) {
        Some(a) if !a.is_empty() => match page_url.join(a) {
            Ok(u) => u,
            Err(e) => return Plan::Refuse(format!("invalid form action: {}", e)),
        },
        _ => page_url.clone(),
    };
    if !matches!(action.scheme(), "http" | "https") {
        return Plan::Refuse(format!("form action scheme '{}' not supported", action.scheme()));
    }

    let method = match form.value().attr("method") {
        Some(m) if m.eq_ignore_ascii_case("post") => SubmitMethod::Post,
        _ => SubmitMethod::Get,
    };

    let mut fields = form_fields(&form);
    if let Some(name) = control.value().attr("name").filter(|n| !n.is_empty()) {
        let value = control.value().attr("value").unwrap_or_default();
        fields.push((name.to_string(), value.to_string()));
    }

    Plan::Submit(FormSubmission {
        method,
        action,
        fields,
        control: control_label(control).trim().to_string(),
    })
}

fn is_submit_control(el: &ElementRef<'_>) -> bool {
    let kind = el.value().attr("type").unwrap_or_default().to_ascii_lowercase();
    match el.value().name() {
        "button" => kind.is_empty() || kind == "submit",
        "input" => kind == "submit" || kind == "image",
        _ => false,
    }
}

fn asks_for_password(form: &ElementRef<'_>) -> bool {
    selector("input[type]").is_some_and(|s| {
        form.select(&s).any(|el| {
            el.value()
                .attr("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("password"))
        })
    })
}

/// Successful controls of a form, as a browser would submit them.
fn form_fields(form: &ElementRef<'_>) -> Vec<(String, String)> {
    let Some(inputs) = selector("input[name], textarea[name], select[name]") else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    for el in form.select(&inputs) {
        let attrs = el.value();
        let name = attrs.attr("name").unwrap_or_default().to_string();
        if attrs.attr("disabled").is_some() {
            continue;
        }
        match attrs.name() {
            "input" => {
                let kind = attrs.attr("type").unwrap_or("text").to_ascii_lowercase();
                match kind.as_str() {
                    "submit" | "button" | "image" | "reset" | "file" => continue,
                    "checkbox" | "radio" if attrs.attr("checked").is_none() => continue,
                    "checkbox" | "radio" => {
                        fields.push((name, attrs.attr("value").unwrap_or("on").to_string()))
                    }
                    _ => fields.push((name, attrs.attr("value").unwrap_or_default().to_string())),
                }
            }
            "textarea" => fields.push((name, el.text().collect())),
            "select" => {
                let selected = selector("option[selected]")
                    .and_then(|s| el.select(&s).next())
                    .or_else(|| selector("option").and_then(|s| el.select(&s).next()));
                if let Some(option) = selected {
                    let value = option
                        .value()
                        .attr("value")
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| option.text().collect::<String>().trim().to_string());
                    fields.push((name, value));
                }
            }
            _ => {}
        }
    }
    fields
}

/// Decides whether a submission took effect.
///
/// A response that still asks for confirmation, or a redirect back to the
/// page the form came from, never counts as success.
fn verify(
    before_html: &str,
    after_html: &str,
    page_url: &Url,
    action: &Url,
    final_url: &Url,
) -> ConfirmReport {
    let after_text = page_text(after_html);
    let report = |success: bool, evidence: &str| ConfirmReport {
        success,
        final_url: final_url.to_string(),
        evidence: evidence.to_string(),
    };

    if has_success_marker(&after_text) {
        return report(true, "success message shown");
    }
    if has_captcha(after_html) {
        return report(false, "CAPTCHA shown after submit");
    }
    if looks_like_confirmation_page(after_html) {
        return report(false, "still asking for confirmation after submit");
    }
    if !same_page(final_url, action) {
        if same_page(final_url, page_url) {
            return report(false, "sent back to the confirmation page");
        }
        return report(true, "redirected after submit");
    }
    if after_text != page_text(before_html) {
        return report(true, "page changed after submit");
    }
    report(false, "page unchanged after submit")
}

fn same_page(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
        && a.path() == b.path()
}
