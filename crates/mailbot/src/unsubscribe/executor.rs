//! Executes unsubscribe targets.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Serialize;

use crate::email::header::ONE_CLICK_VALUE;
use crate::email::{TargetSet, UnsubscribeTarget};
use crate::sanitize::redact_url;

use super::error::{ExecutionError, Result};
use super::mailto::{MailSender, MailtoRequest};
use super::page::{looks_like_confirmation_page, PageConfirmer};
use super::state::AttemptState;

/// Browser-like user agent; some list providers reject unknown clients.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Timeouts and identity for outgoing requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub request_timeout: Duration,
    pub page_timeout: Duration,
    pub user_agent: String,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            page_timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Terminal result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptReport {
    pub sender: String,
    pub state: AttemptState,
    /// The target that produced the final state.
    pub target: UnsubscribeTarget,
    pub used_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl AttemptReport {
    /// Detail persisted alongside the outcome: manual link or failure reason.
    pub fn detail(&self) -> Option<String> {
        self.manual_link.clone().or_else(|| self.error_reason.clone())
    }
}

/// How a single target resolved.
#[derive(Debug)]
enum Resolution {
    Done { evidence: String },
    Manual { link: String, evidence: String },
}

/// Runs unsubscribe targets.
///
/// One [`reqwest::Client`] is shared by all attempts. Page automation and
/// mail sending are injected; without a mail sender, mailto targets fail.
pub struct UnsubscribeExecutor {
    client: Client,
    settings: ExecutorSettings,
    page: Arc<dyn PageConfirmer>,
    mail: Option<Arc<dyn MailSender>>,
}

impl UnsubscribeExecutor {
    pub fn new(settings: ExecutorSettings, page: Arc<dyn PageConfirmer>) -> Result<Self> {
        let client = build_client(&settings)?;
        Ok(Self {
            client,
            settings,
            page,
            mail: None,
        })
    }

    pub fn with_mail_sender(mut self, sender: Arc<dyn MailSender>) -> Self {
        self.mail = Some(sender);
        self
    }

    /// Runs one attempt for `sender`: the primary target, then the fallback
    /// if the primary GET could not be reached at all.
    ///
    /// Never retries and always ends in exactly one terminal state.
    pub async fn execute(&self, sender: &str, targets: &TargetSet) -> Result<AttemptReport> {
        let state = AttemptState::Pending.transition(AttemptState::Attempting)?;
        info!("Unsubscribing {} via {}", sender, describe(&targets.primary));

        let mut target = targets.primary.clone();
        let mut used_fallback = false;
        let mut result = self.run_target(&target).await;

        let get_unreachable = matches!(targets.primary, UnsubscribeTarget::HttpGet { .. })
            && matches!(&result, Err(e) if e.is_unreachable());
        if let (true, Some(fallback)) = (get_unreachable, &targets.fallback) {
            if let Err(e) = &result {
                warn!(
                    "{} unreachable for {} ({}), trying {}",
                    describe(&targets.primary),
                    sender,
                    e,
                    describe(fallback)
                );
            }
            target = fallback.clone();
            used_fallback = true;
            result = self.run_target(&target).await;
        }

        let mut report = AttemptReport {
            sender: sender.to_string(),
            state,
            target,
            used_fallback,
            manual_link: None,
            error_reason: None,
            evidence: None,
        };

        report.state = match result {
            Ok(Resolution::Done { evidence }) => {
                report.evidence = Some(evidence);
                state.transition(AttemptState::Succeeded)?
            }
            Ok(Resolution::Manual { link, evidence }) => {
                report.manual_link = Some(link);
                report.evidence = Some(evidence);
                state.transition(AttemptState::RequiresManualConfirmation)?
            }
            Err(e) => {
                report.error_reason = Some(e.to_string());
                state.transition(AttemptState::Failed)?
            }
        };

        info!("Unsubscribe of {} ended as {}", sender, report.state);
        Ok(report)
    }

    async fn run_target(&self, target: &UnsubscribeTarget) -> Result<Resolution> {
        match target {
            UnsubscribeTarget::HttpGet { url } => self.http_get(url).await,
            UnsubscribeTarget::HttpPost { url } => self.one_click_post(url).await,
            UnsubscribeTarget::PageConfirm { url } => Ok(self.confirm_page(url).await),
            UnsubscribeTarget::MailTo { .. } => self.send_mail(target).await,
        }
    }

    async fn http_get(&self, url: &str) -> Result<Resolution> {
        let response = self.send(self.client.get(url)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExecutionError::Status(status.as_u16()));
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains("html"))
            .unwrap_or(false);
        let body = response.text().await.unwrap_or_default();

        if (is_html || body.trim_start().starts_with('<')) && looks_like_confirmation_page(&body) {
            debug!("{} is a confirmation page", redact_url(url));
            return Ok(self.confirm_page(url).await);
        }

        Ok(Resolution::Done {
            evidence: format!("GET answered {}", status.as_u16()),
        })
    }

    async fn one_click_post(&self, url: &str) -> Result<Resolution> {
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(ONE_CLICK_VALUE);
        let response = self.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExecutionError::Status(status.as_u16()));
        }
        Ok(Resolution::Done {
            evidence: format!("one-click POST answered {}", status.as_u16()),
        })
    }

    async fn confirm_page(&self, url: &str) -> Resolution {
        let report = self.page.try_confirm(url, self.settings.page_timeout).await;
        if report.success {
            Resolution::Done {
                evidence: report.evidence,
            }
        } else {
            Resolution::Manual {
                link: url.to_string(),
                evidence: report.evidence,
            }
        }
    }

    async fn send_mail(&self, target: &UnsubscribeTarget) -> Result<Resolution> {
        let Some(sender) = &self.mail else {
            return Err(ExecutionError::NoMailSender);
        };
        let Some(request) = MailtoRequest::from_target(target) else {
            return Err(ExecutionError::MailSend(format!("{} is not a mail target", target)));
        };
        sender.send(&request).await?;
        Ok(Resolution::Done {
            evidence: format!("mail sent to {}", request.to),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let timeout = self.settings.request_timeout;
        match tokio::time::timeout(timeout, request.send()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ExecutionError::Timeout(timeout)),
        }
    }
}

/// Builds the shared HTTP client.
pub fn build_client(settings: &ExecutorSettings) -> Result<Client> {
    Client::builder()
        .timeout(settings.request_timeout)
        .user_agent(settings.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| ExecutionError::ClientSetup(e.to_string()))
}

fn describe(target: &UnsubscribeTarget) -> String {
    match target {
        UnsubscribeTarget::MailTo { address, .. } => format!("MAILTO {}", address),
        other => match other.url() {
            Some(url) => format!("{} {}", method_label(other), redact_url(url)),
            None => other.to_string(),
        },
    }
}

fn method_label(target: &UnsubscribeTarget) -> &'static str {
    match target {
        UnsubscribeTarget::HttpGet { .. } => "GET",
        UnsubscribeTarget::HttpPost { .. } => "POST",
        UnsubscribeTarget::PageConfirm { .. } => "PAGE",
        UnsubscribeTarget::MailTo { .. } => "MAILTO",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::unsubscribe::page::{ConfirmReport, NoPageAutomation};

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<MailtoRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl MailSender for RecordingSender {
        async fn send(&self, request: &MailtoRequest) -> Result<()> {
            if self.fail {
                return Err(ExecutionError::MailSend("relay refused".into()));
            }
            self.sent.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    struct AlwaysConfirms;

    #[async_trait]
    impl PageConfirmer for AlwaysConfirms {
        async fn try_confirm(&self, url: &str, _timeout: Duration) -> ConfirmReport {
            ConfirmReport {
                success: true,
                final_url: url.to_string(),
                evidence: "clicked".to_string(),
            }
        }
    }

    fn executor(page: Arc<dyn PageConfirmer>) -> UnsubscribeExecutor {
        UnsubscribeExecutor::new(ExecutorSettings::default(), page).unwrap()
    }

    fn only(target: UnsubscribeTarget) -> TargetSet {
        TargetSet {
            primary: target,
            fallback: None,
        }
    }

    #[tokio::test]
    async fn test_page_confirm_without_automation_needs_user() {
        let exec = executor(Arc::new(NoPageAutomation));
        let url = "https://x.example/confirm?id=1";
        let report = exec
            .execute(
                "a@x.example",
                &only(UnsubscribeTarget::PageConfirm {
                    url: url.to_string(),
                }),
            )
            .await
            .unwrap();

        assert_eq!(report.state, AttemptState::RequiresManualConfirmation);
        assert_eq!(report.manual_link.as_deref(), Some(url));
        assert_eq!(report.detail().as_deref(), Some(url));
        assert!(report.error_reason.is_none());
    }

    #[tokio::test]
    async fn test_page_confirm_with_automation_succeeds() {
        let exec = executor(Arc::new(AlwaysConfirms));
        let report = exec
            .execute(
                "a@x.example",
                &only(UnsubscribeTarget::PageConfirm {
                    url: "https://x.example/p".to_string(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(report.state, AttemptState::Succeeded);
        assert!(report.manual_link.is_none());
    }

    #[tokio::test]
    async fn test_mailto_without_sender_fails() {
        let exec = executor(Arc::new(NoPageAutomation));
        let report = exec
            .execute("a@x.example", &only(UnsubscribeTarget::mail_to("off@x.example")))
            .await
            .unwrap();
        assert_eq!(report.state, AttemptState::Failed);
        assert_eq!(report.error_reason.as_deref(), Some("no mail sender configured"));
    }

    #[tokio::test]
    async fn test_mailto_with_sender() {
        let sender = Arc::new(RecordingSender::default());
        let exec = executor(Arc::new(NoPageAutomation)).with_mail_sender(sender.clone());
        let report = exec
            .execute("a@x.example", &only(UnsubscribeTarget::mail_to("off@x.example")))
            .await
            .unwrap();

        assert_eq!(report.state, AttemptState::Succeeded);
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "off@x.example");
        assert_eq!(sent[0].subject, "unsubscribe");
    }

    #[tokio::test]
    async fn test_mail_send_failure_is_failed() {
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..Default::default()
        });
        let exec = executor(Arc::new(NoPageAutomation)).with_mail_sender(sender);
        let report = exec
            .execute("a@x.example", &only(UnsubscribeTarget::mail_to("off@x.example")))
            .await
            .unwrap();
        assert_eq!(report.state, AttemptState::Failed);
        assert!(report.error_reason.unwrap().contains("relay refused"));
    }

    #[test]
    fn test_describe_redacts_tokens() {
        let target = UnsubscribeTarget::HttpPost {
            url: "https://x.example/u?token=secret".to_string(),
        };
        let text = describe(&target);
        assert!(text.starts_with("POST "));
        assert!(!text.contains("secret"));
    }
}
