//! Scan passes over an in-memory mailbox through `UnsubscribeSession`.

mod common;

use tempfile::TempDir;

use common::{ConfigBuilder, MemoryMailSession, MessageBuilder};
use mailbot::email::EmailError;
use mailbot::{MailbotError, ProgressPhase, ScanLimit, UnsubscribeSession, UnsubscribeTarget};

fn newsletter(from: &str, id: &str, url: &str) -> Vec<u8> {
    MessageBuilder::new(from)
        .message_id(id)
        .unsubscribe(&format!("<{}>", url))
        .build()
}

fn mailbox() -> MemoryMailSession {
    let mut mail = MemoryMailSession::new();
    mail.add("INBOX", newsletter("News <news@a.com>", "1@a.com", "https://a.com/u/1"));
    mail.add("INBOX", MessageBuilder::new("friend@home.example").message_id("p@home").build());
    mail.add("INBOX", newsletter("News <news@a.com>", "2@a.com", "https://a.com/u/2"));
    mail.add("Junk", newsletter("news@a.com", "3@a.com", "https://a.com/u/3"));
    mail.add("Sent", MessageBuilder::new("me@home.example").build());
    mail
}

#[tokio::test]
async fn test_scan_aggregates_inbox_and_spam() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new(dir.path()).limit(ScanLimit::All).build();
    let mut session = UnsubscribeSession::from_config(config, None).unwrap();
    let mut mail = mailbox();

    let summary = session.scan(&mut mail).await.unwrap();

    assert_eq!(summary.folder_names(), vec!["INBOX", "Junk"]);
    assert_eq!(summary.messages_seen, 4);
    assert_eq!(summary.newsletter_messages, 3);
    assert!(!summary.cancelled);

    let registry = session.registry();
    assert_eq!(registry.len(), 1);
    let news = registry.get("NEWS@a.com").unwrap();
    assert_eq!(news.count, 3);
    assert_eq!(
        news.folders.iter().cloned().collect::<Vec<_>>(),
        vec!["INBOX".to_string(), "Junk".to_string()]
    );
    assert!(matches!(news.targets.primary, UnsubscribeTarget::HttpGet { .. }));
}

#[tokio::test]
async fn test_scan_without_spam_folder() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new(dir.path())
        .limit(ScanLimit::All)
        .include_spam(false)
        .build();
    let mut session = UnsubscribeSession::from_config(config, None).unwrap();
    let mut mail = mailbox();

    session.scan(&mut mail).await.unwrap();

    assert_eq!(session.registry().get("news@a.com").unwrap().count, 2);
}

#[tokio::test]
async fn test_limit_takes_newest_messages_per_folder() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new(dir.path())
        .limit(ScanLimit::Bounded(1))
        .include_spam(false)
        .build();
    let mut session = UnsubscribeSession::from_config(config, None).unwrap();
    let mut mail = mailbox();

    let summary = session.scan(&mut mail).await.unwrap();

    assert_eq!(summary.messages_seen, 1);
    let news = session.registry().get("news@a.com").unwrap();
    assert_eq!(news.count, 1);
    assert_eq!(
        news.targets.primary,
        UnsubscribeTarget::HttpGet {
            url: "https://a.com/u/2".to_string()
        }
    );
}

#[tokio::test]
async fn test_same_message_in_two_folders_counts_once() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new(dir.path())
        .folders(&["INBOX", "Archive"])
        .include_spam(false)
        .build();
    let mut session = UnsubscribeSession::from_config(config, None).unwrap();
    let mut mail = MemoryMailSession::new();
    mail.add("INBOX", newsletter("news@a.com", "same@a.com", "https://a.com/u"));
    mail.add("Archive", newsletter("news@a.com", "same@a.com", "https://a.com/u"));

    let summary = session.scan(&mut mail).await.unwrap();

    assert_eq!(summary.messages_seen, 2);
    assert_eq!(summary.newsletter_messages, 1);
    assert_eq!(session.registry().get("news@a.com").unwrap().count, 1);
}

#[tokio::test]
async fn test_unusable_headers_are_counted_not_registered() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new(dir.path()).include_spam(false).build();
    let mut session = UnsubscribeSession::from_config(config, None).unwrap();
    let mut mail = MemoryMailSession::new();
    mail.add(
        "INBOX",
        MessageBuilder::new("odd@b.com")
            .unsubscribe("<ftp://b.com/off>, no-brackets.example")
            .build(),
    );
    mail.add(
        "INBOX",
        MessageBuilder::new("ok@c.com")
            .unsubscribe("<ftp://c.com/off>, <mailto:off@c.com?subject=stop>")
            .build(),
    );

    let summary = session.scan(&mut mail).await.unwrap();

    assert_eq!(summary.rejected_messages, 1);
    assert_eq!(summary.rejected_entries, 3);
    assert!(session.registry().get("odd@b.com").is_none());
    let ok = session.registry().get("ok@c.com").unwrap();
    assert_eq!(
        ok.targets.primary,
        UnsubscribeTarget::MailTo {
            address: "off@c.com".to_string(),
            subject: Some("stop".to_string()),
            body: None,
        }
    );
}

#[tokio::test]
async fn test_rescan_replaces_previous_pass() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new(dir.path()).include_spam(false).build();
    let mut session = UnsubscribeSession::from_config(config, None).unwrap();
    let mut mail = MemoryMailSession::new();
    mail.add("INBOX", newsletter("news@a.com", "1@a.com", "https://a.com/u"));

    session.scan(&mut mail).await.unwrap();
    session.scan(&mut mail).await.unwrap();

    assert_eq!(session.registry().get("news@a.com").unwrap().count, 1);
}

#[tokio::test]
async fn test_missing_configured_folder_aborts_scan() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new(dir.path())
        .folders(&["Newsletters"])
        .include_spam(false)
        .build();
    let mut session = UnsubscribeSession::from_config(config, None).unwrap();
    let mut mail = MemoryMailSession::new().with_folder("INBOX");

    let err = session.scan(&mut mail).await.unwrap_err();

    assert!(matches!(
        err,
        MailbotError::Email(EmailError::FolderNotFound(ref f)) if f == "Newsletters"
    ));
}

#[tokio::test]
async fn test_stalled_folder_listing_times_out() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new(dir.path()).fetch_timeout_secs(1).build();
    let mut session = UnsubscribeSession::from_config(config, None).unwrap();
    let mut mail = mailbox().hanging_list();

    let err = tokio::time::timeout(std::time::Duration::from_secs(10), session.scan(&mut mail))
        .await
        .expect("scan must not hang")
        .unwrap_err();

    assert!(matches!(err, MailbotError::Email(EmailError::ConnectionFailed(_))));
}

#[tokio::test]
async fn test_scan_publishes_progress() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new(dir.path()).include_spam(false).build();
    let mut session = UnsubscribeSession::from_config(config, None).unwrap();
    let mut events = session.progress().subscribe();
    let mut mail = mailbox();

    session.scan(&mut mail).await.unwrap();

    let mut phases = Vec::new();
    while let Ok(event) = events.try_recv() {
        phases.push(event.phase);
    }
    assert!(phases.contains(&ProgressPhase::Scanning));
    assert_eq!(phases.last(), Some(&ProgressPhase::ScanCompleted));
}
