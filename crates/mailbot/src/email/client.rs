//! [`MailSession`] over an already-authenticated IMAP session.

use std::collections::HashSet;
use std::fmt::Debug;

use async_imap::Session;
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use super::error::{EmailError, Result};
use super::session::{FetchItem, MailSession, RawMessage};

/// Header-only fetch that leaves the \Seen flag alone.
const HEADER_QUERY: &str = "(UID BODY.PEEK[HEADER])";

/// Wraps a logged-in IMAP session.
///
/// Folders are opened with EXAMINE (read-only), so scanning never changes
/// the mailbox.
pub struct ImapMailSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    session: Session<T>,
    current_folder: Option<String>,
    current_uidvalidity: Option<u32>,
}

impl<T> ImapMailSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    /// Takes over a session the caller has already authenticated.
    pub fn new(session: Session<T>) -> Self {
        Self {
            session,
            current_folder: None,
            current_uidvalidity: None,
        }
    }

    /// Hands the session back, e.g. for logout.
    pub fn into_inner(self) -> Session<T> {
        self.session
    }

    /// Returns the UIDVALIDITY of the currently examined folder.
    pub fn uidvalidity(&self) -> Option<u32> {
        self.current_uidvalidity
    }

    /// Opens a folder in read-only mode unless it is already open.
    async fn examine_folder(&mut self, folder: &str) -> Result<()> {
        if self.current_folder.as_deref() == Some(folder) {
            return Ok(());
        }

        info!("Examining folder: {}", folder);

        let mailbox = self
            .session
            .examine(folder)
            .await
            .map_err(|e| EmailError::from_examine(folder, e))?;

        self.current_folder = Some(folder.to_string());
        self.current_uidvalidity = mailbox.uid_validity;

        debug!(
            "Folder '{}' opened with {} messages (UIDVALIDITY={:?})",
            folder, mailbox.exists, mailbox.uid_validity
        );
        Ok(())
    }
}

#[async_trait]
impl<T> MailSession for ImapMailSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    async fn list_folders(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut stream = self.session.list(Some(""), Some("*")).await?;

        while let Some(item) = stream.next().await {
            let name = item?;
            if name
                .attributes()
                .iter()
                .any(|a| matches!(a, async_imap::types::NameAttribute::NoSelect))
            {
                continue;
            }
            names.push(name.name().to_string());
        }

        debug!("Server lists {} selectable folders", names.len());
        Ok(names)
    }

    async fn message_uids(&mut self, folder: &str) -> Result<Vec<u32>> {
        self.examine_folder(folder).await?;

        let uids = self.session.uid_search("ALL").await?;
        let uid_list: Vec<u32> = uids.into_iter().collect();
        debug!("Found {} messages in '{}'", uid_list.len(), folder);
        Ok(uid_list)
    }

    async fn fetch_headers(&mut self, folder: &str, uids: &[u32]) -> Result<Vec<FetchItem>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        self.examine_folder(folder).await?;

        let uid_set = uids
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");

        debug!("Fetching headers of {} messages in '{}'", uids.len(), folder);

        let mut results = Vec::with_capacity(uids.len());
        let mut returned = HashSet::new();
        {
            let mut messages = self.session.uid_fetch(&uid_set, HEADER_QUERY).await?;

            while let Some(message_result) = messages.next().await {
                match message_result {
                    Ok(message) => match (message.uid, message.header()) {
                        (Some(uid), Some(header)) => {
                            returned.insert(uid);
                            results.push(FetchItem::Fetched(RawMessage {
                                uid,
                                bytes: header.to_vec(),
                            }));
                        }
                        (Some(uid), None) => {
                            returned.insert(uid);
                            results.push(FetchItem::Failed {
                                uid,
                                reason: "server returned no header data".to_string(),
                            });
                        }
                        (None, _) => warn!("Fetch response without UID in '{}'", folder),
                    },
                    Err(async_imap::error::Error::Io(e)) => {
                        return Err(EmailError::ConnectionFailed(e.to_string()));
                    }
                    Err(e) => warn!("Error fetching message in '{}': {}", folder, e),
                }
            }
        }

        for uid in uids.iter().filter(|u| !returned.contains(u)) {
            results.push(FetchItem::Failed {
                uid: *uid,
                reason: "message not returned by server".to_string(),
            });
        }

        Ok(results)
    }
}
