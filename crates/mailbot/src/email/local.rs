//! [`MailSession`] over a directory of exported messages.
//!
//! Layout: one subdirectory per folder, each holding message files (`.eml`
//! exports or Maildir `cur/` and `new/` entries). Files are ordered by name,
//! which for Maildir and most exporters is delivery order, and numbered from 1
//! to form folder-relative UIDs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use walkdir::WalkDir;

use super::error::{EmailError, Result};
use super::session::{FetchItem, MailSession, RawMessage};

/// Mail session backed by the local filesystem.
pub struct LocalMailSession {
    root: PathBuf,
    index: HashMap<String, Vec<PathBuf>>,
}

impl LocalMailSession {
    /// Opens a mail directory. Fails if `root` is not a directory.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(EmailError::ConnectionFailed(format!(
                "Mail directory '{}' does not exist",
                root.display()
            )));
        }
        info!("Using local mail directory {}", root.display());
        Ok(Self {
            root,
            index: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder_files(&mut self, folder: &str) -> Result<&Vec<PathBuf>> {
        if !self.index.contains_key(folder) {
            let dir = self.root.join(folder);
            if !dir.is_dir() {
                return Err(EmailError::FolderNotFound(folder.to_string()));
            }

            let mut files: Vec<PathBuf> = WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(2)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| {
                    !e.file_name()
                        .to_str()
                        .map(|n| n.starts_with('.'))
                        .unwrap_or(true)
                })
                .map(|e| e.into_path())
                .collect();
            files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

            debug!("Indexed {} message files in '{}'", files.len(), folder);
            self.index.insert(folder.to_string(), files);
        }

        self.index
            .get(folder)
            .ok_or_else(|| EmailError::FolderNotFound(folder.to_string()))
    }
}

#[async_trait]
impl MailSession for LocalMailSession {
    async fn list_folders(&mut self) -> Result<Vec<String>> {
        let mut folders: Vec<String> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
            .filter(|name| !name.starts_with('.'))
            .collect();
        folders.sort();
        Ok(folders)
    }

    async fn message_uids(&mut self, folder: &str) -> Result<Vec<u32>> {
        let count = self.folder_files(folder)?.len() as u32;
        Ok((1..=count).collect())
    }

    async fn fetch_headers(&mut self, folder: &str, uids: &[u32]) -> Result<Vec<FetchItem>> {
        let files = self.folder_files(folder)?.clone();
        let mut items = Vec::with_capacity(uids.len());

        for &uid in uids {
            let Some(path) = uid
                .checked_sub(1)
                .and_then(|idx| files.get(idx as usize))
            else {
                items.push(FetchItem::Failed {
                    uid,
                    reason: "no such message".to_string(),
                });
                continue;
            };

            match tokio::fs::read(path).await {
                Ok(bytes) => items.push(FetchItem::Fetched(RawMessage { uid, bytes })),
                Err(e) => items.push(FetchItem::Failed {
                    uid,
                    reason: format!("{}: {}", path.display(), e),
                }),
            }
        }

        Ok(items)
    }
}
