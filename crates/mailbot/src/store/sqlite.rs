//! SQLite-backed [`StoreBackend`].
//!
//! Uses rusqlite with a single connection behind a `Mutex`. WAL mode is
//! enabled for file databases.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::error::{Result, StoreError};
use super::{migrations, Outcome, ProcessedRecord, ProcessedStore, StoreBackend};

/// Thread-safe SQLite handle. Cloning shares the connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    location: String,
}

impl SqliteStore {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        migrations::run_all(&conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: path.display().to_string(),
        })
    }

    /// Opens an in-memory database. Runs all migrations.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: ":memory:".to_string(),
        })
    }

    /// Provides locked access to the underlying connection.
    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }
}

impl StoreBackend for SqliteStore {
    fn load(&self) -> Result<ProcessedStore> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender, outcome, detail, processed_at, attempts
                 FROM processed_senders ORDER BY sender",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, u32>(4)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut store = ProcessedStore::new();
            for (sender, outcome, detail, processed_at, attempts) in rows {
                let outcome: Outcome = outcome.parse().map_err(|reason| StoreError::Corrupt {
                    sender: sender.clone(),
                    reason,
                })?;
                let processed_at = DateTime::parse_from_rfc3339(&processed_at)
                    .map_err(|e| StoreError::Corrupt {
                        sender: sender.clone(),
                        reason: e.to_string(),
                    })?
                    .with_timezone(&Utc);

                store.insert(
                    &sender,
                    ProcessedRecord {
                        outcome,
                        detail,
                        processed_at,
                        attempts,
                    },
                );
            }
            Ok(store)
        })
    }

    fn save(&self, store: &ProcessedStore) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM processed_senders", [])?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO processed_senders (sender, outcome, detail, processed_at, attempts)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (sender, record) in store.iter() {
                    insert.execute(params![
                        sender,
                        record.outcome.as_str(),
                        record.detail,
                        record.processed_at.to_rfc3339(),
                        record.attempts,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.location)
    }
}

/// Returns the canonical database path: `~/.mailbot/data/mailbot.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".mailbot").join("data").join("mailbot.db"))
}
