//! Versioned schema for the processed-senders database.
//!
//! Applied versions are kept in `_migrations`. Each step runs in its own
//! transaction together with its bookkeeping row.

use log::{debug, info};
use rusqlite::{params, Connection};

use super::error::StoreError;

/// What has to hold before a step's SQL is executed.
enum Guard {
    Always,
    /// The step adds `column` to `table`; skipped if it is already there.
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
}

struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
    guard: Guard,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "create_processed_senders",
        sql: include_str!("sql/001_create_processed_senders.sql"),
        guard: Guard::Always,
    },
    Step {
        version: 2,
        name: "add_attempts",
        sql: include_str!("sql/002_add_attempts.sql"),
        guard: Guard::MissingColumn {
            table: "processed_senders",
            column: "attempts",
        },
    },
];

/// Brings the schema up to the latest version.
pub(crate) fn run_all(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let applied = schema_version(conn)?;
    for step in STEPS.iter().filter(|s| s.version > applied) {
        apply(conn, step)?;
    }
    Ok(())
}

fn schema_version(conn: &Connection) -> Result<u32, StoreError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )?)
}

fn apply(conn: &Connection, step: &Step) -> Result<(), StoreError> {
    let needed = match step.guard {
        Guard::Always => true,
        Guard::MissingColumn { table, column } => !has_column(conn, table, column)?,
    };

    let tx = conn.unchecked_transaction()?;
    if needed {
        info!("Applying schema v{} ({})", step.version, step.name);
        tx.execute_batch(step.sql).map_err(|e| StoreError::Migration {
            version: step.version,
            reason: e.to_string(),
        })?;
    } else {
        debug!("Schema v{} ({}) already in place", step.version, step.name);
    }
    tx.execute(
        "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
        params![step.version, step.name],
    )?;
    tx.commit()?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::Migration {
            version: 0,
            reason: format!("refusing to inspect table '{}'", table),
        });
    }

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    Ok(names.any(|name| name.is_ok_and(|n| n == column)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(conn: &Connection) -> Vec<u32> {
        let mut stmt = conn
            .prepare("SELECT version FROM _migrations ORDER BY version")
            .unwrap();
        stmt.query_map([], |r| r.get(0))
            .unwrap()
            .map(|v| v.unwrap())
            .collect()
    }

    #[test]
    fn test_fresh_database_gets_every_step() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();

        assert_eq!(versions(&conn), vec![1, 2]);
        assert!(has_column(&conn, "processed_senders", "attempts").unwrap());
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        assert_eq!(versions(&conn), vec![1, 2]);
        assert_eq!(schema_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_existing_column_is_not_added_twice() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE processed_senders (
                sender TEXT PRIMARY KEY NOT NULL,
                outcome TEXT NOT NULL,
                detail TEXT,
                processed_at TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 1
            );",
        )
        .unwrap();

        run_all(&conn).unwrap();
        assert_eq!(versions(&conn), vec![1, 2]);
    }

    #[test]
    fn test_table_name_is_checked() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(has_column(&conn, "t; DROP TABLE x", "id").is_err());
    }
}
