use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

/// A stored JSON record and when it was last written.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

/// Key-value document storage on top of SQLite.
///
/// Both the local persistence adapter and the remote document server keep
/// their JSON documents here.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS documents (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    pub fn get_record(&self, key: &str) -> Result<Option<StoredRecord>> {
        self.conn
            .query_row(
                "SELECT key, value, updated_at FROM documents WHERE key = ?1",
                params![key],
                |row| {
                    Ok(StoredRecord {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("Failed to read record '{key}'"))
    }

    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_record(key)?.map(|r| r.value))
    }

    /// Insert or overwrite the record stored under `key`.
    pub fn put_value(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO documents (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("Failed to write record '{key}'"))?;
        Ok(())
    }

    pub fn delete_value(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM documents WHERE key = ?1", params![key])
            .with_context(|| format!("Failed to delete record '{key}'"))?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get_value() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_value("tdee-calc-u1").unwrap().is_none());

        db.put_value("tdee-calc-u1", r#"{"startWeight":80}"#).unwrap();
        assert_eq!(
            db.get_value("tdee-calc-u1").unwrap().as_deref(),
            Some(r#"{"startWeight":80}"#)
        );
    }

    #[test]
    fn test_put_overwrites_and_updates_timestamp() {
        let db = Database::open_in_memory().unwrap();
        db.put_value("k", "one").unwrap();
        let first = db.get_record("k").unwrap().unwrap();

        db.put_value("k", "two").unwrap();
        let second = db.get_record("k").unwrap().unwrap();
        assert_eq!(second.value, "two");
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn test_delete_value() {
        let db = Database::open_in_memory().unwrap();
        db.put_value("k", "v").unwrap();
        assert!(db.delete_value("k").unwrap());
        assert!(!db.delete_value("k").unwrap());
        assert!(db.get_value("k").unwrap().is_none());
    }

    #[test]
    fn test_open_on_disk_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tdee.db");
        {
            let db = Database::open(&path).unwrap();
            db.put_value("k", "v").unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_value("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
