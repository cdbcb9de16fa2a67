use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::migrations;
use crate::store::KeyValueStore;

/// SQLite-backed key-value store
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file
    ///
    /// # Errors
    ///
    /// Returns an error if database directory creation, connection opening, or schema initialization fails
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = db_path.unwrap_or_else(Self::default_db_path);

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&path).context("Failed to open database connection")?;
        migrations::init_schema(&conn)?;

        log::info!("Database initialized at: {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database
    ///
    /// # Errors
    ///
    /// Returns an error if schema initialization fails
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        migrations::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get default database path
    #[must_use]
    pub fn default_db_path() -> PathBuf {
        let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("tabfocus");
        path.push("tabfocus.db");
        path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }
}

fn upsert(conn: &Connection, key: &str, value: &Value) -> Result<()> {
    let encoded = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET
            value = ?2,
            updated_at = ?3",
        params![key, encoded, Utc::now().to_rfc3339()],
    )
    .with_context(|| format!("Failed to write '{key}'"))?;
    Ok(())
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read '{key}'"))?;

        match raw {
            Some(text) => match serde_json::from_str(&text) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    log::warn!("Stored value for '{key}' is not valid JSON: {e}");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let conn = self.lock()?;
        upsert(&conn, key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])
            .with_context(|| format!("Failed to delete '{key}'"))?;
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, Value)]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for (key, value) in entries {
            upsert(&tx, key, value)?;
        }
        tx.commit().context("Failed to commit state write")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_roundtrip_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get("blacklist").unwrap(), None);

        db.set("blacklist", &json!(["reddit.com"])).unwrap();
        db.set("blacklist", &json!(["reddit.com", "x.com"])).unwrap();

        assert_eq!(
            db.get("blacklist").unwrap(),
            Some(json!(["reddit.com", "x.com"]))
        );
        let rows: i64 = db
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM kv_store", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_set_many_writes_all_keys() {
        let db = Database::open_in_memory().unwrap();
        db.set_many(&[
            ("focusState", json!({"active": true, "hiddenTabs": []})),
            ("timerState", json!({"active": false})),
        ])
        .unwrap();

        assert_eq!(db.get("focusState").unwrap().unwrap()["active"], true);
        assert_eq!(db.get("timerState").unwrap().unwrap()["active"], false);

        db.remove("timerState").unwrap();
        assert_eq!(db.get("timerState").unwrap(), None);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tabfocus.db");

        {
            let db = Database::new(Some(path.clone())).unwrap();
            db.set("customWarningMessage", &json!("Back to work")).unwrap();
        }

        let db = Database::new(Some(path)).unwrap();
        assert_eq!(
            db.get("customWarningMessage").unwrap(),
            Some(json!("Back to work"))
        );
    }

    #[test]
    fn test_corrupted_row_reads_as_absent() {
        let db = Database::open_in_memory().unwrap();
        {
            let conn = db.lock().unwrap();
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES ('blacklist', '{oops', '')",
                [],
            )
            .unwrap();
        }
        assert_eq!(db.get("blacklist").unwrap(), None);
    }
}
