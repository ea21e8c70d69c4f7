use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrackerError};
use crate::reminders::{Timer, TimerBackend};

/// Local SQLite file holding the key/value documents and the pending timers.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        // The reminder daemon and one-off commands may hold the file at once.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn default_path() -> PathBuf {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobtrack") {
            proj_dirs.data_dir().join("jobtrack.db")
        } else {
            PathBuf::from("jobtrack.db")
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS timers (
                key TEXT PRIMARY KEY,
                fire_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_timers_fire_at ON timers(fire_at);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('kv', 'timers')",
            [],
            |row| row.get(0),
        )?;
        if tables < 2 {
            return Err(TrackerError::NotInitialized);
        }
        Ok(())
    }

    // --- Key/value documents ---

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;

        match raw {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|source| TrackerError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Replaces the whole document under `key` in one statement, so readers
    /// see either the old value or the new one.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let text = serde_json::to_string(value).map_err(|source| TrackerError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.conn.execute(
            "INSERT INTO kv (key, value, version, updated_at) VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                version = kv.version + 1,
                updated_at = excluded.updated_at",
            params![key, text, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Write counter for `key`; 0 if never written. Another process polls this
    /// to notice changes.
    pub fn revision(&self, key: &str) -> Result<i64> {
        let version: Option<i64> = self
            .conn
            .query_row("SELECT version FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(version.unwrap_or(0))
    }

    // --- Timers ---

    /// Removes and returns every timer due at `now_ms`, oldest first.
    pub fn take_due(&self, now_ms: i64) -> Result<Vec<Timer>> {
        let tx = self.conn.unchecked_transaction()?;
        let due = {
            let mut stmt =
                tx.prepare("SELECT key, fire_at FROM timers WHERE fire_at <= ?1 ORDER BY fire_at")?;
            let rows = stmt.query_map([now_ms], Self::row_to_timer)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.execute("DELETE FROM timers WHERE fire_at <= ?1", [now_ms])?;
        tx.commit()?;
        Ok(due)
    }

    fn row_to_timer(row: &rusqlite::Row) -> rusqlite::Result<Timer> {
        Ok(Timer {
            key: row.get(0)?,
            fire_at: row.get(1)?,
        })
    }
}

impl TimerBackend for Database {
    fn create_timer(&self, key: &str, fire_at: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO timers (key, fire_at) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET fire_at = excluded.fire_at",
            params![key, fire_at],
        )?;
        Ok(())
    }

    fn cancel_timer(&self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM timers WHERE key = ?1", [key])?;
        Ok(())
    }

    fn list_timers(&self) -> Result<Vec<Timer>> {
        let mut stmt = self.conn.prepare("SELECT key, fire_at FROM timers ORDER BY fire_at")?;
        let rows = stmt.query_map([], Self::row_to_timer)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_key_is_none() {
        let db = Database::open_in_memory().unwrap();
        let value: Option<Vec<String>> = db.get("applications").unwrap();
        assert!(value.is_none());
        assert_eq!(db.revision("applications").unwrap(), 0);
    }

    #[test]
    fn test_set_replaces_and_bumps_revision() {
        let db = Database::open_in_memory().unwrap();
        db.set("applications", &vec!["a".to_string()]).unwrap();
        db.set("applications", &vec!["b".to_string(), "c".to_string()]).unwrap();

        let value: Vec<String> = db.get("applications").unwrap().unwrap();
        assert_eq!(value, vec!["b", "c"]);
        assert_eq!(db.revision("applications").unwrap(), 2);
    }

    #[test]
    fn test_corrupt_value_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.set("applications", "not a list").unwrap();
        let result: Result<Option<Vec<String>>> = db.get("applications");
        assert!(matches!(result, Err(TrackerError::Corrupt { .. })));
    }

    #[test]
    fn test_ensure_initialized_on_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("nested").join("t.db")).unwrap();
        assert!(matches!(db.ensure_initialized(), Err(TrackerError::NotInitialized)));
        db.init().unwrap();
        db.ensure_initialized().unwrap();
    }

    #[test]
    fn test_timers_create_replace_cancel() {
        let db = Database::open_in_memory().unwrap();
        db.create_timer("followup-a", 100).unwrap();
        db.create_timer("followup-b", 50).unwrap();
        db.create_timer("followup-a", 200).unwrap();

        let timers = db.list_timers().unwrap();
        assert_eq!(timers.len(), 2);
        assert_eq!(timers[0], Timer { key: "followup-b".into(), fire_at: 50 });
        assert_eq!(timers[1], Timer { key: "followup-a".into(), fire_at: 200 });

        db.cancel_timer("followup-b").unwrap();
        db.cancel_timer("missing").unwrap();
        assert_eq!(db.list_timers().unwrap().len(), 1);
    }

    #[test]
    fn test_take_due_is_one_shot() {
        let db = Database::open_in_memory().unwrap();
        db.create_timer("followup-a", 100).unwrap();
        db.create_timer("followup-b", 300).unwrap();

        let due = db.take_due(150).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].key, "followup-a");
        assert!(db.take_due(150).unwrap().is_empty());
        assert_eq!(db.list_timers().unwrap().len(), 1);
    }
}
