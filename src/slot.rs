// Durable key-value slots backing the task collection

use eyre::{Context, Result, eyre};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CURRENT_VERSION: u32 = 1;

/// A named, durable storage location holding one text value per key
///
/// Writes overwrite the previous value (last writer wins).
pub trait Slot {
    fn read(&self, key: &str) -> Result<Option<String>>;

    fn write(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Slot persisted in a SQLite database under `<path>/.tasktable`
pub struct SqliteSlot {
    base_path: PathBuf,
    db: Connection,
}

impl SqliteSlot {
    /// Open or create a slot store at the given path
    ///
    /// The database lives in a `.tasktable` subdirectory of the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().join(".tasktable");

        fs::create_dir_all(&base_path).context("Failed to create store directory")?;

        let db_path = base_path.join("tasktable.db");
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;

        let slot = Self { base_path, db };
        slot.create_schema()?;
        slot.create_gitignore()?;
        slot.write_version()?;

        debug!(path = ?slot.base_path, "Opened SQLite slot");
        Ok(slot)
    }

    fn create_schema(&self) -> Result<()> {
        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS slots (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn create_gitignore(&self) -> Result<()> {
        let gitignore_path = self.base_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(gitignore_path, "tasktable.db\ntasktable.db-shm\ntasktable.db-wal\n")?;
        }
        Ok(())
    }

    fn write_version(&self) -> Result<()> {
        let version_path = self.base_path.join(".version");
        if !version_path.exists() {
            fs::write(version_path, CURRENT_VERSION.to_string())?;
        }
        Ok(())
    }

    fn validate_key(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(eyre!("Slot key cannot be empty"));
        }
        if key.len() > 64 {
            return Err(eyre!("Slot key too long: {} (max 64 chars)", key));
        }
        if !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(eyre!("Invalid slot key: {} (must be alphanumeric with _/-)", key));
        }
        Ok(())
    }
}

impl Slot for SqliteSlot {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Self::validate_key(key)?;

        let value = self
            .db
            .query_row("SELECT value FROM slots WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .context("Failed to read slot")?;
        Ok(value)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        Self::validate_key(key)?;

        let tx = self.db.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO slots (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, chrono::Utc::now().timestamp_millis()],
        )?;
        tx.commit().context("Failed to commit slot write")?;

        debug!(key, bytes = value.len(), "Wrote slot");
        Ok(())
    }
}

/// Volatile slot, for tests and throwaway sessions
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    values: HashMap<String, String>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Slot for MemorySlot {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_directory() {
        let temp = TempDir::new().unwrap();

        let _slot = SqliteSlot::open(temp.path()).unwrap();
        let store_path = temp.path().join(".tasktable");
        assert!(store_path.exists());
        assert!(store_path.join("tasktable.db").exists());
        assert!(store_path.join(".gitignore").exists());
        assert!(store_path.join(".version").exists());
    }

    #[test]
    fn test_read_missing_key() {
        let temp = TempDir::new().unwrap();
        let slot = SqliteSlot::open(temp.path()).unwrap();
        assert_eq!(slot.read("tasks").unwrap(), None);
    }

    #[test]
    fn test_write_overwrites() {
        let temp = TempDir::new().unwrap();
        let mut slot = SqliteSlot::open(temp.path()).unwrap();

        slot.write("tasks", "[1]").unwrap();
        slot.write("tasks", "[2]").unwrap();
        assert_eq!(slot.read("tasks").unwrap().as_deref(), Some("[2]"));
    }

    #[test]
    fn test_values_survive_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let mut slot = SqliteSlot::open(temp.path()).unwrap();
            slot.write("tasks", "[]").unwrap();
        }
        let slot = SqliteSlot::open(temp.path()).unwrap();
        assert_eq!(slot.read("tasks").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_validate_key() {
        assert!(SqliteSlot::validate_key("tasks").is_ok());
        assert!(SqliteSlot::validate_key("task-list_2").is_ok());

        assert!(SqliteSlot::validate_key("").is_err());
        assert!(SqliteSlot::validate_key("bad/key").is_err());
        assert!(SqliteSlot::validate_key(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_memory_slot() {
        let mut slot = MemorySlot::new();
        assert_eq!(slot.read("tasks").unwrap(), None);
        slot.write("tasks", "garbage").unwrap();
        assert_eq!(slot.read("tasks").unwrap().as_deref(), Some("garbage"));
    }
}
