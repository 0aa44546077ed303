//! Key-value slots

use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::database::Database;
use crate::error::StorageError;
use crate::Result;

/// Byte-valued local persistence addressed by string keys.
///
/// `set` replaces any previous value; `remove` on a missing key is a no-op.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

fn check_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;

        self.with_connection(|conn| {
            let value = conn
                .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        check_key(key)?;

        let updated_at = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key, value, updated_at],
            )?;
            Ok(())
        })?;

        tracing::debug!(key = %key, bytes = value.len(), "Stored value");

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        check_key(key)?;

        let removed = self.with_connection(|conn| {
            Ok(conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?)
        })?;

        tracing::debug!(key = %key, removed, "Removed value");

        Ok(())
    }
}
