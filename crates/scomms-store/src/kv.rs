//! Ordered key-value store backing the trust database.
//!
//! A thin wrapper around a [`rusqlite::Connection`] exposing the store as an
//! ordered map of byte keys to byte values. Callers see opaque blobs; the
//! trust layer encrypts values before they ever reach `put`.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};

pub struct KvStore {
    conn: Connection,
    path: PathBuf,
}

impl KvStore {
    /// Open (or create) a store at an explicit path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                key   BLOB PRIMARY KEY,
                value BLOB NOT NULL
            );",
        )?;

        tracing::debug!(path = %path.display(), "opened key-value store");

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.conn
            .query_row(
                "SELECT value FROM records WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM records WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO records (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM records WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// All records in ascending key order.
    pub fn iterate(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM records ORDER BY key ASC")?;

        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}
