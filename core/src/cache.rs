use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

/// A stored HTTP response, keyed by URL within a named cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Per-namespace totals, for `brewlog cache list`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheSummary {
    pub cache_name: String,
    pub entries: i64,
    pub bytes: i64,
}

/// Named request→response caches in a single SQLite file.
pub struct CacheStore {
    conn: Connection,
}

impl CacheStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open cache: {}", path.display()))?;
        let store = CacheStore { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = CacheStore { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS cache_entries (
                    cache_name TEXT NOT NULL,
                    url TEXT NOT NULL,
                    status INTEGER NOT NULL,
                    content_type TEXT,
                    body BLOB NOT NULL,
                    stored_at TEXT NOT NULL,
                    PRIMARY KEY (cache_name, url)
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// Store (or replace) the response for `url` in `cache_name`.
    pub fn put(&self, cache_name: &str, url: &str, response: &CachedResponse) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO cache_entries (cache_name, url, status, content_type, body, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(cache_name, url) DO UPDATE SET
                status = excluded.status,
                content_type = excluded.content_type,
                body = excluded.body,
                stored_at = excluded.stored_at",
            params![
                cache_name,
                url,
                response.status,
                response.content_type,
                response.body,
                now
            ],
        )?;
        Ok(())
    }

    pub fn lookup(&self, cache_name: &str, url: &str) -> Result<Option<CachedResponse>> {
        let found = self
            .conn
            .query_row(
                "SELECT status, content_type, body FROM cache_entries
                 WHERE cache_name = ?1 AND url = ?2",
                params![cache_name, url],
                |row| {
                    Ok(CachedResponse {
                        status: row.get(0)?,
                        content_type: row.get(1)?,
                        body: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    pub fn cache_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT cache_name FROM cache_entries ORDER BY cache_name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn summaries(&self) -> Result<Vec<CacheSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT cache_name, COUNT(*), COALESCE(SUM(LENGTH(body)), 0)
             FROM cache_entries GROUP BY cache_name ORDER BY cache_name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CacheSummary {
                    cache_name: row.get(0)?,
                    entries: row.get(1)?,
                    bytes: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Remove a whole namespace. Returns whether anything was deleted.
    pub fn delete_cache(&self, cache_name: &str) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM cache_entries WHERE cache_name = ?1",
            params![cache_name],
        )?;
        Ok(n > 0)
    }

    pub fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM cache_entries", [])?)
    }
}
