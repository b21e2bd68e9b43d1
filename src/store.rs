//! Durable key-value store shared by every execution context that opens the
//! same database file.
//!
//! Each handle carries a random origin id. Writes land in `kv` and are echoed
//! into the `changes` log under that origin, so another handle can ask for
//! "what did everybody else change since sequence N" without ever seeing its
//! own writes.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS changes (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    key        TEXT NOT NULL,
    value      TEXT,
    origin     TEXT NOT NULL,
    changed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);
";

const UPSERT: &str = "
INSERT INTO kv (key, value) VALUES (?1, ?2)
ON CONFLICT(key) DO UPDATE SET
    value = excluded.value,
    updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
";

const LOG_CHANGE: &str = "INSERT INTO changes (key, value, origin) VALUES (?1, ?2, ?3)";

/// Number of change-log entries kept when a store is opened.
pub const CHANGE_LOG_RETAIN: i64 = 10_000;

/// A write observed in the change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub seq: i64,
    pub key: String,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
}

pub struct Store {
    conn: Connection,
    origin: String,
}

fn set_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open store at {path}"))?;
        Self::init(conn)
    }

    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        set_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;
        let store = Store {
            conn,
            origin: uuid::Uuid::new_v4().to_string(),
        };
        store.compact_changes(CHANGE_LOG_RETAIN)?;
        Ok(store)
    }

    /// Identifies this handle's writes in the change log.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_savepoint(|conn| {
            conn.execute(UPSERT, rusqlite::params![key, value])?;
            conn.execute(LOG_CHANGE, rusqlite::params![key, value, self.origin])?;
            Ok(())
        })
    }

    /// Removing an absent key is not an error and logs nothing.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.with_savepoint(|conn| {
            let removed = conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
            if removed > 0 {
                conn.execute(
                    LOG_CHANGE,
                    rusqlite::params![key, Option::<&str>::None, self.origin],
                )?;
            }
            Ok(())
        })
    }

    /// Decode the JSON at `key`. A missing key or a payload that does not
    /// decode both read as `T::default()`.
    pub fn get_json<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        let Some(raw) = self.get(key)? else {
            return Ok(T::default());
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                log::warn!("ignoring malformed data at '{key}': {e}");
                Ok(T::default())
            }
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("failed to encode '{key}'"))?;
        self.set(key, &raw)
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")?;
        let rows = stmt.query_map([prefix], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    /// Highest sequence number in the change log, 0 when empty.
    pub fn latest_change(&self) -> Result<i64> {
        let seq: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM changes", [], |row| row.get(0))?;
        Ok(seq.unwrap_or(0))
    }

    /// Changes written by other origins after `seq`, oldest first.
    pub fn changes_since(&self, seq: i64) -> Result<Vec<StoreChange>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT seq, key, value FROM changes WHERE seq > ?1 AND origin != ?2 ORDER BY seq",
        )?;
        let rows = stmt.query_map(rusqlite::params![seq, self.origin], |row| {
            Ok(StoreChange {
                seq: row.get(0)?,
                key: row.get(1)?,
                new_value: row.get(2)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    /// Run `f` inside an IMMEDIATE transaction. Rolls back if `f` fails.
    /// Must not be nested.
    pub fn atomically<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    fn with_savepoint(&self, f: impl FnOnce(&Connection) -> Result<()>) -> Result<()> {
        self.conn.execute_batch("SAVEPOINT store_write")?;
        match f(&self.conn) {
            Ok(()) => {
                self.conn.execute_batch("RELEASE store_write")?;
                Ok(())
            }
            Err(e) => {
                let _ = self
                    .conn
                    .execute_batch("ROLLBACK TO store_write; RELEASE store_write");
                Err(e)
            }
        }
    }

    fn compact_changes(&self, retain: i64) -> Result<()> {
        let latest = self.latest_change()?;
        if latest > retain {
            self.conn
                .execute("DELETE FROM changes WHERE seq <= ?1", [latest - retain])?;
        }
        Ok(())
    }
}
