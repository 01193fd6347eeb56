//! SQLite-backed key-value store.

use std::path::PathBuf;

use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

use super::migrations;

/// Durable associative store of primitive values, keyed by string.
///
/// Shared between the always-on host app and short-lived handler
/// invocations. Each setter is a single `INSERT OR REPLACE`, so a record
/// serialized into one value can never be observed half-written.
pub struct KvStore {
    conn: Connection,
}

impl KvStore {
    /// Open the store at `~/.config/timegate/timegate.db`.
    ///
    /// Creates the file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let path = super::data_dir()?.join("timegate.db");
        Self::open_at(path)
    }

    /// Open the store at an explicit path.
    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let conn =
            Connection::open(&path).map_err(|source| StoreError::OpenFailed { path, source })?;
        Self::from_conn(conn)
    }

    /// Open an in-memory store (tests and tooling).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::from_conn(conn)
    }

    fn from_conn(conn: Connection) -> Result<Self, StoreError> {
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.get_value(key)
    }

    pub fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_value(key, value)
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.get_value(key)
    }

    pub fn set_i64(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.set_value(key, value)
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, StoreError> {
        self.get_value(key)
    }

    pub fn set_f64(&self, key: &str, value: f64) -> Result<(), StoreError> {
        self.set_value(key, value)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError> {
        Ok(self.get_i64(key)?.map(|v| v != 0))
    }

    pub fn set_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.set_i64(key, i64::from(value))
    }

    pub fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.get_value(key)
    }

    pub fn set_blob(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.set_value(key, value)
    }

    /// Read a JSON record stored under `key`.
    ///
    /// # Errors
    /// Returns [`StoreError::CorruptValue`] if the stored text no longer
    /// decodes as `T`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get_string(key)? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::CorruptValue {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// Serialize `value` and write it under `key` in one statement.
    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::CorruptValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.set_string(key, &raw)
    }

    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// All keys starting with `prefix`, sorted ascending.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key")?;
        // Range scan on the primary key; the upper bound is the prefix with
        // its last byte bumped, which also sidesteps LIKE wildcard escaping.
        let upper = prefix_upper_bound(prefix);
        let rows = stmt.query_map(params![prefix, upper], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn get_value<T: rusqlite::types::FromSql>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get::<_, T>(0),
        ) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_value<T: rusqlite::ToSql>(&self, key: &str, value: T) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

fn prefix_upper_bound(prefix: &str) -> String {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(last) = bytes.last_mut() {
        if *last < 0xff {
            *last += 1;
            return String::from_utf8_lossy(&bytes).into_owned();
        }
        bytes.pop();
    }
    // Empty or all-0xff prefix: scan to the end of the keyspace.
    "\u{10ffff}".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip() {
        let store = KvStore::open_memory().unwrap();

        store.set_string("s", "hello").unwrap();
        store.set_i64("i", -42).unwrap();
        store.set_f64("f", 1.5).unwrap();
        store.set_bool("b", true).unwrap();
        store.set_blob("blob", &[1, 2, 3]).unwrap();

        assert_eq!(store.get_string("s").unwrap().as_deref(), Some("hello"));
        assert_eq!(store.get_i64("i").unwrap(), Some(-42));
        assert_eq!(store.get_f64("f").unwrap(), Some(1.5));
        assert_eq!(store.get_bool("b").unwrap(), Some(true));
        assert_eq!(store.get_blob("blob").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.get_string("missing").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites() {
        let store = KvStore::open_memory().unwrap();
        store.set_i64("k", 1).unwrap();
        store.set_i64("k", 2).unwrap();
        assert_eq!(store.get_i64("k").unwrap(), Some(2));
    }

    #[test]
    fn test_json_roundtrip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Rec {
            name: String,
            n: u64,
        }

        let store = KvStore::open_memory().unwrap();
        let rec = Rec {
            name: "x".into(),
            n: 7,
        };
        store.put_json("rec", &rec).unwrap();
        assert_eq!(store.get_json::<Rec>("rec").unwrap(), Some(rec));
    }

    #[test]
    fn test_corrupt_json_reported() {
        let store = KvStore::open_memory().unwrap();
        store.set_string("rec", "{not json").unwrap();
        let err = store.get_json::<serde_json::Value>("rec").unwrap_err();
        assert!(matches!(err, StoreError::CorruptValue { .. }));
    }

    #[test]
    fn test_keys_with_prefix() {
        let store = KvStore::open_memory().unwrap();
        store.set_i64("counter:a", 1).unwrap();
        store.set_i64("counter:b", 2).unwrap();
        store.set_i64("history:a:2026-01-01", 3).unwrap();

        let keys = store.keys_with_prefix("counter:").unwrap();
        assert_eq!(keys, vec!["counter:a", "counter:b"]);
        assert!(store.keys_with_prefix("nothing:").unwrap().is_empty());
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = KvStore::open_at(&path).unwrap();
            store.set_string("k", "v").unwrap();
        }
        let store = KvStore::open_at(&path).unwrap();
        assert_eq!(store.get_string("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_delete() {
        let store = KvStore::open_memory().unwrap();
        store.set_i64("k", 1).unwrap();
        store.delete("k").unwrap();
        assert_eq!(store.get_i64("k").unwrap(), None);
    }
}
