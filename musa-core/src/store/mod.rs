//! Local persistent storage
//!
//! A small SQLite key/value store that plays the role browser local storage
//! and cookies play for the web client: the guest device id and the signed-in
//! session live here. Every read and write goes through [`LocalStore`].

pub mod schema;

use crate::error::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Well-known store keys
pub mod keys {
    /// Guest device identifier
    pub const DEVICE_ID: &str = "guest_device_id";
    /// Bearer token of the signed-in user
    pub const AUTH_TOKEN: &str = "auth_token";
    /// Backend id of the signed-in user
    pub const USER_ID: &str = "user_id";
    /// Role of the signed-in user (`ADMIN`, `FARMER`, ...)
    pub const USER_ROLE: &str = "user_role";
}

/// Key/value store backed by SQLite
pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    /// Open or create a store at the given path and run migrations
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run migrations on this store
    pub fn migrate(&self) -> Result<()> {
        schema::run_migrations(&self.connection())
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read a value
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connection();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM entries WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or replace a value
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.connection();
        conn.execute(
            r#"
            INSERT INTO entries (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Remove a value; removing a missing key is not an error
    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.connection();
        conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
        Ok(())
    }
}
