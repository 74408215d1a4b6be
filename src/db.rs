//! Database module for the assistant runner
//!
//! Persists the small amount of client state that outlives a process,
//! chiefly the thread id each profile resumes.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Could not create database directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path, creating parent directories
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database
    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Setting Operations ====================

    pub fn get_setting(&self, key: &str) -> DbResult<Option<Setting>> {
        let conn = self.conn();
        let setting = conn
            .query_row(
                "SELECT key, value, updated_at FROM settings WHERE key = ?1",
                params![key],
                parse_setting_row,
            )
            .optional()?;
        Ok(setting)
    }

    /// Insert or overwrite a setting
    pub fn put_setting(&self, key: &str, value: &str) -> DbResult<()> {
        let now = Utc::now();
        self.conn().execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Remove a setting; returns whether it existed
    pub fn delete_setting(&self, key: &str) -> DbResult<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(deleted > 0)
    }

    pub fn list_settings(&self) -> DbResult<Vec<Setting>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, value, updated_at FROM settings ORDER BY key")?;
        let settings = stmt
            .query_map([], parse_setting_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(settings)
    }
}

fn parse_setting_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Setting> {
    Ok(Setting {
        key: row.get(0)?,
        value: row.get(1)?,
        updated_at: parse_datetime(&row.get::<_, String>(2)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
