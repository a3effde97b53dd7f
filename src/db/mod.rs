//! SQLite persistence layer.
//!
//! Implements the [`TaskStore`] boundary the editing session consumes. All
//! multi-row consistency work lives here: the parent recurrence write-back
//! happens in the same transaction as the child save, and deleting a
//! recurring parent clears its instances' back-references in the same
//! transaction as the row delete.

pub mod flags;
pub mod projects;
pub mod tags;
pub mod tasks;

use crate::error::{StoreError, StoreResult};
use crate::store::TaskStore;
use crate::types::{Task, TaskPayload};
use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Shared handle to the SQLite connection. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open the database file, creating it if missing, and bring the
    /// schema up to date.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL so readers don't block the writer
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// In-memory database, used by the test suites.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        embedded::migrations::runner().run(&mut *conn)?;
        Ok(())
    }

    /// Run a closure against the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    /// Like [`with_conn`](Self::with_conn) but mutable, so the closure can
    /// open a transaction.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().unwrap();
        f(&mut conn)
    }
}

/// Current wall-clock time as Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl TaskStore for Database {
    async fn fetch_task_by_id(&self, id: &str) -> StoreResult<Task> {
        self.get_task(id)
            .map_err(StoreError::from)?
            .ok_or_else(|| StoreError::not_found(format!("task {id}")))
    }

    async fn fetch_tags(&self) -> StoreResult<Vec<String>> {
        self.list_tags().map_err(StoreError::from)
    }

    async fn get_feature_flag(&self, name: &str) -> StoreResult<bool> {
        // Unset flags default to enabled.
        Ok(self.get_flag(name).map_err(StoreError::from)?.unwrap_or(true))
    }

    async fn save_task(&self, payload: TaskPayload) -> StoreResult<Task> {
        self.upsert_task(payload).map_err(StoreError::from)
    }

    async fn delete_task(&self, id: &str) -> StoreResult<()> {
        self.remove_task(id).map_err(StoreError::from)
    }
}
