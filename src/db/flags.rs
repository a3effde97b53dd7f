//! User-level feature flags.

use super::Database;
use anyhow::Result;
use rusqlite::params;

impl Database {
    /// Read a flag. `None` means the flag was never set; callers decide the
    /// default (the intelligence flag defaults to enabled).
    pub fn get_flag(&self, name: &str) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT enabled FROM feature_flags WHERE name = ?1",
                params![name],
                |row| row.get::<_, i64>(0),
            );
            match result {
                Ok(v) => Ok(Some(v != 0)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Set (or overwrite) a flag.
    pub fn set_flag(&self, name: &str, enabled: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO feature_flags (name, enabled) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET enabled = excluded.enabled",
                params![name, enabled as i64],
            )?;
            Ok(())
        })
    }
}
