//! Tag catalog queries.

use super::Database;
use anyhow::Result;
use rusqlite::params;

impl Database {
    /// All known tag names, sorted.
    pub fn list_tags(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM tags ORDER BY name")?;
            let tags = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(tags)
        })
    }

    /// Add a tag name to the catalog without attaching it to any task.
    pub fn add_tag(&self, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![name])?;
            Ok(())
        })
    }
}
