//! Project CRUD.

use super::{now_ms, Database};
use crate::error::StoreError;
use crate::types::{Priority, Project};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

fn parse_project_row(row: &Row) -> rusqlite::Result<Project> {
    let id: String = row.get("id")?;
    let name: String = row.get("name")?;
    let description: Option<String> = row.get("description")?;
    let active: i64 = row.get("active")?;
    let area_id: Option<String> = row.get("area_id")?;
    let tags_json: String = row.get("tags")?;
    let priority: Option<String> = row.get("priority")?;
    let due_date: Option<String> = row.get("due_date")?;
    let created_at: i64 = row.get("created_at")?;
    let updated_at: i64 = row.get("updated_at")?;

    Ok(Project {
        id,
        name,
        description,
        active: active != 0,
        area_id,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        priority: priority.as_deref().map(Priority::parse),
        due_date: due_date.and_then(|s| s.parse::<NaiveDate>().ok()),
        created_at,
        updated_at,
    })
}

fn get_project_internal(conn: &Connection, project_id: &str) -> Result<Option<Project>> {
    let mut stmt = conn.prepare("SELECT * FROM projects WHERE id = ?1")?;

    let result = stmt.query_row(params![project_id], parse_project_row);

    match result {
        Ok(project) => Ok(Some(project)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Database {
    /// Create a new project.
    pub fn create_project(
        &self,
        name: &str,
        description: Option<String>,
        area_id: Option<String>,
        tags: Vec<String>,
        priority: Option<Priority>,
        due_date: Option<NaiveDate>,
    ) -> Result<Project> {
        if name.trim().is_empty() {
            return Err(anyhow::Error::new(StoreError::validation(
                "project name must not be empty",
            )));
        }

        let now = now_ms();
        let project = Project {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            description,
            active: true,
            area_id,
            tags,
            priority,
            due_date,
            created_at: now,
            updated_at: now,
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO projects (
                    id, name, description, active, area_id, tags, priority,
                    due_date, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    &project.id,
                    &project.name,
                    &project.description,
                    project.active as i64,
                    &project.area_id,
                    serde_json::to_string(&project.tags)?,
                    project.priority.map(|p| p.as_str()),
                    project.due_date.map(|d| d.to_string()),
                    project.created_at,
                    project.updated_at,
                ],
            )?;
            Ok(project)
        })
    }

    /// Get a project by ID.
    pub fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        self.with_conn(|conn| get_project_internal(conn, project_id))
    }

    /// List projects, optionally only active ones.
    pub fn list_projects(&self, active_only: bool) -> Result<Vec<Project>> {
        self.with_conn(|conn| {
            let sql = if active_only {
                "SELECT * FROM projects WHERE active = 1 ORDER BY name"
            } else {
                "SELECT * FROM projects ORDER BY name"
            };
            let mut stmt = conn.prepare(sql)?;
            let projects = stmt
                .query_map([], parse_project_row)?
                .collect::<std::result::Result<Vec<Project>, _>>()?;
            Ok(projects)
        })
    }

    /// Update a project. `None` leaves a field unchanged; the nested options
    /// clear the field.
    pub fn update_project(
        &self,
        project_id: &str,
        name: Option<String>,
        description: Option<Option<String>>,
        active: Option<bool>,
        area_id: Option<Option<String>>,
        tags: Option<Vec<String>>,
        priority: Option<Option<Priority>>,
        due_date: Option<Option<NaiveDate>>,
    ) -> Result<Project> {
        let now = now_ms();

        self.with_conn(|conn| {
            let project = get_project_internal(conn, project_id)?.ok_or_else(|| {
                anyhow::Error::new(StoreError::not_found(format!("project {project_id}")))
            })?;

            let new_name = name.unwrap_or(project.name);
            if new_name.trim().is_empty() {
                return Err(anyhow::Error::new(StoreError::validation(
                    "project name must not be empty",
                )));
            }
            let new_description = description.unwrap_or(project.description);
            let new_active = active.unwrap_or(project.active);
            let new_area = area_id.unwrap_or(project.area_id);
            let new_tags = tags.unwrap_or(project.tags);
            let new_priority = priority.unwrap_or(project.priority);
            let new_due = due_date.unwrap_or(project.due_date);

            conn.execute(
                "UPDATE projects SET
                    name = ?2, description = ?3, active = ?4, area_id = ?5,
                    tags = ?6, priority = ?7, due_date = ?8, updated_at = ?9
                 WHERE id = ?1",
                params![
                    project_id,
                    &new_name,
                    &new_description,
                    new_active as i64,
                    &new_area,
                    serde_json::to_string(&new_tags)?,
                    new_priority.map(|p| p.as_str()),
                    new_due.map(|d| d.to_string()),
                    now,
                ],
            )?;

            Ok(Project {
                id: project_id.to_string(),
                name: new_name,
                description: new_description,
                active: new_active,
                area_id: new_area,
                tags: new_tags,
                priority: new_priority,
                due_date: new_due,
                created_at: project.created_at,
                updated_at: now,
            })
        })
    }

    /// Delete a project. Its tasks are kept and detached, in the same
    /// transaction as the row delete.
    pub fn remove_project(&self, project_id: &str) -> Result<()> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "UPDATE tasks SET project_id = NULL, updated_at = ?2 WHERE project_id = ?1",
                params![project_id, now],
            )?;

            let deleted = tx.execute("DELETE FROM projects WHERE id = ?1", params![project_id])?;
            if deleted == 0 {
                return Err(anyhow::Error::new(StoreError::not_found(format!(
                    "project {project_id}"
                ))));
            }

            tx.commit()?;
            Ok(())
        })
    }
}
