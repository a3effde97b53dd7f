//! Task CRUD, parent recurrence write-back, and instance generation.

use super::{now_ms, Database};
use crate::error::StoreError;
use crate::recurrence::spawn_instance;
use crate::types::{Priority, Recurrence, RecurrenceKind, Task, TaskPayload, TaskStatus};
use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Weekday};
use rusqlite::{params, Connection, Row};
use tracing::warn;
use uuid::Uuid;

fn validation(msg: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(StoreError::validation(msg))
}

// =============================================================================
// Column conversion helpers
// =============================================================================

fn weekday_to_index(day: Weekday) -> u32 {
    day.num_days_from_monday()
}

fn weekday_from_index(idx: u32) -> Option<Weekday> {
    match idx {
        0 => Some(Weekday::Mon),
        1 => Some(Weekday::Tue),
        2 => Some(Weekday::Wed),
        3 => Some(Weekday::Thu),
        4 => Some(Weekday::Fri),
        5 => Some(Weekday::Sat),
        6 => Some(Weekday::Sun),
        _ => None,
    }
}

/// Recurrence fields as their column values (kind, interval, weekdays JSON).
fn recurrence_columns(
    rec: &Option<Recurrence>,
) -> Result<(Option<&'static str>, Option<i64>, Option<String>)> {
    match rec {
        None => Ok((None, None, None)),
        Some(rec) => {
            let indices: Vec<u32> = rec.weekdays.iter().map(|w| weekday_to_index(*w)).collect();
            let weekdays_json = if indices.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&indices)?)
            };
            Ok((
                Some(rec.kind.as_str()),
                Some(rec.interval as i64),
                weekdays_json,
            ))
        }
    }
}

fn parse_recurrence(
    kind: Option<String>,
    interval: Option<i64>,
    weekdays_json: Option<String>,
) -> Option<Recurrence> {
    let kind = RecurrenceKind::from_str(kind.as_deref()?)?;
    let weekdays = weekdays_json
        .and_then(|s| serde_json::from_str::<Vec<u32>>(&s).ok())
        .map(|indices| indices.into_iter().filter_map(weekday_from_index).collect())
        .unwrap_or_default();
    Some(Recurrence {
        kind,
        interval: interval.unwrap_or(1).max(1) as u32,
        weekdays,
    })
}

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let id: String = row.get("id")?;
    let name: String = row.get("name")?;
    let note: Option<String> = row.get("note")?;
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;
    let due_date: Option<String> = row.get("due_date")?;
    let project_id: Option<String> = row.get("project_id")?;
    let recurrence_kind: Option<String> = row.get("recurrence_kind")?;
    let recurrence_interval: Option<i64> = row.get("recurrence_interval")?;
    let recurrence_weekdays: Option<String> = row.get("recurrence_weekdays")?;
    let recurring_parent_id: Option<String> = row.get("recurring_parent_id")?;
    let created_at: i64 = row.get("created_at")?;
    let updated_at: i64 = row.get("updated_at")?;

    Ok(Task {
        id,
        name,
        note,
        status: TaskStatus::parse(&status),
        priority: Priority::parse(&priority),
        due_date: due_date.and_then(|s| s.parse::<NaiveDate>().ok()),
        project_id,
        tags: Vec::new(), // filled from the junction table by the caller
        recurrence: parse_recurrence(recurrence_kind, recurrence_interval, recurrence_weekdays),
        recurring_parent_id,
        created_at,
        updated_at,
    })
}

/// Sync task tags to the task_tags junction table and the tag catalog.
/// Replaces all existing tags for the task; duplicate names collapse on the
/// (task_id, tag) primary key.
fn sync_task_tags(conn: &Connection, task_id: &str, tags: &[String]) -> Result<()> {
    conn.execute("DELETE FROM task_tags WHERE task_id = ?1", params![task_id])?;
    for tag in tags {
        conn.execute(
            "INSERT OR IGNORE INTO task_tags (task_id, tag) VALUES (?1, ?2)",
            params![task_id, tag],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO tags (name) VALUES (?1)",
            params![tag],
        )?;
    }
    Ok(())
}

fn load_task_tags(conn: &Connection, task_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT tag FROM task_tags WHERE task_id = ?1 ORDER BY tag")?;
    let tags = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(tags)
}

/// Internal helper to get a task using an existing connection (avoids deadlock).
fn get_task_internal(conn: &Connection, task_id: &str) -> Result<Option<Task>> {
    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE id = ?1")?;

    let result = stmt.query_row(params![task_id], parse_task_row);

    match result {
        Ok(mut task) => {
            task.tags = load_task_tags(conn, &task.id)?;
            Ok(Some(task))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn insert_task_row(conn: &Connection, task: &Task) -> Result<()> {
    let (kind, interval, weekdays) = recurrence_columns(&task.recurrence)?;
    conn.execute(
        "INSERT INTO tasks (
            id, name, note, status, priority, due_date, project_id,
            recurrence_kind, recurrence_interval, recurrence_weekdays,
            recurring_parent_id, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            &task.id,
            &task.name,
            &task.note,
            task.status.as_str(),
            task.priority.as_str(),
            task.due_date.map(|d| d.to_string()),
            &task.project_id,
            kind,
            interval,
            weekdays,
            &task.recurring_parent_id,
            task.created_at,
            task.updated_at,
        ],
    )?;
    sync_task_tags(conn, &task.id, &task.tags)?;
    Ok(())
}

/// Payload checks applied at the persistence boundary. The parent reference
/// is resolved here too: a dangling reference is cleared (non-fatal, logged),
/// while a reference to another instance is rejected outright.
fn validate_and_resolve(conn: &Connection, payload: &mut TaskPayload) -> Result<()> {
    if payload.name.trim().is_empty() {
        return Err(validation("task name must not be empty"));
    }

    if let Some(rec) = &payload.recurrence {
        if rec.interval == 0 {
            return Err(validation("recurrence interval must be at least 1"));
        }
        if !rec.weekdays.is_empty() && rec.kind != RecurrenceKind::Weekly {
            return Err(validation("a weekday set requires a weekly recurrence"));
        }
    }

    if let Some(project_id) = &payload.project_id {
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM projects WHERE id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(validation(format!("unknown project: {project_id}")));
        }
    }

    if let Some(parent_id) = payload.recurring_parent_id.clone() {
        if payload.id.as_deref() == Some(parent_id.as_str()) {
            return Err(validation("a task cannot be its own recurring parent"));
        }

        match get_task_internal(conn, &parent_id)? {
            None => {
                // Parent deleted since the instance was generated: treat as
                // no parent rather than failing the save.
                warn!(%parent_id, "recurring parent no longer exists; clearing back-reference");
                payload.recurring_parent_id = None;
                payload.update_parent_recurrence = false;
            }
            Some(parent) if parent.is_recurring_instance() => {
                return Err(validation(
                    "a generated instance cannot serve as a recurring parent",
                ));
            }
            Some(_) => {}
        }

        // The other direction of the one-level rule: a task that already
        // parents generated instances cannot itself become an instance.
        if let (Some(task_id), Some(_)) = (&payload.id, &payload.recurring_parent_id) {
            let instance_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE recurring_parent_id = ?1",
                params![task_id],
                |row| row.get(0),
            )?;
            if instance_count > 0 {
                return Err(validation(
                    "a task with generated instances cannot become an instance itself",
                ));
            }
        }
    }

    Ok(())
}

impl Database {
    /// Get a task by ID, tags included.
    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, task_id))
    }

    /// List the generated instances of a recurring parent.
    pub fn instances_of(&self, parent_id: &str) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM tasks WHERE recurring_parent_id = ?1 ORDER BY due_date, created_at",
            )?;
            let mut tasks = stmt
                .query_map(params![parent_id], parse_task_row)?
                .collect::<std::result::Result<Vec<Task>, _>>()?;
            for task in &mut tasks {
                task.tags = load_task_tags(conn, &task.id)?;
            }
            Ok(tasks)
        })
    }

    /// List tasks belonging to a project.
    pub fn tasks_in_project(&self, project_id: &str) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM tasks WHERE project_id = ?1 ORDER BY created_at")?;
            let mut tasks = stmt
                .query_map(params![project_id], parse_task_row)?
                .collect::<std::result::Result<Vec<Task>, _>>()?;
            for task in &mut tasks {
                task.tags = load_task_tags(conn, &task.id)?;
            }
            Ok(tasks)
        })
    }

    /// Create or update a task from the full payload, in one transaction.
    ///
    /// When `update_parent_recurrence` is set, the payload's recurrence
    /// fields are applied to the parent row in the same transaction as the
    /// child save. A dangling parent reference is cleared, not fatal.
    pub fn upsert_task(&self, mut payload: TaskPayload) -> Result<Task> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            validate_and_resolve(&tx, &mut payload)?;

            let task_id = payload
                .id
                .clone()
                .unwrap_or_else(|| Uuid::now_v7().to_string());
            let (kind, interval, weekdays) = recurrence_columns(&payload.recurrence)?;
            let due = payload.due_date.map(|d| d.to_string());

            let exists: i64 = tx.query_row(
                "SELECT COUNT(*) FROM tasks WHERE id = ?1",
                params![task_id],
                |row| row.get(0),
            )?;

            if exists > 0 {
                tx.execute(
                    "UPDATE tasks SET
                        name = ?2, note = ?3, status = ?4, priority = ?5,
                        due_date = ?6, project_id = ?7,
                        recurrence_kind = ?8, recurrence_interval = ?9,
                        recurrence_weekdays = ?10, recurring_parent_id = ?11,
                        updated_at = ?12
                     WHERE id = ?1",
                    params![
                        &task_id,
                        &payload.name,
                        &payload.note,
                        payload.status.as_str(),
                        payload.priority.as_str(),
                        due,
                        &payload.project_id,
                        kind,
                        interval,
                        weekdays,
                        &payload.recurring_parent_id,
                        now,
                    ],
                )?;
            } else {
                tx.execute(
                    "INSERT INTO tasks (
                        id, name, note, status, priority, due_date, project_id,
                        recurrence_kind, recurrence_interval, recurrence_weekdays,
                        recurring_parent_id, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        &task_id,
                        &payload.name,
                        &payload.note,
                        payload.status.as_str(),
                        payload.priority.as_str(),
                        due,
                        &payload.project_id,
                        kind,
                        interval,
                        weekdays,
                        &payload.recurring_parent_id,
                        now,
                        now,
                    ],
                )?;
            }

            sync_task_tags(&tx, &task_id, &payload.tags)?;

            // Parent write-back, same transaction as the child save.
            if payload.update_parent_recurrence {
                if let Some(parent_id) = &payload.recurring_parent_id {
                    tx.execute(
                        "UPDATE tasks SET
                            recurrence_kind = ?2, recurrence_interval = ?3,
                            recurrence_weekdays = ?4, updated_at = ?5
                         WHERE id = ?1",
                        params![parent_id, kind, interval, weekdays, now],
                    )?;
                }
            }

            let task = get_task_internal(&tx, &task_id)?
                .ok_or_else(|| anyhow!("task row vanished mid-save"))?;

            tx.commit()?;
            Ok(task)
        })
    }

    /// Delete a task.
    ///
    /// Deleting a recurring parent orphans its generated instances: their
    /// `recurring_parent_id` back-references are cleared in the same
    /// transaction. It never cascades to the instances themselves.
    pub fn remove_task(&self, task_id: &str) -> Result<()> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "UPDATE tasks SET recurring_parent_id = NULL, updated_at = ?2
                 WHERE recurring_parent_id = ?1",
                params![task_id, now],
            )?;

            let deleted = tx.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
            if deleted == 0 {
                return Err(anyhow::Error::new(StoreError::not_found(format!(
                    "task {task_id}"
                ))));
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Generate due instances for every recurring parent.
    ///
    /// A parent holds its next due date; for each occurrence at or before
    /// `today` an instance is spawned due on that date and the parent's due
    /// date rolls forward by the rule. Only tasks without a back-reference
    /// are scanned, which keeps the hierarchy one level deep. Returns the
    /// newly created instances.
    pub fn generate_due_instances(&self, today: NaiveDate) -> Result<Vec<Task>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let mut parents = {
                let mut stmt = tx.prepare(
                    "SELECT * FROM tasks
                     WHERE recurrence_kind IS NOT NULL
                       AND recurring_parent_id IS NULL
                       AND due_date IS NOT NULL
                       AND due_date <= ?1
                     ORDER BY due_date",
                )?;
                let rows = stmt
                    .query_map(params![today.to_string()], parse_task_row)?
                    .collect::<std::result::Result<Vec<Task>, _>>()?;
                rows
            };

            let mut created = Vec::new();
            for parent in &mut parents {
                parent.tags = load_task_tags(&tx, &parent.id)?;
                let rec = match &parent.recurrence {
                    Some(rec) => rec.clone(),
                    None => continue,
                };
                let mut due = match parent.due_date {
                    Some(due) => due,
                    None => continue,
                };

                // Catch up on every missed occurrence.
                while due <= today {
                    let child = spawn_instance(parent, due);
                    insert_task_row(&tx, &child)?;
                    created.push(child);
                    due = match rec.next_occurrence(due) {
                        Some(next) => next,
                        None => break,
                    };
                }

                tx.execute(
                    "UPDATE tasks SET due_date = ?2, updated_at = ?3 WHERE id = ?1",
                    params![&parent.id, due.to_string(), now_ms()],
                )?;
            }

            tx.commit()?;
            Ok(created)
        })
    }
}
