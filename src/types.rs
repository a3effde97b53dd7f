//! Core types for the tasknest engine.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    /// Parse a status string. Unrecognized values fall back to `NotStarted`.
    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => TaskStatus::InProgress,
            "done" => TaskStatus::Done,
            _ => TaskStatus::NotStarted,
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Parse a priority string ("high", "medium", "low").
    /// Returns `Medium` for unrecognized values.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// How often a recurring task repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceKind::Daily => "daily",
            RecurrenceKind::Weekly => "weekly",
            RecurrenceKind::Monthly => "monthly",
            RecurrenceKind::Yearly => "yearly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(RecurrenceKind::Daily),
            "weekly" => Some(RecurrenceKind::Weekly),
            "monthly" => Some(RecurrenceKind::Monthly),
            "yearly" => Some(RecurrenceKind::Yearly),
            _ => None,
        }
    }
}

/// Recurrence configuration on a parent task.
///
/// `weekdays` narrows a weekly recurrence to specific days; it is empty for
/// every other kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub kind: RecurrenceKind,
    /// Repeat every `interval` days/weeks/months/years. Must be >= 1.
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weekdays: Vec<Weekday>,
}

impl Recurrence {
    pub fn new(kind: RecurrenceKind) -> Self {
        Self {
            kind,
            interval: 1,
            weekdays: Vec::new(),
        }
    }
}

/// A single recurrence field edit, as proposed from the task modal.
///
/// The editing session applies the same change to the local parent snapshot
/// and the pending child payload in one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "field", content = "value")]
pub enum RecurrenceField {
    Kind(RecurrenceKind),
    Interval(u32),
    Weekdays(Vec<Weekday>),
}

impl RecurrenceField {
    /// Apply this edit to a recurrence slot, creating a default daily rule
    /// first if the slot is empty.
    pub fn apply_to(&self, slot: &mut Option<Recurrence>) {
        let rec = slot.get_or_insert_with(|| Recurrence::new(RecurrenceKind::Daily));
        match self {
            RecurrenceField::Kind(kind) => {
                rec.kind = *kind;
                if *kind != RecurrenceKind::Weekly {
                    rec.weekdays.clear();
                }
            }
            RecurrenceField::Interval(interval) => rec.interval = *interval,
            RecurrenceField::Weekdays(days) => rec.weekdays = days.clone(),
        }
    }
}

/// A task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub note: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub project_id: Option<String>,

    /// Tag names. Order is irrelevant; duplicates are tolerated here and
    /// collapsed by the store's junction table.
    pub tags: Vec<String>,

    pub recurrence: Option<Recurrence>,
    /// Set on generated instances: the recurring task that spawned this one.
    /// Weak reference; the parent may have been deleted since.
    pub recurring_parent_id: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// True if this task is a generated instance of a recurring parent.
    pub fn is_recurring_instance(&self) -> bool {
        self.recurring_parent_id.is_some()
    }
}

/// A project grouping tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub area_id: Option<String>,
    pub tags: Vec<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The full field set sent to `save_task`.
///
/// An explicit structure rather than a partial patch: optional fields are
/// genuinely optional task attributes, not "unchanged" markers. Validated at
/// the persistence boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    /// `None` creates a new task; `Some` updates (or creates with) that id.
    pub id: Option<String>,
    pub name: String,
    pub note: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub project_id: Option<String>,
    /// Duplicates pass through this layer unchanged.
    pub tags: Vec<String>,
    pub recurrence: Option<Recurrence>,
    pub recurring_parent_id: Option<String>,

    /// Transient save instruction, never persisted as a column: when set, the
    /// store applies this payload's recurrence fields to the task named by
    /// `recurring_parent_id` in the same logical operation as the child save.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub update_parent_recurrence: bool,
}

impl TaskPayload {
    /// Build a draft payload from an existing task.
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: Some(task.id.clone()),
            name: task.name.clone(),
            note: task.note.clone(),
            status: task.status,
            priority: task.priority,
            due_date: task.due_date,
            project_id: task.project_id.clone(),
            tags: task.tags.clone(),
            recurrence: task.recurrence.clone(),
            recurring_parent_id: task.recurring_parent_id.clone(),
            update_parent_recurrence: false,
        }
    }

    /// Start a payload for a brand-new task with the given name.
    pub fn new_task(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            note: None,
            status: TaskStatus::NotStarted,
            priority: Priority::Medium,
            due_date: None,
            project_id: None,
            tags: Vec::new(),
            recurrence: None,
            recurring_parent_id: None,
            update_parent_recurrence: false,
        }
    }
}
