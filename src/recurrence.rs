//! Recurrence schedule math and instance generation.
//!
//! A recurring parent task holds its next due date plus a [`Recurrence`]
//! rule. When the date comes up, the store spawns a child instance due on
//! that date and rolls the parent's due date forward with
//! [`Recurrence::next_occurrence`]. Children never recur further.

use crate::types::{Recurrence, RecurrenceKind, Task, TaskStatus};
use chrono::{Datelike, Days, Months, NaiveDate};
use uuid::Uuid;

impl Recurrence {
    /// Next occurrence strictly after `after`.
    ///
    /// Monthly and yearly rules clamp to the end of shorter months (Jan 31 ->
    /// Feb 28, Feb 29 -> Feb 28 on non-leap years). Returns `None` only on
    /// date overflow at the far end of chrono's range.
    pub fn next_occurrence(&self, after: NaiveDate) -> Option<NaiveDate> {
        let interval = self.interval.max(1);
        match self.kind {
            RecurrenceKind::Daily => after.checked_add_days(Days::new(interval as u64)),
            RecurrenceKind::Weekly => {
                if self.weekdays.is_empty() {
                    return after.checked_add_days(Days::new(7 * interval as u64));
                }
                let mut days: Vec<u32> = self
                    .weekdays
                    .iter()
                    .map(|w| w.num_days_from_monday())
                    .collect();
                days.sort_unstable();
                days.dedup();

                let current = after.weekday().num_days_from_monday();
                // A later selected day in the same week wins; otherwise jump
                // `interval` weeks ahead and take the earliest selected day.
                if let Some(&day) = days.iter().find(|&&day| day > current) {
                    return after.checked_add_days(Days::new((day - current) as u64));
                }
                let ahead = 7 * interval as u64 - current as u64 + days[0] as u64;
                after.checked_add_days(Days::new(ahead))
            }
            RecurrenceKind::Monthly => after.checked_add_months(Months::new(interval)),
            RecurrenceKind::Yearly => after.checked_add_months(Months::new(interval * 12)),
        }
    }
}

/// Build a child instance of a recurring parent, due on `due`.
///
/// The child copies the parent's editable fields, including a copy of the
/// recurrence rule so the task modal can display and propose edits to it.
/// Its `recurring_parent_id` back-reference marks it as a generated instance;
/// the store never scans instances for further generation.
pub fn spawn_instance(parent: &Task, due: NaiveDate) -> Task {
    let now = crate::db::now_ms();
    Task {
        id: Uuid::now_v7().to_string(),
        name: parent.name.clone(),
        note: parent.note.clone(),
        status: TaskStatus::NotStarted,
        priority: parent.priority,
        due_date: Some(due),
        project_id: parent.project_id.clone(),
        tags: parent.tags.clone(),
        recurrence: parent.recurrence.clone(),
        recurring_parent_id: Some(parent.id.clone()),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn weekly(interval: u32, weekdays: Vec<Weekday>) -> Recurrence {
        Recurrence {
            kind: RecurrenceKind::Weekly,
            interval,
            weekdays,
        }
    }

    #[test]
    fn daily_advances_by_interval() {
        let rec = Recurrence {
            kind: RecurrenceKind::Daily,
            interval: 3,
            weekdays: vec![],
        };
        assert_eq!(rec.next_occurrence(date(2026, 8, 27)), Some(date(2026, 8, 30)));
    }

    #[test]
    fn weekly_without_weekday_set_jumps_whole_weeks() {
        let rec = weekly(2, vec![]);
        assert_eq!(rec.next_occurrence(date(2026, 8, 27)), Some(date(2026, 9, 10)));
    }

    #[test]
    fn weekly_picks_later_day_in_same_week() {
        // 2026-08-27 is a Thursday; Friday is still ahead this week.
        let rec = weekly(1, vec![Weekday::Mon, Weekday::Fri]);
        assert_eq!(rec.next_occurrence(date(2026, 8, 27)), Some(date(2026, 8, 28)));
    }

    #[test]
    fn weekly_wraps_to_next_interval_week() {
        // From a Friday with {Mon, Fri} every 2 weeks: next is Monday of the
        // week after next.
        let rec = weekly(2, vec![Weekday::Mon, Weekday::Fri]);
        assert_eq!(rec.next_occurrence(date(2026, 8, 28)), Some(date(2026, 9, 7)));
    }

    #[test]
    fn monthly_clamps_to_short_months() {
        let rec = Recurrence {
            kind: RecurrenceKind::Monthly,
            interval: 1,
            weekdays: vec![],
        };
        assert_eq!(rec.next_occurrence(date(2026, 1, 31)), Some(date(2026, 2, 28)));
    }

    #[test]
    fn yearly_handles_leap_day() {
        let rec = Recurrence {
            kind: RecurrenceKind::Yearly,
            interval: 1,
            weekdays: vec![],
        };
        assert_eq!(rec.next_occurrence(date(2024, 2, 29)), Some(date(2025, 2, 28)));
    }

    #[test]
    fn spawned_instance_references_parent_and_does_not_recur_further() {
        let parent = Task {
            id: "parent-1".into(),
            name: "Water plants".into(),
            note: Some("kitchen + balcony".into()),
            status: TaskStatus::NotStarted,
            priority: Priority::High,
            due_date: Some(date(2026, 8, 27)),
            project_id: Some("home".into()),
            tags: vec!["chores".into()],
            recurrence: Some(Recurrence::new(RecurrenceKind::Daily)),
            recurring_parent_id: None,
            created_at: 0,
            updated_at: 0,
        };

        let child = spawn_instance(&parent, date(2026, 8, 27));

        assert_ne!(child.id, parent.id);
        assert_eq!(child.recurring_parent_id.as_deref(), Some("parent-1"));
        assert!(child.is_recurring_instance());
        assert_eq!(child.name, parent.name);
        assert_eq!(child.status, TaskStatus::NotStarted);
        assert_eq!(child.due_date, Some(date(2026, 8, 27)));
        // The rule copy is for display/propagation; instances are never
        // scanned for generation.
        assert_eq!(child.recurrence, parent.recurrence);
    }
}
