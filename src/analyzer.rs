//! Task-name heuristic analyzer.
//!
//! Maps a free-text task title to a small suggestion set (due-date candidate,
//! priority keyword). Pure and synchronous: it runs on every keystroke in the
//! task modal, so matching is bounded pattern work only, with no I/O and no
//! unbounded backtracking (regex-lite).

use crate::types::Priority;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use regex_lite::Regex;
use std::sync::OnceLock;

/// Suggestions derived from a task title.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Suggestions {
    /// Candidate due date, relative to the `today` passed to [`analyze`].
    pub due_date: Option<NaiveDate>,
    /// Candidate priority from keyword matching.
    pub priority: Option<Priority>,
    /// The title fragments that triggered suggestions, in match order.
    pub matched: Vec<String>,
}

impl Suggestions {
    pub fn is_empty(&self) -> bool {
        self.due_date.is_none() && self.priority.is_none()
    }
}

fn re_in_days() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bin (\d{1,3}) days?\b").unwrap())
}

fn re_next_week() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bnext week\b").unwrap())
}

fn re_tomorrow() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\btomorrow\b").unwrap())
}

fn re_today() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:today|tonight)\b").unwrap())
}

fn re_weekday() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:on |next )?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
        )
        .unwrap()
    })
}

fn re_priority_high() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:urgent|asap|critical|important|high priority)\b").unwrap())
}

fn re_priority_low() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:low priority|someday|whenever)\b").unwrap())
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name.to_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// The next calendar date strictly after `today` falling on `target`.
fn next_weekday(today: NaiveDate, target: Weekday) -> Option<NaiveDate> {
    let ahead = (target.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
    let ahead = if ahead == 0 { 7 } else { ahead };
    today.checked_add_days(Days::new(ahead as u64))
}

/// Analyze a task title against the given reference date.
///
/// Pure: identical inputs yield identical output and the title is never
/// mutated. The first matching date phrase wins, most specific first.
pub fn analyze(title: &str, today: NaiveDate) -> Suggestions {
    let mut suggestions = Suggestions::default();

    if let Some(caps) = re_in_days().captures(title) {
        if let Ok(n) = caps[1].parse::<u64>() {
            suggestions.due_date = today.checked_add_days(Days::new(n));
            suggestions.matched.push(caps[0].to_string());
        }
    } else if let Some(m) = re_next_week().find(title) {
        suggestions.due_date = today.checked_add_days(Days::new(7));
        suggestions.matched.push(m.as_str().to_string());
    } else if let Some(m) = re_tomorrow().find(title) {
        suggestions.due_date = today.checked_add_days(Days::new(1));
        suggestions.matched.push(m.as_str().to_string());
    } else if let Some(m) = re_today().find(title) {
        suggestions.due_date = Some(today);
        suggestions.matched.push(m.as_str().to_string());
    } else if let Some(caps) = re_weekday().captures(title) {
        if let Some(target) = weekday_from_name(&caps[1]) {
            suggestions.due_date = next_weekday(today, target);
            suggestions.matched.push(caps[0].trim().to_string());
        }
    }

    if let Some(m) = re_priority_high().find(title) {
        suggestions.priority = Some(Priority::High);
        suggestions.matched.push(m.as_str().to_string());
    } else if let Some(m) = re_priority_low().find(title) {
        suggestions.priority = Some(Priority::Low);
        suggestions.matched.push(m.as_str().to_string());
    }

    suggestions
}
