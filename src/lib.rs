//! tasknest: the recurrence/hierarchy core of a personal task manager.
//!
//! The [`session`] module is the heart of the crate: an editing-session state
//! machine that relates a recurring parent task to its generated child
//! instances and reconciles recurrence edits between them. The [`analyzer`]
//! module suggests due dates and priorities from free-text task titles. The
//! [`db`] module is a SQLite implementation of the [`store::TaskStore`]
//! boundary the session talks to.

pub mod analyzer;
pub mod db;
pub mod error;
pub mod logging;
pub mod recurrence;
pub mod session;
pub mod store;
pub mod types;
