//! Persistence boundary consumed by the editing session.

use crate::error::StoreResult;
use crate::types::{Task, TaskPayload};
use async_trait::async_trait;

/// The persistence collaborator.
///
/// The editing session only prepares intent; consistency work (applying a
/// parent recurrence write-back atomically with the child save, collapsing
/// duplicate tags) is this layer's responsibility.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Fetch a task by id. Fails with `NotFound` or `Network`.
    async fn fetch_task_by_id(&self, id: &str) -> StoreResult<Task>;

    /// Fetch the known tag names. Callers typically swallow failure into an
    /// empty list.
    async fn fetch_tags(&self) -> StoreResult<Vec<String>>;

    /// Read a boolean feature flag. Unset flags default to enabled.
    async fn get_feature_flag(&self, name: &str) -> StoreResult<bool>;

    /// Create or update a task from the full payload.
    ///
    /// When `payload.update_parent_recurrence` is set, the payload's
    /// recurrence fields are also applied to the task named by
    /// `recurring_parent_id`, in the same logical operation.
    async fn save_task(&self, payload: TaskPayload) -> StoreResult<Task>;

    /// Delete a task. Deleting a recurring parent orphans its generated
    /// instances (their back-references are cleared); it never cascades.
    async fn delete_task(&self, id: &str) -> StoreResult<()>;
}
