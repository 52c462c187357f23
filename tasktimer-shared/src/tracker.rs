/// Tracker facade
///
/// [`TaskTracker`] bundles the three repositories over one injected storage adapter.
/// It is constructed once at start-up and shared behind an `Arc`; there are no
/// global instances.
///
/// Subtask operations here are owner-checked: the parent task is resolved through
/// [`TaskRepository::get_task`] before a subtask is read or written, so a user can
/// only reach subtasks of their own tasks. Callers that already hold an owned task
/// can use [`TaskTracker::subtasks`] directly.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tasktimer_shared::models::subtask::CreateSubtask;
/// use tasktimer_shared::models::task::CreateTask;
/// use tasktimer_shared::storage::local::LocalStore;
/// use tasktimer_shared::tracker::TaskTracker;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let tracker = TaskTracker::new(Arc::new(LocalStore::in_memory()));
///
/// let task = tracker.tasks().create_task("u1", CreateTask::titled("Write report")).await?;
/// tracker.create_subtask(&task.id, "u1", CreateSubtask::with_text("Outline")).await?;
///
/// // Another user cannot see the subtasks
/// assert!(tracker.list_subtasks(&task.id, "u2").await.is_err());
/// # Ok(())
/// # }
/// ```

use crate::error::{TrackerError, TrackerResult};
use crate::models::subtask::{CreateSubtask, MoveDirection, Subtask, UpdateSubtask};
use crate::repository::{InterruptionRepository, SubtaskRepository, TaskRepository};
use crate::storage::StorageAdapter;
use std::sync::Arc;
use tracing::debug;

/// Repositories sharing one storage adapter
#[derive(Clone)]
pub struct TaskTracker {
    store: Arc<dyn StorageAdapter>,
    tasks: TaskRepository,
    interruptions: InterruptionRepository,
}

impl TaskTracker {
    /// Builds the repositories over `store`
    pub fn new(store: Arc<dyn StorageAdapter>) -> Self {
        let tasks = TaskRepository::new(store.clone());
        let interruptions = InterruptionRepository::new(store.clone(), tasks.clone());

        debug!(backend = store.backend_name(), "Task tracker constructed");

        Self {
            store,
            tasks,
            interruptions,
        }
    }

    /// Underlying storage adapter
    pub fn store(&self) -> &Arc<dyn StorageAdapter> {
        &self.store
    }

    pub fn tasks(&self) -> &TaskRepository {
        &self.tasks
    }

    /// Subtask repository without ownership checks
    pub fn subtasks(&self) -> &SubtaskRepository {
        self.tasks.subtasks()
    }

    pub fn interruptions(&self) -> &InterruptionRepository {
        &self.interruptions
    }

    /// Resolves a subtask whose parent task the user owns
    ///
    /// A subtask under someone else's task is reported as not found.
    async fn owned_subtask(&self, id: &str, user_id: &str) -> TrackerResult<Subtask> {
        let subtask = self.subtasks().get_subtask(id).await?;

        match self.tasks.get_task(&subtask.task_id, user_id).await {
            Ok(_) => Ok(subtask),
            Err(e) if e.is_not_found() => Err(TrackerError::not_found("subtask", id)),
            Err(e) => Err(e),
        }
    }

    /// Lists the subtasks of an owned task
    pub async fn list_subtasks(&self, task_id: &str, user_id: &str) -> TrackerResult<Vec<Subtask>> {
        self.tasks.get_task(task_id, user_id).await?;
        self.subtasks().list_subtasks(task_id).await
    }

    /// Appends a subtask to an owned task
    pub async fn create_subtask(&self, task_id: &str, user_id: &str, data: CreateSubtask) -> TrackerResult<Subtask> {
        self.tasks.get_task(task_id, user_id).await?;
        self.subtasks().create_subtask(task_id, data).await
    }

    pub async fn update_subtask(&self, id: &str, user_id: &str, patch: UpdateSubtask) -> TrackerResult<Subtask> {
        self.owned_subtask(id, user_id).await?;
        self.subtasks().update_subtask(id, patch).await
    }

    /// Deletes a subtask of an owned task
    ///
    /// A missing subtask reports success, like [`SubtaskRepository::delete_subtask`];
    /// a subtask under someone else's task is left alone and also reports success.
    pub async fn delete_subtask(&self, id: &str, user_id: &str) -> TrackerResult<bool> {
        match self.owned_subtask(id, user_id).await {
            Ok(_) => self.subtasks().delete_subtask(id).await,
            Err(e) if e.is_not_found() => {
                debug!(subtask_id = %id, "Subtask absent or not owned, nothing to delete");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn toggle_subtask(&self, id: &str, user_id: &str) -> TrackerResult<Subtask> {
        self.owned_subtask(id, user_id).await?;
        self.subtasks().toggle_completion(id).await
    }

    pub async fn move_subtask(&self, id: &str, user_id: &str, direction: MoveDirection) -> TrackerResult<bool> {
        self.owned_subtask(id, user_id).await?;
        self.subtasks().move_subtask(id, direction).await
    }

    /// Reorders the subtasks of an owned task
    pub async fn reorder_subtasks(&self, task_id: &str, user_id: &str, ordered_ids: &[String]) -> TrackerResult<bool> {
        self.tasks.get_task(task_id, user_id).await?;
        self.subtasks().reorder_subtasks(task_id, ordered_ids).await
    }
}
