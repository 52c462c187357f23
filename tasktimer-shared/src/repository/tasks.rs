use super::{decode, decode_all, encode, encode_patch, next_position, not_found_as, position_order, require_text};
use super::SubtaskRepository;
use crate::error::{TrackerError, TrackerResult};
use crate::models::task::{CreateTask, Task, TaskStatus, TaskWithSubtasks, UpdateTask};
use crate::storage::{Collection, Filter, Sort, StorageAdapter};
use futures::future::{join_all, try_join_all};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const COLLECTION: Collection = Collection::Tasks;

fn owner(user_id: &str) -> Filter {
    Filter::eq("user_id", user_id)
}

/// Task CRUD, ordering and current-task selection, scoped to a user
#[derive(Clone)]
pub struct TaskRepository {
    store: Arc<dyn StorageAdapter>,
    subtasks: SubtaskRepository,
}

impl TaskRepository {
    /// Creates a repository over the given store
    pub fn new(store: Arc<dyn StorageAdapter>) -> Self {
        let subtasks = SubtaskRepository::new(store.clone());
        Self { store, subtasks }
    }

    /// Subtask repository sharing this repository's store
    pub fn subtasks(&self) -> &SubtaskRepository {
        &self.subtasks
    }

    /// Lists the user's tasks by position (absent last), then creation time
    pub async fn list_tasks(&self, user_id: &str) -> TrackerResult<Vec<Task>> {
        let records = self
            .store
            .query(COLLECTION, &[owner(user_id)], &position_order())
            .await?;

        decode_all(self.store.as_ref(), COLLECTION, records)
    }

    /// Lists the user's tasks with the given status, in list order
    pub async fn list_tasks_by_status(&self, user_id: &str, status: TaskStatus) -> TrackerResult<Vec<Task>> {
        let filters = [owner(user_id), Filter::eq("status", status.as_str())];
        let records = self
            .store
            .query(COLLECTION, &filters, &position_order())
            .await?;

        decode_all(self.store.as_ref(), COLLECTION, records)
    }

    /// Lists the user's tasks, each with its subtasks
    ///
    /// Subtask lists are fetched concurrently. Any failure fails the whole call so
    /// that an export is never silently incomplete.
    pub async fn list_tasks_with_subtasks(&self, user_id: &str) -> TrackerResult<Vec<TaskWithSubtasks>> {
        let tasks = self.list_tasks(user_id).await?;

        let subtask_lists =
            try_join_all(tasks.iter().map(|task| self.subtasks.list_subtasks(&task.id))).await?;

        Ok(tasks
            .into_iter()
            .zip(subtask_lists)
            .map(|(task, subtasks)| TaskWithSubtasks { task, subtasks })
            .collect())
    }

    /// Creates a task at the end of the user's list
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Validation` if the title is blank.
    pub async fn create_task(&self, user_id: &str, data: CreateTask) -> TrackerResult<Task> {
        require_text("title", &data.title)?;

        let existing = self.store.query(COLLECTION, &[owner(user_id)], &[]).await?;
        let task = Task::new(user_id, data, next_position(&existing));

        let record = encode(self.store.as_ref(), COLLECTION, &task)?;
        let stored = self.store.insert(COLLECTION, record).await?;

        info!(
            task_id = %task.id,
            user_id = %user_id,
            position = ?task.position,
            "Task created"
        );

        decode(self.store.as_ref(), COLLECTION, stored)
    }

    /// Fetches a task owned by the user
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::NotFound` if the task does not exist or belongs to
    /// someone else.
    pub async fn get_task(&self, id: &str, user_id: &str) -> TrackerResult<Task> {
        self.find_owned(id, user_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("task", id))
    }

    async fn find_owned(&self, id: &str, user_id: &str) -> TrackerResult<Option<Task>> {
        let Some(record) = self.store.get_one(COLLECTION, id).await? else {
            return Ok(None);
        };

        let task: Task = decode(self.store.as_ref(), COLLECTION, record)?;
        Ok(Some(task).filter(|t| t.user_id == user_id))
    }

    /// Applies a patch to a task owned by the user
    ///
    /// The current flag can only be cleared here; use [`set_current_task`] to
    /// select a task. Completing a task through a patch also clears the flag.
    ///
    /// [`set_current_task`]: TaskRepository::set_current_task
    ///
    /// # Errors
    ///
    /// - `TrackerError::Validation` for a blank title, a negative elapsed time or
    ///   an attempt to set `is_current`
    /// - `TrackerError::NotFound` if the task is absent or not owned
    pub async fn update_task(&self, id: &str, user_id: &str, mut patch: UpdateTask) -> TrackerResult<Task> {
        if let Some(title) = patch.title.as_mut() {
            require_text("title", title)?;
            *title = title.trim().to_string();
        }

        if patch.elapsed_time.is_some_and(|secs| secs < 0) {
            return Err(TrackerError::validation("elapsed_time", "must not be negative"));
        }

        if patch.is_current == Some(true) {
            return Err(TrackerError::validation(
                "is_current",
                "select the current task explicitly",
            ));
        }

        if patch.status == Some(TaskStatus::Completed) {
            patch.is_current = Some(false);
        }

        self.get_task(id, user_id).await?;
        self.write(id, &patch).await
    }

    async fn write(&self, id: &str, patch: &UpdateTask) -> TrackerResult<Task> {
        let record = encode_patch(self.store.as_ref(), COLLECTION, patch)?;
        let updated = self
            .store
            .update(COLLECTION, id, record)
            .await
            .map_err(not_found_as("task", id))?;

        decode(self.store.as_ref(), COLLECTION, updated)
    }

    /// Deletes a task and its subtasks
    ///
    /// A task that is absent or owned by someone else is reported as deleted
    /// without touching storage.
    pub async fn delete_task(&self, id: &str, user_id: &str) -> TrackerResult<bool> {
        if self.find_owned(id, user_id).await?.is_none() {
            debug!(task_id = %id, user_id = %user_id, "Task absent, nothing to delete");
            return Ok(true);
        }

        let subtasks = self.subtasks.delete_for_task(id).await?;
        self.store.remove(COLLECTION, id).await?;

        info!(task_id = %id, subtasks, "Task deleted");
        Ok(true)
    }

    /// Makes a task the user's current task
    ///
    /// Every other current task of the user is cleared first. Failures while
    /// clearing are logged and ignored; setting the target is authoritative.
    pub async fn set_current_task(&self, id: &str, user_id: &str) -> TrackerResult<Task> {
        self.get_task(id, user_id).await?;

        let previous = self
            .store
            .query(COLLECTION, &[owner(user_id), Filter::eq("is_current", true)], &[])
            .await;

        match previous {
            Ok(records) => {
                let clear = UpdateTask {
                    is_current: Some(false),
                    ..Default::default()
                };

                for record in records {
                    let Some(previous_id) = record.get("id").and_then(|v| v.as_str()) else {
                        continue;
                    };
                    if previous_id == id {
                        continue;
                    }

                    if let Err(e) = self.write(previous_id, &clear).await {
                        warn!(task_id = %previous_id, error = %e, "Failed to clear previous current task");
                    }
                }
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to look up previous current task");
            }
        }

        let task = self
            .write(
                id,
                &UpdateTask {
                    is_current: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        info!(task_id = %id, user_id = %user_id, "Current task set");
        Ok(task)
    }

    /// Returns the user's current task with its subtasks
    ///
    /// A failure fetching the subtasks yields an empty subtask list.
    pub async fn get_current_task(&self, user_id: &str) -> TrackerResult<Option<TaskWithSubtasks>> {
        let records = self
            .store
            .query(
                COLLECTION,
                &[owner(user_id), Filter::eq("is_current", true)],
                &[Sort::desc("updated_at")],
            )
            .await?;

        let Some(record) = records.into_iter().next() else {
            return Ok(None);
        };

        let task: Task = decode(self.store.as_ref(), COLLECTION, record)?;

        let subtasks = match self.subtasks.list_subtasks(&task.id).await {
            Ok(subtasks) => subtasks,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Failed to load subtasks of current task");
                Vec::new()
            }
        };

        Ok(Some(TaskWithSubtasks { task, subtasks }))
    }

    /// Stores the timer value of a task, rounded to whole seconds
    ///
    /// Negative, NaN or infinite input is ignored and returns `None`.
    pub async fn update_elapsed_time(&self, id: &str, user_id: &str, seconds: f64) -> TrackerResult<Option<Task>> {
        if !seconds.is_finite() || seconds < 0.0 {
            warn!(task_id = %id, seconds, "Ignoring invalid elapsed time");
            return Ok(None);
        }

        let patch = UpdateTask {
            elapsed_time: Some(seconds.round() as i64),
            ..Default::default()
        };

        self.update_task(id, user_id, patch).await.map(Some)
    }

    /// Assigns `position = index` following `ordered_ids`
    ///
    /// IDs the user does not own are skipped. Writes are independent: a failed
    /// write is logged and the others still happen.
    pub async fn reorder_tasks(&self, user_id: &str, ordered_ids: &[String]) -> TrackerResult<bool> {
        let current: HashMap<String, Option<i64>> = self
            .store
            .query(COLLECTION, &[owner(user_id)], &[])
            .await?
            .into_iter()
            .filter_map(|record| {
                let id = record.get("id")?.as_str()?.to_string();
                let position = record.get("position").and_then(|v| v.as_i64());
                Some((id, position))
            })
            .collect();

        let writes = ordered_ids
            .iter()
            .enumerate()
            .filter(|(index, id)| {
                current
                    .get(id.as_str())
                    .is_some_and(|&position| position != Some(*index as i64))
            })
            .map(|(index, id)| async move {
                let patch = UpdateTask {
                    position: Some(Some(index as i64)),
                    ..Default::default()
                };
                (id, self.write(id, &patch).await)
            });

        let mut updated = 0;
        for (id, result) in join_all(writes).await {
            match result {
                Ok(_) => updated += 1,
                Err(e) => warn!(task_id = %id, error = %e, "Failed to update task position"),
            }
        }

        debug!(user_id = %user_id, updated, "Tasks reordered");
        Ok(true)
    }

    /// Marks a task completed and clears its current flag in one write
    pub async fn complete_task(&self, id: &str, user_id: &str) -> TrackerResult<Task> {
        let patch = UpdateTask {
            status: Some(TaskStatus::Completed),
            is_current: Some(false),
            ..Default::default()
        };

        let task = self.update_task(id, user_id, patch).await?;
        info!(task_id = %id, user_id = %user_id, "Task completed");
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::subtask::CreateSubtask;
    use crate::storage::local::LocalStore;
    use crate::storage::testing::FlakyStore;

    fn repository() -> TaskRepository {
        TaskRepository::new(Arc::new(LocalStore::in_memory()))
    }

    fn flaky() -> (Arc<FlakyStore>, TaskRepository) {
        let store = Arc::new(FlakyStore::new());
        let repo = TaskRepository::new(store.clone());
        (store, repo)
    }

    #[tokio::test]
    async fn test_create_assigns_next_position_per_user() {
        let repo = repository();

        let a = repo.create_task("u1", CreateTask::titled("A")).await.unwrap();
        let b = repo.create_task("u1", CreateTask::titled("B")).await.unwrap();
        let c = repo.create_task("u2", CreateTask::titled("C")).await.unwrap();

        assert_eq!(a.position, Some(0));
        assert_eq!(b.position, Some(1));
        assert_eq!(c.position, Some(0));
    }

    #[tokio::test]
    async fn test_create_rejects_blank_title() {
        let repo = repository();
        let err = repo.create_task("u1", CreateTask::titled("   ")).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_other_users_task_is_not_found() {
        let repo = repository();
        let task = repo.create_task("u1", CreateTask::titled("A")).await.unwrap();

        assert!(repo.get_task(&task.id, "u2").await.unwrap_err().is_not_found());

        let patch = UpdateTask {
            title: Some("hijacked".to_string()),
            ..Default::default()
        };
        assert!(repo.update_task(&task.id, "u2", patch).await.unwrap_err().is_not_found());

        // Deleting someone else's task reports success and leaves it in place
        assert!(repo.delete_task(&task.id, "u2").await.unwrap());
        assert!(repo.get_task(&task.id, "u1").await.is_ok());
    }

    #[tokio::test]
    async fn test_update_validates_patch() {
        let repo = repository();
        let task = repo.create_task("u1", CreateTask::titled("A")).await.unwrap();

        let err = repo
            .update_task(
                &task.id,
                "u1",
                UpdateTask {
                    elapsed_time: Some(-1),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = repo
            .update_task(
                &task.id,
                "u1",
                UpdateTask {
                    is_current: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_elapsed_time_rounding() {
        let repo = repository();
        let task = repo.create_task("u1", CreateTask::titled("A")).await.unwrap();

        assert!(repo.update_elapsed_time(&task.id, "u1", f64::NAN).await.unwrap().is_none());
        assert!(repo
            .update_elapsed_time(&task.id, "u1", f64::INFINITY)
            .await
            .unwrap()
            .is_none());

        let updated = repo.update_elapsed_time(&task.id, "u1", 2.5).await.unwrap().unwrap();
        assert_eq!(updated.elapsed_time, 3);
    }

    #[tokio::test]
    async fn test_complete_clears_current() {
        let repo = repository();
        let task = repo.create_task("u1", CreateTask::titled("A")).await.unwrap();
        repo.set_current_task(&task.id, "u1").await.unwrap();

        let done = repo.complete_task(&task.id, "u1").await.unwrap();
        assert!(done.is_completed());
        assert!(!done.is_current);
        assert!(repo.get_current_task("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_current_survives_failed_clear() {
        let (store, repo) = flaky();
        let a = repo.create_task("u1", CreateTask::titled("A")).await.unwrap();
        let b = repo.create_task("u1", CreateTask::titled("B")).await.unwrap();
        repo.set_current_task(&a.id, "u1").await.unwrap();

        store.fail_updates(Collection::Tasks, Some(&a.id));

        let current = repo.set_current_task(&b.id, "u1").await.unwrap();
        assert_eq!(current.id, b.id);
        assert!(current.is_current);
        // The stale flag stays behind; the newest selection wins on read
        assert!(repo.get_task(&a.id, "u1").await.unwrap().is_current);
    }

    #[tokio::test]
    async fn test_current_task_without_subtasks_on_failure() {
        let (store, repo) = flaky();
        let task = repo.create_task("u1", CreateTask::titled("A")).await.unwrap();
        repo.subtasks()
            .create_subtask(&task.id, CreateSubtask::with_text("step"))
            .await
            .unwrap();
        repo.set_current_task(&task.id, "u1").await.unwrap();

        store.fail_queries(Collection::Subtasks);

        let current = repo.get_current_task("u1").await.unwrap().unwrap();
        assert_eq!(current.task.id, task.id);
        assert!(current.subtasks.is_empty());
    }

    #[tokio::test]
    async fn test_reorder_continues_past_failed_write() {
        let (store, repo) = flaky();
        let a = repo.create_task("u1", CreateTask::titled("A")).await.unwrap();
        let b = repo.create_task("u1", CreateTask::titled("B")).await.unwrap();
        let c = repo.create_task("u1", CreateTask::titled("C")).await.unwrap();

        store.fail_updates(Collection::Tasks, Some(&b.id));

        let order = vec![c.id.clone(), b.id.clone(), a.id.clone()];
        assert!(repo.reorder_tasks("u1", &order).await.unwrap());

        assert_eq!(repo.get_task(&c.id, "u1").await.unwrap().position, Some(0));
        assert_eq!(repo.get_task(&b.id, "u1").await.unwrap().position, Some(1));
        assert_eq!(repo.get_task(&a.id, "u1").await.unwrap().position, Some(2));

        let order = vec![b.id.clone(), a.id.clone(), c.id.clone()];
        assert!(repo.reorder_tasks("u1", &order).await.unwrap());

        assert_eq!(repo.get_task(&b.id, "u1").await.unwrap().position, Some(1));
        assert_eq!(repo.get_task(&a.id, "u1").await.unwrap().position, Some(1));
        assert_eq!(repo.get_task(&c.id, "u1").await.unwrap().position, Some(2));
    }

    #[tokio::test]
    async fn test_completing_by_patch_clears_current() {
        let repo = repository();
        let task = repo.create_task("u1", CreateTask::titled("A")).await.unwrap();
        repo.set_current_task(&task.id, "u1").await.unwrap();

        let patch = UpdateTask {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        let done = repo.update_task(&task.id, "u1", patch).await.unwrap();
        assert!(done.is_completed());
        assert!(!done.is_current);
    }
}
