use super::{decode, decode_all, encode, encode_patch, next_position, not_found_as, position_order, require_text};
use crate::error::{TrackerError, TrackerResult};
use crate::models::subtask::{CreateSubtask, MoveDirection, Subtask, UpdateSubtask};
use crate::storage::{Collection, Filter, StorageAdapter};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const COLLECTION: Collection = Collection::Subtasks;

/// Subtask CRUD and ordering, scoped to a parent task
///
/// This repository does not check task ownership: callers resolve the parent task
/// through an owner-checked path first (see [`TaskTracker`](crate::tracker::TaskTracker)).
#[derive(Clone)]
pub struct SubtaskRepository {
    store: Arc<dyn StorageAdapter>,
}

impl SubtaskRepository {
    /// Creates a repository over the given store
    pub fn new(store: Arc<dyn StorageAdapter>) -> Self {
        Self { store }
    }

    /// Lists a task's subtasks by position, then creation time
    pub async fn list_subtasks(&self, task_id: &str) -> TrackerResult<Vec<Subtask>> {
        let records = self
            .store
            .query(COLLECTION, &[Filter::eq("task_id", task_id)], &position_order())
            .await?;

        decode_all(self.store.as_ref(), COLLECTION, records)
    }

    /// Fetches a subtask by ID
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::NotFound` if no subtask has that ID.
    pub async fn get_subtask(&self, id: &str) -> TrackerResult<Subtask> {
        match self.store.get_one(COLLECTION, id).await? {
            Some(record) => decode(self.store.as_ref(), COLLECTION, record),
            None => Err(TrackerError::not_found("subtask", id)),
        }
    }

    /// Appends a subtask after the task's last one
    ///
    /// The new position is the largest existing position plus one, or 0 for the
    /// first subtask. A failure reading the siblings fails the call.
    pub async fn create_subtask(&self, task_id: &str, data: CreateSubtask) -> TrackerResult<Subtask> {
        require_text("task_id", task_id)?;
        require_text("text", &data.text)?;

        let siblings = self
            .store
            .query(COLLECTION, &[Filter::eq("task_id", task_id)], &[])
            .await?;

        let subtask = Subtask::new(task_id, data, next_position(&siblings));
        let record = encode(self.store.as_ref(), COLLECTION, &subtask)?;
        let stored = self.store.insert(COLLECTION, record).await?;

        info!(
            subtask_id = %subtask.id,
            task_id = %task_id,
            position = ?subtask.position,
            "Subtask created"
        );

        decode(self.store.as_ref(), COLLECTION, stored)
    }

    /// Applies a patch to a subtask
    ///
    /// # Errors
    ///
    /// - `TrackerError::Validation` if the patch carries blank text
    /// - `TrackerError::NotFound` if the subtask does not exist
    pub async fn update_subtask(&self, id: &str, mut patch: UpdateSubtask) -> TrackerResult<Subtask> {
        if let Some(text) = patch.text.as_mut() {
            require_text("text", text)?;
            *text = text.trim().to_string();
        }

        let record = encode_patch(self.store.as_ref(), COLLECTION, &patch)?;
        let updated = self
            .store
            .update(COLLECTION, id, record)
            .await
            .map_err(not_found_as("subtask", id))?;

        decode(self.store.as_ref(), COLLECTION, updated)
    }

    /// Deletes a subtask; deleting a missing subtask also succeeds
    pub async fn delete_subtask(&self, id: &str) -> TrackerResult<bool> {
        if !self.store.remove(COLLECTION, id).await? {
            debug!(subtask_id = %id, "Subtask already absent");
        }
        Ok(true)
    }

    /// Deletes every subtask of a task, returning how many were removed
    pub async fn delete_for_task(&self, task_id: &str) -> TrackerResult<usize> {
        let removed = self
            .store
            .remove_matching(COLLECTION, &[Filter::eq("task_id", task_id)])
            .await?;

        debug!(task_id = %task_id, removed, "Subtasks deleted with parent");
        Ok(removed)
    }

    /// Flips the `completed` flag
    pub async fn toggle_completion(&self, id: &str) -> TrackerResult<Subtask> {
        let subtask = self.get_subtask(id).await?;

        self.update_subtask(
            id,
            UpdateSubtask {
                completed: Some(!subtask.completed),
                ..Default::default()
            },
        )
        .await
    }

    /// Moves a subtask one step up or down among its siblings
    ///
    /// Returns `false` without writing when the subtask is already first (up) or
    /// last (down). Otherwise siblings are renumbered densely in their current
    /// order with the two entries swapped; all writes are attempted before the first
    /// failure, if any, is reported.
    pub async fn move_subtask(&self, id: &str, direction: MoveDirection) -> TrackerResult<bool> {
        let subtask = self.get_subtask(id).await?;
        let mut siblings = self.list_subtasks(&subtask.task_id).await?;

        let Some(index) = siblings.iter().position(|s| s.id == subtask.id) else {
            return Err(TrackerError::not_found("subtask", id));
        };

        let Some(target) = direction.target(index, siblings.len()) else {
            debug!(subtask_id = %id, ?direction, "Subtask already at the edge");
            return Ok(false);
        };

        siblings.swap(index, target);
        self.write_positions(&siblings).await?;

        debug!(
            subtask_id = %id,
            from = index,
            to = target,
            "Subtask moved"
        );
        Ok(true)
    }

    /// Assigns `position = index` following `ordered_ids`
    ///
    /// IDs that do not belong to the task are skipped. Individual write failures
    /// are logged and the remaining writes still happen.
    pub async fn reorder_subtasks(&self, task_id: &str, ordered_ids: &[String]) -> TrackerResult<bool> {
        let current: HashMap<String, Option<i64>> = self
            .list_subtasks(task_id)
            .await?
            .into_iter()
            .map(|s| (s.id, s.position))
            .collect();

        let writes = ordered_ids
            .iter()
            .enumerate()
            .filter(|(index, id)| {
                current
                    .get(id.as_str())
                    .is_some_and(|&position| position != Some(*index as i64))
            })
            .map(|(index, id)| async move { (id, self.set_position(id, index as i64).await) });

        for (id, result) in join_all(writes).await {
            if let Err(e) = result {
                warn!(subtask_id = %id, task_id = %task_id, error = %e, "Failed to reorder subtask");
            }
        }

        Ok(true)
    }

    /// Writes `position = index` for every entry whose stored position differs
    ///
    /// Entries without a stored position are always written.
    async fn write_positions(&self, ordered: &[Subtask]) -> TrackerResult<()> {
        let writes = ordered
            .iter()
            .enumerate()
            .filter(|(index, s)| s.position != Some(*index as i64))
            .map(|(index, s)| self.set_position(&s.id, index as i64));

        let mut first_error = None;
        for result in join_all(writes).await {
            if let Err(e) = result {
                warn!(error = %e, "Failed to write subtask position");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn set_position(&self, id: &str, position: i64) -> TrackerResult<Subtask> {
        self.update_subtask(
            id,
            UpdateSubtask {
                position: Some(position),
                ..Default::default()
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::blob::{BlobStore, MemoryBlobStore};
    use crate::storage::local::{BucketKeys, LocalStore};
    use serde_json::json;

    fn repository() -> SubtaskRepository {
        SubtaskRepository::new(Arc::new(LocalStore::in_memory()))
    }

    async fn positions(repo: &SubtaskRepository, task_id: &str) -> Vec<(String, Option<i64>)> {
        repo.list_subtasks(task_id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.text, s.position))
            .collect()
    }

    #[tokio::test]
    async fn test_create_appends_positions() {
        let repo = repository();

        let first = repo.create_subtask("t1", CreateSubtask::with_text("a")).await.unwrap();
        let second = repo.create_subtask("t1", CreateSubtask::with_text("b")).await.unwrap();
        let other = repo.create_subtask("t2", CreateSubtask::with_text("x")).await.unwrap();

        assert_eq!(first.position, Some(0));
        assert_eq!(second.position, Some(1));
        assert_eq!(other.position, Some(0));
    }

    #[tokio::test]
    async fn test_create_requires_text_and_task() {
        let repo = repository();

        let err = repo.create_subtask("t1", CreateSubtask::with_text(" ")).await.unwrap_err();
        assert!(err.is_validation());

        let err = repo.create_subtask("", CreateSubtask::with_text("a")).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_move_renumbers_sparse_positions() {
        let repo = repository();
        let a = repo.create_subtask("t1", CreateSubtask::with_text("a")).await.unwrap();
        let b = repo.create_subtask("t1", CreateSubtask::with_text("b")).await.unwrap();
        repo.create_subtask("t1", CreateSubtask::with_text("c")).await.unwrap();

        // Leave a gap: a=0, b=5, c=2 -> order a, c, b
        repo.set_position(&b.id, 5).await.unwrap();

        assert!(repo.move_subtask(&b.id, MoveDirection::Up).await.unwrap());
        assert_eq!(
            positions(&repo, "t1").await,
            vec![("a".to_string(), Some(0)), ("b".to_string(), Some(1)), ("c".to_string(), Some(2))]
        );

        assert!(!repo.move_subtask(&a.id, MoveDirection::Up).await.unwrap());
    }

    async fn seeded(rows: serde_json::Value) -> SubtaskRepository {
        let blobs = MemoryBlobStore::new();
        blobs
            .write(&BucketKeys::default().subtasks, rows.to_string())
            .await
            .unwrap();
        SubtaskRepository::new(Arc::new(LocalStore::new(blobs, BucketKeys::default())))
    }

    fn row(id: &str, position: Option<serde_json::Value>, created_at: &str) -> serde_json::Value {
        let mut row = json!({
            "id": id,
            "task_id": "t1",
            "text": id,
            "created_at": created_at,
            "updated_at": created_at
        });
        if let Some(position) = position {
            row["position"] = position;
        }
        row
    }

    #[tokio::test]
    async fn test_rows_without_position_sort_last() {
        let repo = seeded(json!([
            row("b", Some(json!(null)), "2025-01-01T00:00:00Z"),
            row("c", None, "2025-01-01T00:00:01Z"),
            row("a", Some(json!(0)), "2025-01-01T00:00:02Z"),
        ]))
        .await;

        assert_eq!(
            positions(&repo, "t1").await,
            vec![("a".to_string(), Some(0)), ("b".to_string(), None), ("c".to_string(), None)]
        );
    }

    #[tokio::test]
    async fn test_move_writes_missing_positions() {
        let repo = seeded(json!([
            row("a", Some(json!(0)), "2025-01-01T00:00:00Z"),
            row("b", None, "2025-01-01T00:00:01Z"),
        ]))
        .await;

        assert!(repo.move_subtask("b", MoveDirection::Up).await.unwrap());
        assert_eq!(
            positions(&repo, "t1").await,
            vec![("b".to_string(), Some(0)), ("a".to_string(), Some(1))]
        );
    }

    #[tokio::test]
    async fn test_reorder_writes_missing_positions() {
        let repo = seeded(json!([
            row("a", None, "2025-01-01T00:00:00Z"),
            row("b", Some(json!(null)), "2025-01-01T00:00:01Z"),
        ]))
        .await;

        let order = vec!["a".to_string(), "b".to_string()];
        assert!(repo.reorder_subtasks("t1", &order).await.unwrap());
        assert_eq!(
            positions(&repo, "t1").await,
            vec![("a".to_string(), Some(0)), ("b".to_string(), Some(1))]
        );
    }

    #[tokio::test]
    async fn test_toggle_missing_is_not_found() {
        let repo = repository();
        let err = repo.toggle_completion("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let repo = repository();
        let s = repo.create_subtask("t1", CreateSubtask::with_text("a")).await.unwrap();

        assert!(repo.delete_subtask(&s.id).await.unwrap());
        assert!(repo.delete_subtask(&s.id).await.unwrap());
        assert!(repo.list_subtasks("t1").await.unwrap().is_empty());
    }
}
