use super::{decode, decode_all, encode, encode_patch, not_found_as, require_text};
use super::TaskRepository;
use crate::error::{TrackerError, TrackerResult};
use crate::models::interruption::{CreateInterruption, Interruption, UpdateInterruption};
use crate::models::task::{CreateTask, Task};
use crate::storage::{Collection, Filter, Sort, StorageAdapter};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

const COLLECTION: Collection = Collection::Interruptions;

/// Interruption CRUD and promotion into main tasks
#[derive(Clone)]
pub struct InterruptionRepository {
    store: Arc<dyn StorageAdapter>,
    tasks: TaskRepository,
}

impl InterruptionRepository {
    /// Creates a repository that promotes into `tasks`
    pub fn new(store: Arc<dyn StorageAdapter>, tasks: TaskRepository) -> Self {
        Self { store, tasks }
    }

    /// Lists the user's interruptions, newest first
    pub async fn list_interruptions(&self, user_id: &str) -> TrackerResult<Vec<Interruption>> {
        let records = self
            .store
            .query(
                COLLECTION,
                &[Filter::eq("user_id", user_id)],
                &[Sort::desc("created_at")],
            )
            .await?;

        decode_all(self.store.as_ref(), COLLECTION, records)
    }

    /// Captures a new interruption
    pub async fn create_interruption(&self, user_id: &str, data: CreateInterruption) -> TrackerResult<Interruption> {
        require_text("title", &data.title)?;

        let interruption = Interruption::new(user_id, data);
        let record = encode(self.store.as_ref(), COLLECTION, &interruption)?;
        let stored = self.store.insert(COLLECTION, record).await?;

        info!(interruption_id = %interruption.id, user_id = %user_id, "Interruption created");
        decode(self.store.as_ref(), COLLECTION, stored)
    }

    async fn find_owned(&self, id: &str, user_id: &str) -> TrackerResult<Option<Interruption>> {
        let Some(record) = self.store.get_one(COLLECTION, id).await? else {
            return Ok(None);
        };

        let interruption: Interruption = decode(self.store.as_ref(), COLLECTION, record)?;
        Ok(Some(interruption).filter(|i| i.user_id == user_id))
    }

    /// Edits the title or notes of an owned interruption
    pub async fn update_interruption(
        &self,
        id: &str,
        user_id: &str,
        mut patch: UpdateInterruption,
    ) -> TrackerResult<Interruption> {
        if let Some(title) = patch.title.as_mut() {
            require_text("title", title)?;
            *title = title.trim().to_string();
        }

        if self.find_owned(id, user_id).await?.is_none() {
            return Err(TrackerError::not_found("interruption", id));
        }

        let record = encode_patch(self.store.as_ref(), COLLECTION, &patch)?;
        let updated = self
            .store
            .update(COLLECTION, id, record)
            .await
            .map_err(not_found_as("interruption", id))?;

        decode(self.store.as_ref(), COLLECTION, updated)
    }

    /// Deletes an owned interruption; absent ones also report success
    pub async fn delete_interruption(&self, id: &str, user_id: &str) -> TrackerResult<bool> {
        if self.find_owned(id, user_id).await?.is_none() {
            debug!(interruption_id = %id, "Interruption absent, nothing to delete");
            return Ok(true);
        }

        self.store.remove(COLLECTION, id).await?;
        Ok(true)
    }

    /// Turns an interruption into a main task
    ///
    /// Returns `None` if the interruption was already promoted. The task is
    /// created first; if latching `added_to_main` then fails, the failure is logged
    /// and the new task is still returned.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::NotFound` if the interruption is absent or not owned.
    pub async fn promote_to_main_task(&self, id: &str, user_id: &str) -> TrackerResult<Option<Task>> {
        let interruption = self
            .find_owned(id, user_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("interruption", id))?;

        if interruption.added_to_main {
            debug!(interruption_id = %id, "Interruption already promoted");
            return Ok(None);
        }

        let task = self
            .tasks
            .create_task(
                user_id,
                CreateTask {
                    title: interruption.title,
                    notes: interruption.notes,
                },
            )
            .await?;

        let mut latch = encode_patch(self.store.as_ref(), COLLECTION, &json!({}))?;
        latch.insert("added_to_main".to_string(), json!(true));

        if let Err(e) = self.store.update(COLLECTION, id, latch).await {
            warn!(
                interruption_id = %id,
                task_id = %task.id,
                error = %e,
                "Task created but interruption could not be marked as promoted"
            );
        }

        info!(interruption_id = %id, task_id = %task.id, "Interruption promoted to main task");
        Ok(Some(task))
    }
}
