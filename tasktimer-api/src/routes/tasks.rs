/// Task endpoints
///
/// # Endpoints
///
/// - `GET    /v1/tasks[?status=active|completed]` - List tasks in list order
/// - `POST   /v1/tasks` - Create a task at the end of the list
/// - `GET    /v1/tasks/export` - Every task with its subtasks
/// - `GET    /v1/tasks/current` - Current task with subtasks, or `null`
/// - `PUT    /v1/tasks/order` - Reorder tasks
/// - `GET    /v1/tasks/:id` - Fetch a task
/// - `PATCH  /v1/tasks/:id` - Update a task
/// - `DELETE /v1/tasks/:id` - Delete a task and its subtasks
/// - `POST   /v1/tasks/:id/current` - Select the current task
/// - `PUT    /v1/tasks/:id/elapsed` - Store the timer value
/// - `POST   /v1/tasks/:id/complete` - Complete a task
///
/// Selecting, updating, completing and deleting go through the caller's timer
/// session so a running timer never overwrites a value written here.

use crate::{
    error::{validate_request, ApiResult},
    middleware::identity::Identity,
    routes::{DeleteResponse, ReorderRequest, ReorderResponse},
    app::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use tasktimer_shared::models::task::{CreateTask, Task, TaskStatus, TaskWithSubtasks, UpdateTask};
use validator::Validate;

/// List filter
#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    /// Only tasks with this status
    pub status: Option<TaskStatus>,
}

/// Create task request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: String,

    #[serde(default)]
    pub notes: Option<String>,
}

/// Elapsed time request
#[derive(Debug, Deserialize)]
pub struct ElapsedTimeRequest {
    /// Timer value in seconds; rounded before storing
    pub seconds: f64,
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let tasks = state.tracker.tasks();

    let list = match query.status {
        Some(status) => tasks.list_tasks_by_status(&identity.user_id, status).await?,
        None => tasks.list_tasks(&identity.user_id).await?,
    };

    Ok(Json(list))
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    validate_request(&req)?;

    let task = state
        .tracker
        .tasks()
        .create_task(
            &identity.user_id,
            CreateTask {
                title: req.title,
                notes: req.notes,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(task)))
}

/// Export feed: all tasks, each with its subtasks
pub async fn export_tasks(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<TaskWithSubtasks>>> {
    let export = state
        .tracker
        .tasks()
        .list_tasks_with_subtasks(&identity.user_id)
        .await?;

    tracing::debug!(user_id = %identity.user_id, tasks = export.len(), "Tasks exported");
    Ok(Json(export))
}

pub async fn get_current_task(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Option<TaskWithSubtasks>>> {
    let current = state.tracker.tasks().get_current_task(&identity.user_id).await?;
    Ok(Json(current))
}

pub async fn reorder_tasks(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ReorderRequest>,
) -> ApiResult<Json<ReorderResponse>> {
    validate_request(&req)?;

    let reordered = state
        .tracker
        .tasks()
        .reorder_tasks(&identity.user_id, &req.ids)
        .await?;

    Ok(Json(ReorderResponse { reordered }))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    let task = state.tracker.tasks().get_task(&id, &identity.user_id).await?;
    Ok(Json(task))
}

/// Applies a partial update
///
/// Fields that are absent stay unchanged; `"notes": null` clears the notes.
pub async fn update_task(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateTask>,
) -> ApiResult<Json<Task>> {
    let session = state.timers.session_for(&identity.user_id).await;
    let task = session.update_task(&id, patch).await?;

    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted = state.tracker.tasks().delete_task(&id, &identity.user_id).await?;

    // Drop the timer's hold on a deleted task
    let session = state.timers.session_for(&identity.user_id).await;
    if session.snapshot().await.task_id.as_deref() == Some(id.as_str()) {
        session.load_current().await?;
    }

    Ok(Json(DeleteResponse { deleted }))
}

/// Selects the current task through the caller's timer session
pub async fn set_current_task(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    let session = state.timers.session_for(&identity.user_id).await;
    session.select_task(&id).await?;

    let task = state.tracker.tasks().get_task(&id, &identity.user_id).await?;
    Ok(Json(task))
}

/// Stores a timer value; invalid values are ignored and return `null`
pub async fn update_elapsed_time(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(req): Json<ElapsedTimeRequest>,
) -> ApiResult<Json<Option<Task>>> {
    let session = state.timers.session_for(&identity.user_id).await;
    let task = session.update_elapsed_time(&id, req.seconds).await?;

    Ok(Json(task))
}

/// Completes a task, stopping the timer first if it is timing this task
pub async fn complete_task(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    let session = state.timers.session_for(&identity.user_id).await;

    if session.snapshot().await.task_id.as_deref() == Some(id.as_str()) {
        if let Some(task) = session.complete_current().await? {
            return Ok(Json(task));
        }
    }

    let task = state.tracker.tasks().complete_task(&id, &identity.user_id).await?;
    Ok(Json(task))
}
