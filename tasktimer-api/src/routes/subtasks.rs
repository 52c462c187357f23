/// Subtask endpoints
///
/// Every handler resolves the parent task through the caller's identity, so a
/// subtask under someone else's task answers 404.
///
/// # Endpoints
///
/// - `GET    /v1/tasks/:id/subtasks` - List subtasks by position
/// - `POST   /v1/tasks/:id/subtasks` - Append a subtask
/// - `PUT    /v1/tasks/:id/subtasks/order` - Reorder subtasks
/// - `PATCH  /v1/subtasks/:id` - Update a subtask
/// - `DELETE /v1/subtasks/:id` - Delete a subtask
/// - `POST   /v1/subtasks/:id/toggle` - Flip `completed`
/// - `POST   /v1/subtasks/:id/move` - Move one step up or down

use crate::{
    app::AppState,
    error::{validate_request, ApiResult},
    middleware::identity::Identity,
    routes::{DeleteResponse, ReorderRequest, ReorderResponse},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tasktimer_shared::models::subtask::{CreateSubtask, MoveDirection, Subtask, UpdateSubtask};
use validator::Validate;

/// Create subtask request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubtaskRequest {
    #[validate(length(min = 1, max = 500, message = "Text must be 1-500 characters"))]
    pub text: String,

    #[serde(default)]
    pub notes: Option<String>,
}

/// Move request
#[derive(Debug, Deserialize)]
pub struct MoveSubtaskRequest {
    /// `"up"` or `"down"`
    pub direction: MoveDirection,
}

/// Move outcome; `false` when the subtask was already at the edge
#[derive(Debug, Serialize, Deserialize)]
pub struct MoveSubtaskResponse {
    pub moved: bool,
}

pub async fn list_subtasks(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Vec<Subtask>>> {
    let subtasks = state.tracker.list_subtasks(&task_id, &identity.user_id).await?;
    Ok(Json(subtasks))
}

pub async fn create_subtask(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(task_id): Path<String>,
    Json(req): Json<CreateSubtaskRequest>,
) -> ApiResult<(StatusCode, Json<Subtask>)> {
    validate_request(&req)?;

    let subtask = state
        .tracker
        .create_subtask(
            &task_id,
            &identity.user_id,
            CreateSubtask {
                text: req.text,
                notes: req.notes,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(subtask)))
}

pub async fn reorder_subtasks(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(task_id): Path<String>,
    Json(req): Json<ReorderRequest>,
) -> ApiResult<Json<ReorderResponse>> {
    validate_request(&req)?;

    let reordered = state
        .tracker
        .reorder_subtasks(&task_id, &identity.user_id, &req.ids)
        .await?;

    Ok(Json(ReorderResponse { reordered }))
}

pub async fn update_subtask(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateSubtask>,
) -> ApiResult<Json<Subtask>> {
    let subtask = state.tracker.update_subtask(&id, &identity.user_id, patch).await?;
    Ok(Json(subtask))
}

pub async fn delete_subtask(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted = state.tracker.delete_subtask(&id, &identity.user_id).await?;
    Ok(Json(DeleteResponse { deleted }))
}

pub async fn toggle_subtask(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Json<Subtask>> {
    let subtask = state.tracker.toggle_subtask(&id, &identity.user_id).await?;
    Ok(Json(subtask))
}

pub async fn move_subtask(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(req): Json<MoveSubtaskRequest>,
) -> ApiResult<Json<MoveSubtaskResponse>> {
    let moved = state
        .tracker
        .move_subtask(&id, &identity.user_id, req.direction)
        .await?;

    Ok(Json(MoveSubtaskResponse { moved }))
}
