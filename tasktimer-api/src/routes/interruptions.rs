/// Interruption endpoints
///
/// # Endpoints
///
/// - `GET    /v1/interruptions` - List interruptions, newest first
/// - `POST   /v1/interruptions` - Capture an interruption
/// - `PATCH  /v1/interruptions/:id` - Edit title or notes
/// - `DELETE /v1/interruptions/:id` - Delete an interruption
/// - `POST   /v1/interruptions/:id/promote` - Turn it into a main task
///
/// # Promote response
///
/// ```json
/// { "task": { "id": "...", "title": "Call back", ... } }
/// ```
///
/// `task` is `null` when the interruption had already been promoted.

use crate::{
    app::AppState,
    error::{validate_request, ApiResult},
    middleware::identity::Identity,
    routes::DeleteResponse,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tasktimer_shared::models::interruption::{CreateInterruption, Interruption, UpdateInterruption};
use tasktimer_shared::models::task::Task;
use validator::Validate;

/// Create interruption request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateInterruptionRequest {
    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: String,

    #[serde(default)]
    pub notes: Option<String>,
}

/// Promote outcome
#[derive(Debug, Serialize, Deserialize)]
pub struct PromoteResponse {
    pub task: Option<Task>,
}

pub async fn list_interruptions(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<Interruption>>> {
    let list = state
        .tracker
        .interruptions()
        .list_interruptions(&identity.user_id)
        .await?;

    Ok(Json(list))
}

pub async fn create_interruption(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateInterruptionRequest>,
) -> ApiResult<(StatusCode, Json<Interruption>)> {
    validate_request(&req)?;

    let interruption = state
        .tracker
        .interruptions()
        .create_interruption(
            &identity.user_id,
            CreateInterruption {
                title: req.title,
                notes: req.notes,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(interruption)))
}

pub async fn update_interruption(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateInterruption>,
) -> ApiResult<Json<Interruption>> {
    let interruption = state
        .tracker
        .interruptions()
        .update_interruption(&id, &identity.user_id, patch)
        .await?;

    Ok(Json(interruption))
}

pub async fn delete_interruption(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted = state
        .tracker
        .interruptions()
        .delete_interruption(&id, &identity.user_id)
        .await?;

    Ok(Json(DeleteResponse { deleted }))
}

pub async fn promote_interruption(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Json<PromoteResponse>> {
    let task = state
        .tracker
        .interruptions()
        .promote_to_main_task(&id, &identity.user_id)
        .await?;

    Ok(Json(PromoteResponse { task }))
}
