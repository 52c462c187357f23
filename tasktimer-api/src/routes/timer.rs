/// Timer endpoints
///
/// Each user has one timer session, created on first use and loaded with the
/// stored current task.
///
/// # Endpoints
///
/// - `GET  /v1/timer` - Current snapshot
/// - `POST /v1/timer/start` - Start ticking (422 without a current task)
/// - `POST /v1/timer/stop` - Stop and save
///
/// # Response
///
/// ```json
/// { "task_id": "...", "seconds": 42, "running": true }
/// ```

use crate::{app::AppState, error::ApiResult, middleware::identity::Identity};
use axum::{extract::State, Extension, Json};
use tasktimer_shared::timer::TimerSnapshot;

pub async fn get_timer(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<TimerSnapshot>> {
    let session = state.timers.session_for(&identity.user_id).await;
    Ok(Json(session.snapshot().await))
}

pub async fn start_timer(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<TimerSnapshot>> {
    let session = state.timers.session_for(&identity.user_id).await;
    Ok(Json(session.start().await?))
}

pub async fn stop_timer(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<TimerSnapshot>> {
    let session = state.timers.session_for(&identity.user_id).await;
    Ok(Json(session.stop().await?))
}
