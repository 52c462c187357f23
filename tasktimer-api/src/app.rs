/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tasktimer_api::{app::AppState, config::Config};
/// use tasktimer_shared::storage::local::LocalStore;
/// use tasktimer_shared::tracker::TaskTracker;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let tracker = TaskTracker::new(Arc::new(LocalStore::in_memory()));
/// let state = AppState::new(tracker, config)?;
/// let app = tasktimer_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, middleware::identity::identity_layer, routes};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tasktimer_shared::auth::provider::MemoryAuthProvider;
use tasktimer_shared::identity::IdentityResolver;
use tasktimer_shared::timer::TimerRegistry;
use tasktimer_shared::tracker::TaskTracker;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Repositories over the configured storage backend
    pub tracker: TaskTracker,

    /// One timer session per user
    pub timers: Arc<TimerRegistry>,

    /// Auth provider, present when `AUTH_JWT_SECRET` is set
    pub auth: Option<Arc<MemoryAuthProvider>>,

    /// Identity of requests without a bearer token
    pub identity: IdentityResolver,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state
    ///
    /// # Errors
    ///
    /// Returns an error if the configured auth secret is rejected.
    pub fn new(tracker: TaskTracker, config: Config) -> anyhow::Result<Self> {
        let timers = Arc::new(TimerRegistry::new(
            tracker.tasks().clone(),
            config.timer_save_interval_secs,
        ));

        let auth = match &config.auth.jwt_secret {
            Some(secret) => Some(Arc::new(MemoryAuthProvider::new(secret.clone())?)),
            None => None,
        };

        Ok(Self {
            tracker,
            timers,
            auth,
            identity: IdentityResolver::anonymous(),
            config: Arc::new(config),
        })
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                          # Health check (public)
/// └── /v1/                             # API v1 (identity middleware)
///     ├── /auth/signup, /auth/signin   # Only with AUTH_JWT_SECRET
///     ├── /tasks[...]                  # Tasks, current task, export, order
///     ├── /tasks/:id/subtasks[...]     # Subtasks of a task
///     ├── /subtasks/:id[...]           # Single subtask
///     ├── /interruptions[...]          # Interruptions and promotion
///     └── /timer[...]                  # Timer session of the caller
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Identity (`/v1` only)
pub fn build_router(state: AppState) -> Router {
    // Health check (public, no identity)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_routes = Router::new()
        .route("/signup", post(routes::auth::sign_up))
        .route("/signin", post(routes::auth::sign_in));

    let task_routes = Router::new()
        .route("/", get(routes::tasks::list_tasks).post(routes::tasks::create_task))
        .route("/export", get(routes::tasks::export_tasks))
        .route("/current", get(routes::tasks::get_current_task))
        .route("/order", put(routes::tasks::reorder_tasks))
        .route(
            "/:id",
            get(routes::tasks::get_task)
                .patch(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route("/:id/current", post(routes::tasks::set_current_task))
        .route("/:id/elapsed", put(routes::tasks::update_elapsed_time))
        .route("/:id/complete", post(routes::tasks::complete_task))
        .route(
            "/:id/subtasks",
            get(routes::subtasks::list_subtasks).post(routes::subtasks::create_subtask),
        )
        .route("/:id/subtasks/order", put(routes::subtasks::reorder_subtasks));

    let subtask_routes = Router::new()
        .route(
            "/:id",
            axum::routing::patch(routes::subtasks::update_subtask).delete(routes::subtasks::delete_subtask),
        )
        .route("/:id/toggle", post(routes::subtasks::toggle_subtask))
        .route("/:id/move", post(routes::subtasks::move_subtask));

    let interruption_routes = Router::new()
        .route(
            "/",
            get(routes::interruptions::list_interruptions).post(routes::interruptions::create_interruption),
        )
        .route(
            "/:id",
            axum::routing::patch(routes::interruptions::update_interruption)
                .delete(routes::interruptions::delete_interruption),
        )
        .route("/:id/promote", post(routes::interruptions::promote_interruption));

    let timer_routes = Router::new()
        .route("/", get(routes::timer::get_timer))
        .route("/start", post(routes::timer::start_timer))
        .route("/stop", post(routes::timer::stop_timer));

    // Build complete v1 API
    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/tasks", task_routes)
        .nest("/subtasks", subtask_routes)
        .nest("/interruptions", interruption_routes)
        .nest("/timer", timer_routes)
        .layer(axum::middleware::from_fn_with_state(state.clone(), identity_layer));

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|origin| origin == "*") {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    // Combine all routes with middleware stack
    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasktimer_shared::storage::local::LocalStore;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: std::collections::HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned()).unwrap()
    }

    fn tracker() -> TaskTracker {
        TaskTracker::new(Arc::new(LocalStore::in_memory()))
    }

    #[test]
    fn test_auth_is_optional() {
        let state = AppState::new(tracker(), config(&[])).unwrap();
        assert!(state.auth.is_none());
        assert_eq!(state.identity.user_id(), "anonymous");

        let state = AppState::new(
            tracker(),
            config(&[("AUTH_JWT_SECRET", "test-secret-key-at-least-32-bytes-long")]),
        )
        .unwrap();
        assert!(state.auth.is_some());
    }
}
