/// Common test utilities for API integration tests
///
/// This module provides shared infrastructure for integration tests:
/// - A router over an in-memory local store
/// - Optional auth with a fixed test secret
/// - JSON request helpers driving the router in-process

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tasktimer_api::app::{build_router, AppState};
use tasktimer_api::config::Config;
use tasktimer_shared::storage::local::LocalStore;
use tasktimer_shared::tracker::TaskTracker;
use tower::Service as _;

pub const TEST_SECRET: &str = "test-secret-key-at-least-32-bytes-long";

/// Test context containing the router and its state
pub struct TestContext {
    pub app: axum::Router,
    pub state: AppState,
}

impl TestContext {
    /// Router without auth: every request is anonymous
    pub fn new() -> Self {
        Self::with_vars(&[])
    }

    /// Router with bearer tokens and the auth routes enabled
    pub fn with_auth() -> Self {
        Self::with_vars(&[("AUTH_JWT_SECRET", TEST_SECRET)])
    }

    fn with_vars(vars: &[(&str, &str)]) -> Self {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = Config::from_vars(|key| vars.get(key).cloned()).unwrap();

        let tracker = TaskTracker::new(Arc::new(LocalStore::in_memory()));
        let state = AppState::new(tracker, config).unwrap();
        let app = build_router(state.clone());

        Self { app, state }
    }

    /// Sends a request and returns the status and parsed JSON body
    pub async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().call(request).await.unwrap();
        let status = response.status();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send("GET", uri, None, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, None, Some(body)).await
    }

    /// Creates a task as the anonymous user and returns its ID
    pub async fn create_task(&self, title: &str) -> String {
        let (status, body) = self.post("/v1/tasks", serde_json::json!({ "title": title })).await;
        assert_eq!(status, StatusCode::CREATED, "create task failed: {}", body);
        body["id"].as_str().unwrap().to_string()
    }

    /// Signs up and returns the access token
    pub async fn sign_up(&self, email: &str) -> String {
        let (status, body) = self
            .post(
                "/v1/auth/signup",
                serde_json::json!({ "email": email, "password": "correct horse" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "sign up failed: {}", body);
        body["access_token"].as_str().unwrap().to_string()
    }
}
