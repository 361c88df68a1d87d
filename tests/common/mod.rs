//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use taskmate::access::TaskService;
use taskmate::api::{router, AppState};
use taskmate::auth::{Authenticator, RegisterRequest, TokenSigner, UserDirectory};
use taskmate::store::InMemoryTaskStore;

pub fn test_state() -> AppState {
    AppState::new(
        TaskService::new(Arc::new(InMemoryTaskStore::new())),
        Authenticator::new(
            UserDirectory::in_memory(),
            TokenSigner::new("test-secret", Duration::from_secs(3600)),
        ),
    )
}

/// Registers a user directly through the auth gate and returns its token.
pub async fn token_for(state: &AppState, name: &str) -> String {
    state
        .auth
        .register(RegisterRequest {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password: "correct horse".to_string(),
        })
        .await
        .expect("registration should succeed")
        .token
}

/// Sends one request through the router and returns status and JSON body.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let body = body.map(|json| json.to_string());
    send_raw(app, method, uri, token, body.as_deref()).await
}

/// Like [`send`], but with the body passed through verbatim as JSON.
pub async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(text) => builder
            .header("content-type", "application/json")
            .body(Body::from(text.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub fn app(state: &AppState) -> Router {
    router(state.clone())
}
