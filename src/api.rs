//! HTTP routing layer.
//!
//! Every `/tasks` route takes an [`AuthUser`], so a missing or bad token is
//! rejected with 401 before the handler body runs.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::access::TaskService;
use crate::auth::{AuthResponse, Authenticator, LoginRequest, RegisterRequest};
use crate::error::{AuthError, TaskError};
use crate::task::{NewTask, Task, TaskPatch, UserId};

#[derive(Clone)]
pub struct AppState {
    pub tasks: TaskService,
    pub auth: Arc<Authenticator>,
}

impl AppState {
    pub fn new(tasks: TaskService, auth: Authenticator) -> Self {
        Self {
            tasks,
            auth: Arc::new(auth),
        }
    }
}

/// Body of every response that is not a payload: errors and confirmations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = MessageBody {
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        let status = match &err {
            TaskError::Validation(_) => StatusCode::BAD_REQUEST,
            TaskError::Unauthorized => StatusCode::UNAUTHORIZED,
            TaskError::NotFound => StatusCode::NOT_FOUND,
            TaskError::Store(store) => {
                tracing::error!(error = %store, "task store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match &err {
            AuthError::MissingToken | AuthError::InvalidToken | AuthError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::MissingField(_) | AuthError::UserExists => StatusCode::BAD_REQUEST,
            AuthError::Store(store) => {
                tracing::error!(error = %store, "user store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let user = state.auth.verify(token).await.inspect_err(|err| {
            tracing::debug!(error = %err, "bearer token rejected");
        })?;
        Ok(AuthUser(user))
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", put(update_task).delete(delete_task))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let Json(request) = body?;
    let response = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.auth.login(request).await?))
}

async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.tasks.list_by_owner(user).await?))
}

async fn create_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(draft) = body?;
    let task = state.tasks.create(user, draft).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Json(patch) = body?;
    Ok(Json(state.tasks.update(user, &id, patch).await?))
}

async fn delete_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>, ApiError> {
    let message = state.tasks.delete(user, &id).await?;
    Ok(Json(MessageBody {
        message: message.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskError::Validation("Task title is required".into()), StatusCode::BAD_REQUEST)]
    #[case(TaskError::Unauthorized, StatusCode::UNAUTHORIZED)]
    #[case(TaskError::NotFound, StatusCode::NOT_FOUND)]
    #[case(
        TaskError::Store(crate::error::StoreError::Io(std::io::Error::other("disk full"))),
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    fn task_errors_map_to_status(#[case] err: TaskError, #[case] expected: StatusCode) {
        let message = err.to_string();
        let api: ApiError = err.into();
        assert_eq!(api.status, expected);
        assert_eq!(api.message, message);
    }

    #[rstest]
    #[case(AuthError::MissingToken, StatusCode::UNAUTHORIZED)]
    #[case(AuthError::InvalidCredentials, StatusCode::UNAUTHORIZED)]
    #[case(AuthError::UserExists, StatusCode::BAD_REQUEST)]
    #[case(AuthError::MissingField("an email"), StatusCode::BAD_REQUEST)]
    fn auth_errors_map_to_status(#[case] err: AuthError, #[case] expected: StatusCode) {
        let api: ApiError = err.into();
        assert_eq!(api.status, expected);
    }
}
