//! Thin HTTP wrappers over the TaskMate API.
//!
//! Every call returns the decoded body whatever the HTTP status was. A body
//! carrying a `message` field comes back as [`Reply::Message`]; callers decide
//! what to do with it.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::PathBuf;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::auth::{AuthResponse, LoginRequest, RegisterRequest, UserProfile};
use crate::task::{NewTask, Task, TaskId, TaskPatch, TaskStatus};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("session file: {0}")]
    Session(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Data(T),
    Message(String),
}

impl<T: DeserializeOwned> Reply<T> {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return Ok(Reply::Message(message.to_string()));
        }
        serde_json::from_value(value).map(Reply::Data)
    }
}

impl<T> Reply<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Reply::Data(data) => Ok(data),
            Reply::Message(message) => Err(message),
        }
    }
}

/// The persisted login: what a browser would keep in local storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

impl From<AuthResponse> for Session {
    fn from(response: AuthResponse) -> Self {
        Self {
            token: response.token,
            user: response.user,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Option<Session>, ClientError> {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes the session readable by the owner only.
    pub fn save(&self, session: &Session) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(session)?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&self.path)?;
        // `mode` only applies when the file is created.
        #[cfg(unix)]
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        file.write_all(data.as_bytes())?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        tracing::debug!(%status, len = bytes.len(), "api response");
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn call<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Reply<T>, ClientError> {
        Ok(Reply::from_value(self.send(builder).await?)?)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Reply<AuthResponse>, ClientError> {
        let body = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        self.call(self.request(Method::POST, "/auth/register").json(&body))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Reply<AuthResponse>, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.call(self.request(Method::POST, "/auth/login").json(&body))
            .await
    }

    pub async fn fetch_tasks(&self) -> Result<Reply<Vec<Task>>, ClientError> {
        self.call(self.request(Method::GET, "/tasks")).await
    }

    pub async fn create_task(&self, draft: &NewTask) -> Result<Reply<Task>, ClientError> {
        self.call(self.request(Method::POST, "/tasks").json(draft))
            .await
    }

    pub async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Reply<Task>, ClientError> {
        self.call(self.request(Method::PUT, &format!("/tasks/{id}")).json(patch))
            .await
    }

    pub async fn update_task_status(
        &self,
        id: TaskId,
        status: TaskStatus,
    ) -> Result<Reply<Task>, ClientError> {
        self.update_task(id, &TaskPatch::status(status)).await
    }

    /// Returns the server's message, which confirms the deletion or explains
    /// why it failed.
    pub async fn delete_task(&self, id: TaskId) -> Result<String, ClientError> {
        let value = self
            .send(self.request(Method::DELETE, &format!("/tasks/{id}")))
            .await?;
        let body: crate::api::MessageBody = serde_json::from_value(value)?;
        Ok(body.message)
    }
}
