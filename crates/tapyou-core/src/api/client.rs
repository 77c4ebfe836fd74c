// reqwest-backed implementation of the TapYou backend API.
//
// Every authenticated call attaches `Authorization: Bearer <token>` from the
// session passed in. 401/403 responses map to `ApiError::Unauthorized` so the
// app loop can force a logout; other failures carry the backend's `detail`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::models::{
    format_date, ChatMessage, ChatSendRequest, LoginResponse, RegisterRequest, SendReply, Task,
    TaskBatchDelete, TaskCounts, TaskCreate, TaskQuery, TaskUpdate, UserResponse,
};
use super::Backend;
use crate::config::Config;
use crate::session::Session;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The token is missing, expired or rejected (HTTP 401/403).
    #[error("{detail}")]
    Unauthorized { status: u16, detail: String },

    /// Any other non-success status.
    #[error("{detail}")]
    Status { status: u16, detail: String },

    /// The request never produced a response (connect, timeout, ...).
    #[error("network error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// HTTP client for the TapYou service.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    history_path: String,
    send_path: String,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        history_path: &str,
        send_path: &str,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(ApiClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            history_path: history_path.to_string(),
            send_path: send_path.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        ApiClient::new(
            &config.api.base_url,
            config.api.request_timeout(),
            &config.chat.history_path,
            &config.chat.send_path,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        request.header(reqwest::header::AUTHORIZATION, session.bearer())
    }

    /// Send a request and decode a JSON body on success.
    async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        fallback: &str,
    ) -> Result<T, ApiError> {
        let response = request.send().await?;
        let response = check_status(response, fallback).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Send a request whose body (if any) is ignored on success.
    async fn fetch_empty(&self, request: RequestBuilder, fallback: &str) -> Result<(), ApiError> {
        let response = request.send().await?;
        check_status(response, fallback).await?;
        Ok(())
    }
}

/// Map non-success responses to `ApiError`.
async fn check_status(response: Response, fallback: &str) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = extract_detail(&body).unwrap_or_else(|| {
        if fallback.is_empty() {
            format!("API error: {}", status.as_u16())
        } else {
            fallback.to_string()
        }
    });
    debug!(status = status.as_u16(), %detail, "backend returned error status");

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        warn!("Authentication failed or token expired (HTTP {})", status.as_u16());
        return Err(ApiError::Unauthorized {
            status: status.as_u16(),
            detail,
        });
    }
    Err(ApiError::Status {
        status: status.as_u16(),
        detail,
    })
}

/// Pull a human-readable message out of a FastAPI error body.
///
/// `detail` is usually a string; validation errors send a list of objects
/// with a `msg` field, of which the first is used.
pub(crate) fn extract_detail(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    match v.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items
            .first()?
            .get("msg")?
            .as_str()
            .map(|s| s.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let request = self
            .http
            .post(self.url("/auth/login"))
            .form(&[("username", username), ("password", password)]);
        self.fetch_json(request, "Login failed.").await
    }

    async fn register(&self, username: &str, password: &str) -> Result<UserResponse, ApiError> {
        let request = self
            .http
            .post(self.url("/users/"))
            .json(&RegisterRequest { username, password });
        self.fetch_json(request, "Registration failed.").await
    }

    async fn list_tasks(&self, session: &Session, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        let request = self
            .http
            .get(self.url(&format!("/tasks/user/{}", session.username)))
            .query(&query.to_params());
        self.fetch_json(self.authed(request, session), "").await
    }

    async fn task_counts(
        &self,
        session: &Session,
        target_date: Option<NaiveDate>,
    ) -> Result<TaskCounts, ApiError> {
        let mut request = self
            .http
            .get(self.url(&format!("/tasks/user/{}/counts", session.username)));
        if let Some(date) = target_date {
            request = request.query(&[("target_date", format_date(date))]);
        }
        self.fetch_json(self.authed(request, session), "").await
    }

    async fn create_task(&self, session: &Session, description: &str) -> Result<Task, ApiError> {
        let request = self.http.post(self.url("/tasks/")).json(&TaskCreate {
            task_description: description,
        });
        self.fetch_json(self.authed(request, session), "").await
    }

    async fn update_task(
        &self,
        session: &Session,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<Task, ApiError> {
        let request = self
            .http
            .put(self.url(&format!("/tasks/{task_id}")))
            .json(update);
        self.fetch_json(self.authed(request, session), "").await
    }

    async fn delete_task(&self, session: &Session, task_id: &str) -> Result<(), ApiError> {
        let request = self.http.delete(self.url(&format!("/tasks/{task_id}")));
        self.fetch_empty(self.authed(request, session), "").await
    }

    async fn delete_tasks(&self, session: &Session, task_ids: &[String]) -> Result<(), ApiError> {
        let request = self
            .http
            .delete(self.url("/tasks/batch"))
            .json(&TaskBatchDelete { task_ids });
        self.fetch_empty(self.authed(request, session), "").await
    }

    async fn chat_history(&self, session: &Session) -> Result<Vec<ChatMessage>, ApiError> {
        let request = self
            .http
            .get(self.url(&self.history_path))
            .query(&[("user_id", session.user_id.as_str())]);
        self.fetch_json(self.authed(request, session), "").await
    }

    async fn send_chat(&self, session: &Session, message: &str) -> Result<SendReply, ApiError> {
        let request = self
            .http
            .post(self.url(&self.send_path))
            .json(&ChatSendRequest { message });
        self.fetch_json(self.authed(request, session), "").await
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
