// In-memory `Backend` for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{
    ChatMessage, LoginResponse, SendReply, Task, TaskCounts, TaskQuery, TaskStatus, TaskUpdate,
    UserResponse,
};
use super::{ApiError, Backend};
use crate::session::Session;

#[derive(Debug, Default)]
pub struct FakeState {
    pub history: Vec<ChatMessage>,
    pub history_error: Option<ApiError>,
    pub history_calls: usize,
    pub send_result: Option<Result<SendReply, ApiError>>,
    pub sent: Vec<String>,

    pub tasks: Vec<Task>,
    pub counts: TaskCounts,
    pub list_error: Option<ApiError>,
    pub counts_error: Option<ApiError>,
    pub mutation_error: Option<ApiError>,
    pub queries: Vec<TaskQuery>,
    pub created: Vec<String>,
    pub updates: Vec<(String, TaskUpdate)>,
    pub deleted: Vec<String>,
    pub batch_deleted: Vec<Vec<String>>,

    pub login_error: Option<ApiError>,
    pub register_error: Option<ApiError>,
    pub registered: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    pub state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

pub fn session() -> Session {
    Session {
        username: "ada".into(),
        user_id: "u-1".into(),
        token: "tok".into(),
        expires_at: Utc::now() + chrono::Duration::hours(24),
    }
}

pub fn human(id: &str, content: &str, ts: DateTime<Utc>) -> ChatMessage {
    ChatMessage {
        message_id: id.into(),
        content: content.into(),
        is_user: true,
        is_agent: Some(false),
        timestamp: ts,
    }
}

pub fn agent(id: &str, content: &str, ts: DateTime<Utc>) -> ChatMessage {
    ChatMessage {
        message_id: id.into(),
        content: content.into(),
        is_user: false,
        is_agent: Some(true),
        timestamp: ts,
    }
}

pub fn task(id: &str, description: &str, status: TaskStatus) -> Task {
    let now = Utc::now();
    Task {
        task_id: id.into(),
        task_description: description.into(),
        current_status: status,
        user_id: Some("u-1".into()),
        created_at: now,
        modified_at: now,
        previous_status: None,
        last_status_change_at: None,
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn login(&self, username: &str, _password: &str) -> Result<LoginResponse, ApiError> {
        self.with(|s| match s.login_error.clone() {
            Some(e) => Err(e),
            None => Ok(LoginResponse {
                access_token: format!("tok-{username}"),
                token_type: "bearer".into(),
                username: username.into(),
                user_id: "u-1".into(),
            }),
        })
    }

    async fn register(&self, username: &str, _password: &str) -> Result<UserResponse, ApiError> {
        self.with(|s| match s.register_error.clone() {
            Some(e) => Err(e),
            None => {
                s.registered.push(username.into());
                Ok(UserResponse {
                    username: username.into(),
                    user_id: "u-2".into(),
                    is_verified: false,
                })
            }
        })
    }

    async fn list_tasks(&self, _session: &Session, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.with(|s| {
            s.queries.push(query.clone());
            if let Some(e) = s.list_error.clone() {
                return Err(e);
            }
            Ok(s.tasks
                .iter()
                .filter(|t| query.status.map_or(true, |st| t.current_status == st))
                .cloned()
                .collect())
        })
    }

    async fn task_counts(
        &self,
        _session: &Session,
        _target_date: Option<chrono::NaiveDate>,
    ) -> Result<TaskCounts, ApiError> {
        self.with(|s| match s.counts_error.clone() {
            Some(e) => Err(e),
            None => Ok(s.counts),
        })
    }

    async fn create_task(&self, _session: &Session, description: &str) -> Result<Task, ApiError> {
        self.with(|s| {
            if let Some(e) = s.mutation_error.clone() {
                return Err(e);
            }
            s.created.push(description.into());
            let t = task(&format!("t-{}", s.tasks.len() + 1), description, TaskStatus::Active);
            s.tasks.push(t.clone());
            Ok(t)
        })
    }

    async fn update_task(
        &self,
        _session: &Session,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<Task, ApiError> {
        self.with(|s| {
            if let Some(e) = s.mutation_error.clone() {
                return Err(e);
            }
            s.updates.push((task_id.into(), update.clone()));
            let t = s
                .tasks
                .iter_mut()
                .find(|t| t.task_id == task_id)
                .ok_or(ApiError::Status {
                    status: 404,
                    detail: "Task not found".into(),
                })?;
            if let Some(d) = &update.task_description {
                t.task_description = d.clone();
            }
            if let Some(st) = update.current_status {
                t.previous_status = Some(t.current_status);
                t.current_status = st;
            }
            Ok(t.clone())
        })
    }

    async fn delete_task(&self, _session: &Session, task_id: &str) -> Result<(), ApiError> {
        self.with(|s| {
            if let Some(e) = s.mutation_error.clone() {
                return Err(e);
            }
            s.deleted.push(task_id.into());
            s.tasks.retain(|t| t.task_id != task_id);
            Ok(())
        })
    }

    async fn delete_tasks(&self, _session: &Session, task_ids: &[String]) -> Result<(), ApiError> {
        self.with(|s| {
            if let Some(e) = s.mutation_error.clone() {
                return Err(e);
            }
            s.batch_deleted.push(task_ids.to_vec());
            s.tasks.retain(|t| !task_ids.contains(&t.task_id));
            Ok(())
        })
    }

    async fn chat_history(&self, _session: &Session) -> Result<Vec<ChatMessage>, ApiError> {
        self.with(|s| {
            s.history_calls += 1;
            match s.history_error.clone() {
                Some(e) => Err(e),
                None => Ok(s.history.clone()),
            }
        })
    }

    async fn send_chat(&self, _session: &Session, message: &str) -> Result<SendReply, ApiError> {
        self.with(|s| {
            s.sent.push(message.into());
            s.send_result.clone().unwrap_or(Ok(SendReply::Inline {
                agent_response: None,
                message_id: None,
            }))
        })
    }
}
