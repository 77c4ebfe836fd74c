// Backend access: wire types, the reqwest client, and the `Backend` seam that
// the chat engine and task board are written against.

pub mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod models;

use async_trait::async_trait;

use crate::session::Session;
use models::{
    ChatMessage, LoginResponse, SendReply, Task, TaskCounts, TaskQuery, TaskUpdate, UserResponse,
};

pub use client::{ApiClient, ApiError};

/// Everything the client needs from the TapYou service.
///
/// Authenticated operations take the session explicitly. `ApiClient` is the
/// production implementation; tests substitute in-memory fakes.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError>;

    async fn register(&self, username: &str, password: &str) -> Result<UserResponse, ApiError>;

    async fn list_tasks(&self, session: &Session, query: &TaskQuery) -> Result<Vec<Task>, ApiError>;

    async fn task_counts(
        &self,
        session: &Session,
        target_date: Option<chrono::NaiveDate>,
    ) -> Result<TaskCounts, ApiError>;

    async fn create_task(&self, session: &Session, description: &str) -> Result<Task, ApiError>;

    async fn update_task(
        &self,
        session: &Session,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<Task, ApiError>;

    async fn delete_task(&self, session: &Session, task_id: &str) -> Result<(), ApiError>;

    async fn delete_tasks(&self, session: &Session, task_ids: &[String]) -> Result<(), ApiError>;

    async fn chat_history(&self, session: &Session) -> Result<Vec<ChatMessage>, ApiError>;

    async fn send_chat(&self, session: &Session, message: &str) -> Result<SendReply, ApiError>;
}
