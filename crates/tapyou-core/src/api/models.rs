// Wire types exchanged with the TapYou backend.
//
// Field names follow the backend's JSON exactly (snake_case). Server ids are
// UUID strings; the client never parses them, it only compares them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Parse a backend timestamp.
///
/// The backend stores `datetime.utcnow()` values, which serialize without an
/// offset (`2025-03-01T09:30:00.123456`). Values with an offset are accepted
/// too. Naive values are interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn deserialize_opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
    }
}

/// Server ids arrive as strings (UUIDs) or, from older endpoints, integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Response body of `POST /auth/login`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub username: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub user_id: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Request body of `POST /users/`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Response body of `POST /users/`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserResponse {
    pub username: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub user_id: String,
    #[serde(default)]
    pub is_verified: bool,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// The fixed set of task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Completed,
    Backlog,
    Pending,
}

impl TaskStatus {
    /// All statuses in display order.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Active,
        TaskStatus::Completed,
        TaskStatus::Backlog,
        TaskStatus::Pending,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
            TaskStatus::Backlog => "backlog",
            TaskStatus::Pending => "pending",
        }
    }

    /// Capitalized label for display.
    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Active => "Active",
            TaskStatus::Completed => "Completed",
            TaskStatus::Backlog => "Backlog",
            TaskStatus::Pending => "Pending",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(TaskStatus::Active),
            "completed" => Ok(TaskStatus::Completed),
            "backlog" => Ok(TaskStatus::Backlog),
            "pending" => Ok(TaskStatus::Pending),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A task record as returned by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Task {
    #[serde(deserialize_with = "deserialize_id")]
    pub task_id: String,
    pub task_description: String,
    pub current_status: TaskStatus,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub user_id: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub previous_status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub last_status_change_at: Option<DateTime<Utc>>,
}

/// Per-status counts for the selected date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TaskCounts {
    #[serde(default)]
    pub active: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub backlog: u32,
    #[serde(default)]
    pub pending: u32,
    #[serde(default)]
    pub total: u32,
}

impl TaskCounts {
    pub fn for_status(&self, status: TaskStatus) -> u32 {
        match status {
            TaskStatus::Active => self.active,
            TaskStatus::Completed => self.completed,
            TaskStatus::Backlog => self.backlog,
            TaskStatus::Pending => self.pending,
        }
    }
}

/// Sortable task fields accepted by the list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    ModifiedAt,
    TaskDescription,
    CurrentStatus,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::ModifiedAt => "modified_at",
            SortField::TaskDescription => "task_description",
            SortField::CurrentStatus => "current_status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Filter, sort and paging options for `GET /tasks/user/{username}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    pub target_date: Option<NaiveDate>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl TaskQuery {
    /// Render as query-string pairs. Unset options are omitted, and zero
    /// limit/offset are treated as unset.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(status) = self.status {
            params.push(("status", status.as_str().to_string()));
        }
        if let Some(date) = self.target_date {
            params.push(("target_date", format_date(date)));
        }
        if let Some(sort_by) = self.sort_by {
            params.push(("sort_by", sort_by.as_str().to_string()));
        }
        if let Some(order) = self.sort_order {
            params.push(("sort_order", order.as_str().to_string()));
        }
        if let Some(limit) = self.limit.filter(|n| *n > 0) {
            params.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset.filter(|n| *n > 0) {
            params.push(("offset", offset.to_string()));
        }
        params
    }
}

/// Dates travel as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskCreate<'a> {
    pub task_description: &'a str,
}

/// Partial update body for `PUT /tasks/{id}`. Absent fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskBatchDelete<'a> {
    pub task_ids: &'a [String],
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatMessage {
    #[serde(deserialize_with = "deserialize_id")]
    pub message_id: String,
    pub content: String,
    pub is_user: bool,
    #[serde(default)]
    pub is_agent: Option<bool>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Agent-authored means not authored by the human.
    pub fn is_agent_authored(&self) -> bool {
        !self.is_user
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSendRequest<'a> {
    pub message: &'a str,
}

/// Response of the chat send endpoint.
///
/// Two backend generations exist: the `/chat/` router answers with the agent
/// text and the stored agent message id, the `/chat_history/messages` router
/// answers with both stored records.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SendReply {
    Records {
        user_message: ChatMessage,
        agent_message: Option<ChatMessage>,
    },
    Inline {
        #[serde(default)]
        agent_response: Option<String>,
        #[serde(default, deserialize_with = "deserialize_opt_id")]
        message_id: Option<String>,
    },
}

impl SendReply {
    /// Server record of the human message, when the backend returned it.
    pub fn stored_user_message(&self) -> Option<&ChatMessage> {
        match self {
            SendReply::Records { user_message, .. } => Some(user_message),
            SendReply::Inline { .. } => None,
        }
    }

    /// Whether the response embeds an immediate agent reply.
    pub fn has_agent_reply(&self) -> bool {
        match self {
            SendReply::Records { agent_message, .. } => agent_message.is_some(),
            SendReply::Inline { agent_response, .. } => {
                agent_response.as_deref().is_some_and(|s| !s.is_empty())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn naive_timestamp_is_treated_as_utc() {
        let ts = parse_timestamp("2025-03-01T09:30:00.123456").unwrap();
        assert_eq!(ts.hour(), 9);
        assert_eq!(ts.minute(), 30);
    }

    #[test]
    fn offset_timestamp_is_normalized() {
        let ts = parse_timestamp("2025-03-01T11:30:00+02:00").unwrap();
        assert_eq!(ts.hour(), 9);
    }

    #[test]
    fn garbage_timestamp_rejected() {
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn task_deserializes_from_backend_json() {
        let json = r#"{
            "task_id": "3f1c8a9e-0000-4000-8000-000000000001",
            "task_description": "Buy milk",
            "current_status": "active",
            "user_id": "9a9a9a9a-0000-4000-8000-000000000002",
            "created_at": "2025-03-01T08:00:00",
            "modified_at": "2025-03-01T08:05:00.5",
            "previous_status": null,
            "last_status_change_at": "2025-03-01T08:00:00",
            "pushed_from_past": false
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.task_description, "Buy milk");
        assert_eq!(task.current_status, TaskStatus::Active);
        assert!(task.previous_status.is_none());
        assert_eq!(task.created_at.day(), 1);
    }

    #[test]
    fn ids_accept_numbers_and_null() {
        let base = |user_id: &str| {
            format!(
                r#"{{"task_id": 12, "task_description": "x", "current_status": "pending",
                    "user_id": {user_id}, "created_at": "2025-03-01T08:00:00",
                    "modified_at": "2025-03-01T08:00:00"}}"#
            )
        };
        let task: Task = serde_json::from_str(&base("42")).unwrap();
        assert_eq!(task.task_id, "12");
        assert_eq!(task.user_id.as_deref(), Some("42"));

        let task: Task = serde_json::from_str(&base(r#""u-1""#)).unwrap();
        assert_eq!(task.user_id.as_deref(), Some("u-1"));

        let task: Task = serde_json::from_str(&base("null")).unwrap();
        assert!(task.user_id.is_none());
    }

    #[test]
    fn counts_default_missing_pending() {
        let counts: TaskCounts =
            serde_json::from_str(r#"{"active":2,"completed":1,"backlog":0,"total":3}"#).unwrap();
        assert_eq!(counts.pending, 0);
        assert_eq!(counts.for_status(TaskStatus::Active), 2);
        assert_eq!(counts.total, 3);
    }

    #[test]
    fn task_status_parses_case_insensitively() {
        assert_eq!("Completed".parse::<TaskStatus>(), Ok(TaskStatus::Completed));
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn query_params_skip_unset_fields() {
        let query = TaskQuery {
            status: Some(TaskStatus::Backlog),
            target_date: NaiveDate::from_ymd_opt(2025, 3, 7),
            ..TaskQuery::default()
        };
        assert_eq!(
            query.to_params(),
            vec![
                ("status", "backlog".to_string()),
                ("target_date", "2025-03-07".to_string()),
            ]
        );
    }

    #[test]
    fn query_params_include_sort_and_paging() {
        let query = TaskQuery {
            sort_by: Some(SortField::ModifiedAt),
            sort_order: Some(SortOrder::Desc),
            limit: Some(50),
            offset: Some(0),
            ..TaskQuery::default()
        };
        let params = query.to_params();
        assert!(params.contains(&("sort_by", "modified_at".to_string())));
        assert!(params.contains(&("sort_order", "desc".to_string())));
        assert!(params.contains(&("limit", "50".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "offset"));
    }

    #[test]
    fn update_body_omits_absent_fields() {
        let body = TaskUpdate {
            current_status: Some(TaskStatus::Completed),
            ..TaskUpdate::default()
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"current_status":"completed"}"#
        );
    }

    #[test]
    fn inline_send_reply_with_agent_text() {
        let reply: SendReply =
            serde_json::from_str(r#"{"agent_response":"Sure!","message_id":"m-2"}"#).unwrap();
        assert!(reply.has_agent_reply());
        assert!(reply.stored_user_message().is_none());
    }

    #[test]
    fn inline_send_reply_without_agent_text() {
        let reply: SendReply = serde_json::from_str(r#"{"agent_response":null}"#).unwrap();
        assert!(!reply.has_agent_reply());
    }

    #[test]
    fn record_send_reply_carries_both_messages() {
        let json = r#"{
            "user_message": {"message_id": 7, "content": "hi", "is_user": true, "is_agent": false, "timestamp": "2025-03-01T09:00:00"},
            "agent_message": {"message_id": 8, "content": "hello", "is_user": false, "is_agent": true, "timestamp": "2025-03-01T09:00:02"}
        }"#;
        let reply: SendReply = serde_json::from_str(json).unwrap();
        assert!(reply.has_agent_reply());
        assert_eq!(reply.stored_user_message().unwrap().message_id, "7");
    }
}
