// Messages between the TUI task and the app loop.
//
// UserCommand flows TUI -> app; UiUpdate flows app -> TUI. Both sides only
// ever see owned snapshots, never shared state.

use chrono::{DateTime, Utc};

use crate::api::models::TaskStatus;
use crate::chat::{Author, ChatStatus, Entry, EntryState};
use crate::tasks::TaskSnapshot;

/// Top-level screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Login,
    Planner,
    Tasks,
}

impl View {
    pub fn label(self) -> &'static str {
        match self {
            View::Login => "Login",
            View::Planner => "Planner",
            View::Tasks => "Tasks",
        }
    }

    /// Next authenticated view for tab cycling.
    pub fn next(self) -> View {
        match self {
            View::Planner => View::Tasks,
            View::Tasks => View::Planner,
            View::Login => View::Login,
        }
    }
}

/// Commands issued by the TUI in response to user input.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Login {
        username: String,
        password: String,
    },
    Register {
        username: String,
        password: String,
        confirm: String,
    },
    Logout,
    SendChat(String),
    ReloadChat,
    SwitchView(View),
    SetTaskFilter(TaskStatus),
    ShiftDate(i64),
    Today,
    CreateTask(String),
    EditTask {
        task_id: String,
        description: String,
    },
    ChangeTaskStatus {
        task_id: String,
        status: TaskStatus,
    },
    DeleteTask(String),
    DeleteTasks(Vec<String>),
    RefreshTasks,
    Quit,
}

/// One rendered transcript row.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptLine {
    pub author: Author,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Not yet confirmed by the backend.
    pub pending: bool,
    /// Local notice (timeout fallback or send error).
    pub notice: bool,
}

impl From<&Entry> for TranscriptLine {
    fn from(entry: &Entry) -> Self {
        TranscriptLine {
            author: entry.author,
            content: entry.content.clone(),
            timestamp: entry.timestamp,
            pending: entry.state == EntryState::Provisional,
            notice: entry.state == EntryState::Synthetic,
        }
    }
}

/// Updates pushed from the app loop to the TUI.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    /// A session is active for this user.
    SessionStarted { username: String },
    /// The session ended. `reason` is set for forced logouts.
    LoggedOut { reason: Option<String> },
    View(View),
    AuthError(String),
    AuthNotice(String),
    Transcript(Vec<TranscriptLine>),
    ChatStatus(ChatStatus),
    Tasks(Box<TaskSnapshot>),
}
