// Application orchestrator: owns the session, chat and task board, and runs
// the main event loop that ties the TUI to the backend.

use std::sync::Arc;

use chrono::{Local, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{ApiError, Backend};
use crate::chat::{ChatEvent, ChatOutcome, ChatSession, ChatTimings};
use crate::config::Config;
use crate::protocol::{TranscriptLine, UiUpdate, UserCommand, View};
use crate::session::{Session, SessionStore};
use crate::tasks::TaskBoard;

/// Shown on the login screen after a forced logout.
pub const SESSION_EXPIRED_NOTICE: &str = "Your session has expired. Please log in again.";

pub const MISSING_CREDENTIALS: &str = "Please enter a username and password.";
pub const MISSING_FIELDS: &str = "Please fill in all fields.";
pub const PASSWORD_MISMATCH: &str = "Passwords do not match.";
pub const REGISTERED_NOTICE: &str = "Registration successful! Please log in.";

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// All mutable client state. Owned by the `run` task.
pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub store: SessionStore,
    pub session: Option<Session>,
    pub view: View,
    pub chat: ChatSession,
    pub tasks: TaskBoard,
}

impl AppState {
    pub fn new(
        config: Config,
        backend: Arc<dyn Backend>,
        store: SessionStore,
        chat_tx: mpsc::Sender<ChatEvent>,
    ) -> Self {
        let chat = ChatSession::new(
            Arc::clone(&backend),
            ChatTimings::from(&config.chat),
            chat_tx,
        );
        let tasks = TaskBoard::new(Arc::clone(&backend), config.tasks.clone());
        AppState {
            config,
            backend,
            store,
            session: None,
            view: View::Login,
            chat,
            tasks,
        }
    }

    fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.config.session.ttl_hours))
    }

    /// The active session, unless it has run past its expiry.
    fn live_session(&self) -> Option<&Session> {
        self.session.as_ref().filter(|s| !s.is_expired(Utc::now()))
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the main application event loop.
///
/// Listens on two channels using `tokio::select!`:
/// 1. Chat task reports
/// 2. User commands from the TUI
///
/// Pushes UI updates through `ui_tx` for the TUI render loop.
pub async fn run(
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    mut chat_rx: mpsc::Receiver<ChatEvent>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    match state.store.load(Utc::now()) {
        Some(session) => {
            info!("Restored session for {}", session.username);
            start_session(&mut state, session, &ui_tx).await;
        }
        None => {
            let _ = ui_tx.send(UiUpdate::View(View::Login)).await;
        }
    }

    loop {
        tokio::select! {
            // --- Chat task reports ---
            event = chat_rx.recv() => {
                match event {
                    Some(event) => handle_chat_event(&mut state, event, &ui_tx).await,
                    None => {
                        info!("Chat channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => {
                        handle_user_command(&mut state, cmd, &ui_tx).await;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup
    state.chat.teardown();
    info!("Application event loop exiting");
    Ok(())
}

async fn handle_chat_event(state: &mut AppState, event: ChatEvent, ui_tx: &mpsc::Sender<UiUpdate>) {
    let Some(session) = state.session.as_ref() else {
        debug!("Chat event with no session, discarding");
        return;
    };
    match state.chat.handle_event(session, event) {
        ChatOutcome::Changed => publish_chat(state, ui_tx).await,
        ChatOutcome::Unauthorized => {
            end_session(state, Some(SESSION_EXPIRED_NOTICE.to_string()), ui_tx).await;
        }
        ChatOutcome::Unchanged | ChatOutcome::Stale => {}
    }
}

/// Handle a user command from the TUI.
async fn handle_user_command(
    state: &mut AppState,
    cmd: UserCommand,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    match cmd {
        UserCommand::Login { username, password } => {
            login(state, username.trim(), &password, ui_tx).await;
            return;
        }
        UserCommand::Register {
            username,
            password,
            confirm,
        } => {
            register(state, username.trim(), &password, &confirm, ui_tx).await;
            return;
        }
        UserCommand::Quit => return,
        _ => {}
    }

    if state.session.is_none() {
        debug!("Ignoring {:?} without a session", cmd);
        return;
    }
    if state.live_session().is_none() {
        info!("Session expired");
        end_session(state, Some(SESSION_EXPIRED_NOTICE.to_string()), ui_tx).await;
        return;
    }

    let Some(session) = state.session.clone() else {
        return;
    };

    let task_result = match cmd {
        UserCommand::Logout => {
            info!("Logging out {}", session.username);
            end_session(state, None, ui_tx).await;
            return;
        }
        UserCommand::SendChat(text) => {
            if state.chat.send(&session, &text).is_some() {
                publish_chat(state, ui_tx).await;
            }
            return;
        }
        UserCommand::ReloadChat => {
            state.chat.load(&session);
            publish_chat(state, ui_tx).await;
            return;
        }
        UserCommand::SwitchView(view) => {
            if view == View::Login {
                return;
            }
            state.view = view;
            let _ = ui_tx.send(UiUpdate::View(view)).await;
            if view != View::Tasks {
                return;
            }
            publish_loading(state, ui_tx).await;
            state.tasks.refresh(&session).await
        }
        UserCommand::SetTaskFilter(status) => {
            state.tasks.select_status(status);
            publish_loading(state, ui_tx).await;
            state.tasks.refresh(&session).await
        }
        UserCommand::ShiftDate(days) => {
            let date = state.tasks.shifted_date(days);
            state.tasks.select_date(date);
            publish_loading(state, ui_tx).await;
            state.tasks.refresh(&session).await
        }
        UserCommand::Today => {
            state.tasks.select_date(Local::now().date_naive());
            publish_loading(state, ui_tx).await;
            state.tasks.refresh(&session).await
        }
        UserCommand::CreateTask(description) => {
            publish_loading(state, ui_tx).await;
            state.tasks.create(&session, &description).await
        }
        UserCommand::EditTask {
            task_id,
            description,
        } => {
            publish_loading(state, ui_tx).await;
            state.tasks.edit(&session, &task_id, &description).await
        }
        UserCommand::ChangeTaskStatus { task_id, status } => {
            publish_loading(state, ui_tx).await;
            state.tasks.change_status(&session, &task_id, status).await
        }
        UserCommand::DeleteTask(task_id) => {
            publish_loading(state, ui_tx).await;
            state.tasks.delete(&session, &task_id).await
        }
        UserCommand::DeleteTasks(task_ids) => {
            publish_loading(state, ui_tx).await;
            state.tasks.delete_batch(&session, &task_ids).await
        }
        UserCommand::RefreshTasks => {
            publish_loading(state, ui_tx).await;
            state.tasks.refresh(&session).await
        }
        UserCommand::Login { .. } | UserCommand::Register { .. } | UserCommand::Quit => return,
    };

    after_task_op(state, task_result, ui_tx).await;
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

async fn login(state: &mut AppState, username: &str, password: &str, ui_tx: &mpsc::Sender<UiUpdate>) {
    if username.is_empty() || password.is_empty() {
        let _ = ui_tx.send(UiUpdate::AuthError(MISSING_CREDENTIALS.into())).await;
        return;
    }

    match state.backend.login(username, password).await {
        Ok(response) => {
            let session = Session::from_login(&response, state.session_ttl(), Utc::now());
            if let Err(e) = state.store.save(&session) {
                warn!("Failed to persist session: {}", e);
            }
            info!("Logged in as {}", session.username);
            start_session(state, session, ui_tx).await;
        }
        Err(e) => {
            info!("Login failed: {}", e);
            let _ = ui_tx.send(UiUpdate::AuthError(e.to_string())).await;
        }
    }
}

async fn register(
    state: &mut AppState,
    username: &str,
    password: &str,
    confirm: &str,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    if username.is_empty() || password.is_empty() || confirm.is_empty() {
        let _ = ui_tx.send(UiUpdate::AuthError(MISSING_FIELDS.into())).await;
        return;
    }
    if password != confirm {
        let _ = ui_tx.send(UiUpdate::AuthError(PASSWORD_MISMATCH.into())).await;
        return;
    }

    match state.backend.register(username, password).await {
        Ok(user) => {
            info!("Registered user {}", user.username);
            let _ = ui_tx.send(UiUpdate::AuthNotice(REGISTERED_NOTICE.into())).await;
        }
        Err(e) => {
            info!("Registration failed: {}", e);
            let _ = ui_tx.send(UiUpdate::AuthError(e.to_string())).await;
        }
    }
}

/// Make `session` current and load the planner.
async fn start_session(state: &mut AppState, session: Session, ui_tx: &mpsc::Sender<UiUpdate>) {
    state.chat.teardown();
    state.tasks.reset();
    state.view = View::Planner;

    let _ = ui_tx
        .send(UiUpdate::SessionStarted {
            username: session.username.clone(),
        })
        .await;
    let _ = ui_tx.send(UiUpdate::View(View::Planner)).await;

    state.chat.load(&session);
    publish_loading(state, ui_tx).await;
    let result = state.tasks.refresh(&session).await;
    state.session = Some(session);

    publish_chat(state, ui_tx).await;
    after_task_op(state, result, ui_tx).await;
}

/// Drop the session, stop chat timers and return to the login view.
async fn end_session(state: &mut AppState, reason: Option<String>, ui_tx: &mpsc::Sender<UiUpdate>) {
    if reason.is_some() {
        warn!("Forcing logout");
    }
    state.chat.teardown();
    state.tasks.reset();
    state.session = None;
    state.view = View::Login;
    if let Err(e) = state.store.clear() {
        warn!("Failed to remove session file: {}", e);
    }
    let _ = ui_tx.send(UiUpdate::LoggedOut { reason }).await;
    let _ = ui_tx.send(UiUpdate::View(View::Login)).await;
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

async fn publish_chat(state: &AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    let lines: Vec<TranscriptLine> = state
        .chat
        .transcript()
        .entries()
        .iter()
        .map(TranscriptLine::from)
        .collect();
    let _ = ui_tx.send(UiUpdate::Transcript(lines)).await;
    let _ = ui_tx.send(UiUpdate::ChatStatus(state.chat.status())).await;
}

/// Mark the board busy and publish it before a request goes out.
async fn publish_loading(state: &mut AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    state.tasks.set_loading(true);
    let snapshot = state.tasks.snapshot();
    let _ = ui_tx.send(UiUpdate::Tasks(Box::new(snapshot))).await;
}

/// Publish the board, or force a logout if the backend rejected the session.
async fn after_task_op(
    state: &mut AppState,
    result: Result<(), ApiError>,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    match result {
        Err(e) if e.is_unauthorized() => {
            end_session(state, Some(SESSION_EXPIRED_NOTICE.to_string()), ui_tx).await;
        }
        _ => {
            state.tasks.set_loading(false);
            let snapshot = state.tasks.snapshot();
            let _ = ui_tx.send(UiUpdate::Tasks(Box::new(snapshot))).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{session, task, FakeBackend};
    use crate::api::models::TaskStatus;
    use crate::chat::{Author, ChatStatus};
    use crate::config::parse_config;
    use crate::tasks::TaskSnapshot;
    use std::time::Duration;

    const TEST_CONFIG: &str = r#"
[api]
base_url = "http://localhost:8000"

[chat]
poll_interval_ms = 2000
reply_timeout_secs = 30
refresh_interval_secs = 5
send_recheck_delay_ms = 1000
"#;

    fn temp_store(name: &str) -> SessionStore {
        let dir = std::env::temp_dir().join(format!("tapyou_app_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        SessionStore::new(dir.join("session.json"))
    }

    struct Harness {
        backend: Arc<FakeBackend>,
        store: SessionStore,
        cmd_tx: mpsc::Sender<UserCommand>,
        ui_rx: mpsc::Receiver<UiUpdate>,
        handle: tokio::task::JoinHandle<anyhow::Result<()>>,
    }

    fn spawn_app(backend: Arc<FakeBackend>, store: SessionStore) -> Harness {
        let config = parse_config(TEST_CONFIG).unwrap();
        let (chat_tx, chat_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (ui_tx, ui_rx) = mpsc::channel(256);
        let state = AppState::new(config, backend.clone(), store.clone(), chat_tx);
        let handle = tokio::spawn(run(cmd_rx, chat_rx, ui_tx, state));
        Harness {
            backend,
            store,
            cmd_tx,
            ui_rx,
            handle,
        }
    }

    /// Receive updates until one matches, returning it.
    async fn wait_for(
        ui_rx: &mut mpsc::Receiver<UiUpdate>,
        pred: impl Fn(&UiUpdate) -> bool,
    ) -> UiUpdate {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let update = ui_rx.recv().await.expect("ui channel closed");
                if pred(&update) {
                    return update;
                }
            }
        })
        .await
        .expect("timed out waiting for update")
    }

    async fn quit(h: Harness) {
        h.cmd_tx.send(UserCommand::Quit).await.unwrap();
        let result = h.handle.await.unwrap();
        assert!(result.is_ok());
    }

    async fn logged_in(name: &str) -> Harness {
        let mut h = spawn_app(Arc::new(FakeBackend::new()), temp_store(name));
        h.cmd_tx
            .send(UserCommand::Login {
                username: "ada".into(),
                password: "pw".into(),
            })
            .await
            .unwrap();
        wait_for(&mut h.ui_rx, |u| matches!(u, UiUpdate::SessionStarted { .. })).await;
        h
    }

    #[tokio::test]
    async fn event_loop_handles_quit_command() {
        let mut h = spawn_app(Arc::new(FakeBackend::new()), temp_store("quit"));
        let update = h.ui_rx.recv().await.unwrap();
        assert_eq!(update, UiUpdate::View(View::Login));
        quit(h).await;
    }

    #[tokio::test]
    async fn login_starts_session_and_persists_it() {
        let mut h = logged_in("login").await;
        wait_for(&mut h.ui_rx, |u| *u == UiUpdate::View(View::Planner)).await;
        wait_for(&mut h.ui_rx, |u| matches!(u, UiUpdate::Tasks(_))).await;

        let stored = h.store.load(Utc::now()).expect("session saved");
        assert_eq!(stored.username, "ada");
        assert_eq!(stored.token, "tok-ada");
        quit(h).await;
    }

    #[tokio::test]
    async fn login_failure_shows_detail() {
        let backend = Arc::new(FakeBackend::new());
        backend.with(|s| {
            s.login_error = Some(ApiError::Status {
                status: 401,
                detail: "Incorrect username or password".into(),
            })
        });
        let mut h = spawn_app(backend, temp_store("login_fail"));
        h.cmd_tx
            .send(UserCommand::Login {
                username: "ada".into(),
                password: "bad".into(),
            })
            .await
            .unwrap();
        let update = wait_for(&mut h.ui_rx, |u| matches!(u, UiUpdate::AuthError(_))).await;
        assert_eq!(
            update,
            UiUpdate::AuthError("Incorrect username or password".into())
        );
        assert!(h.store.load(Utc::now()).is_none());
        quit(h).await;
    }

    #[tokio::test]
    async fn blank_login_is_rejected_locally() {
        let mut h = spawn_app(Arc::new(FakeBackend::new()), temp_store("login_blank"));
        h.cmd_tx
            .send(UserCommand::Login {
                username: "  ".into(),
                password: "pw".into(),
            })
            .await
            .unwrap();
        let update = wait_for(&mut h.ui_rx, |u| matches!(u, UiUpdate::AuthError(_))).await;
        assert_eq!(update, UiUpdate::AuthError(MISSING_CREDENTIALS.into()));
        quit(h).await;
    }

    #[tokio::test]
    async fn register_password_mismatch_sends_nothing() {
        let mut h = spawn_app(Arc::new(FakeBackend::new()), temp_store("reg_mismatch"));
        h.cmd_tx
            .send(UserCommand::Register {
                username: "bob".into(),
                password: "one".into(),
                confirm: "two".into(),
            })
            .await
            .unwrap();
        let update = wait_for(&mut h.ui_rx, |u| matches!(u, UiUpdate::AuthError(_))).await;
        assert_eq!(update, UiUpdate::AuthError(PASSWORD_MISMATCH.into()));
        assert!(h.backend.with(|s| s.registered.is_empty()));
        quit(h).await;
    }

    #[tokio::test]
    async fn register_success_shows_notice() {
        let mut h = spawn_app(Arc::new(FakeBackend::new()), temp_store("reg_ok"));
        h.cmd_tx
            .send(UserCommand::Register {
                username: "bob".into(),
                password: "pw".into(),
                confirm: "pw".into(),
            })
            .await
            .unwrap();
        let update = wait_for(&mut h.ui_rx, |u| matches!(u, UiUpdate::AuthNotice(_))).await;
        assert_eq!(update, UiUpdate::AuthNotice(REGISTERED_NOTICE.into()));
        assert_eq!(h.backend.with(|s| s.registered.clone()), vec!["bob".to_string()]);
        quit(h).await;
    }

    #[tokio::test]
    async fn restored_session_opens_planner() {
        let store = temp_store("restore");
        store.save(&session()).unwrap();
        let mut h = spawn_app(Arc::new(FakeBackend::new()), store);
        let update = h.ui_rx.recv().await.unwrap();
        assert_eq!(
            update,
            UiUpdate::SessionStarted {
                username: "ada".into()
            }
        );
        quit(h).await;
    }

    #[tokio::test]
    async fn send_chat_publishes_pending_line() {
        let mut h = logged_in("send").await;
        h.cmd_tx
            .send(UserCommand::SendChat("Buy milk".into()))
            .await
            .unwrap();
        let update = wait_for(&mut h.ui_rx, |u| match u {
            UiUpdate::Transcript(lines) => !lines.is_empty(),
            _ => false,
        })
        .await;
        match update {
            UiUpdate::Transcript(lines) => {
                assert_eq!(lines[0].content, "Buy milk");
                assert_eq!(lines[0].author, Author::Human);
                assert!(lines[0].pending);
            }
            other => panic!("unexpected update: {other:?}"),
        }
        wait_for(&mut h.ui_rx, |u| *u == UiUpdate::ChatStatus(ChatStatus::Sending)).await;
        quit(h).await;
    }

    #[tokio::test]
    async fn task_filter_publishes_snapshot() {
        let mut h = logged_in("filter").await;
        h.backend.with(|s| s.tasks = vec![task("t-1", "Buy milk", TaskStatus::Completed)]);
        h.cmd_tx
            .send(UserCommand::SetTaskFilter(TaskStatus::Completed))
            .await
            .unwrap();
        let update = wait_for(&mut h.ui_rx, |u| match u {
            UiUpdate::Tasks(snap) => snap.status == TaskStatus::Completed && !snap.loading,
            _ => false,
        })
        .await;
        match update {
            UiUpdate::Tasks(snap) => assert_eq!(snap.tasks.len(), 1),
            other => panic!("unexpected update: {other:?}"),
        }
        quit(h).await;
    }

    #[tokio::test]
    async fn unauthorized_task_call_forces_logout() {
        let mut h = logged_in("forced").await;
        h.backend.with(|s| {
            s.list_error = Some(ApiError::Unauthorized {
                status: 401,
                detail: "Could not validate credentials".into(),
            })
        });
        h.cmd_tx.send(UserCommand::RefreshTasks).await.unwrap();
        let update = wait_for(&mut h.ui_rx, |u| matches!(u, UiUpdate::LoggedOut { .. })).await;
        assert_eq!(
            update,
            UiUpdate::LoggedOut {
                reason: Some(SESSION_EXPIRED_NOTICE.into())
            }
        );
        wait_for(&mut h.ui_rx, |u| *u == UiUpdate::View(View::Login)).await;
        assert!(h.store.load(Utc::now()).is_none());
        quit(h).await;
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let mut h = logged_in("logout").await;
        h.cmd_tx.send(UserCommand::Logout).await.unwrap();
        let update = wait_for(&mut h.ui_rx, |u| matches!(u, UiUpdate::LoggedOut { .. })).await;
        assert_eq!(update, UiUpdate::LoggedOut { reason: None });
        assert!(h.store.load(Utc::now()).is_none());

        // Authenticated commands are ignored afterwards.
        h.cmd_tx.send(UserCommand::RefreshTasks).await.unwrap();
        let backend = h.backend.clone();
        quit(h).await;
        assert_eq!(backend.with(|s| s.queries.len()), 1);
    }

    #[tokio::test]
    async fn switching_to_tasks_refreshes_board() {
        let mut h = logged_in("switch").await;
        wait_for(&mut h.ui_rx, |u| matches!(u, UiUpdate::Tasks(_))).await;
        let before = h.backend.with(|s| s.queries.len());
        h.cmd_tx
            .send(UserCommand::SwitchView(View::Tasks))
            .await
            .unwrap();
        wait_for(&mut h.ui_rx, |u| *u == UiUpdate::View(View::Tasks)).await;
        wait_for(&mut h.ui_rx, |u| matches!(u, UiUpdate::Tasks(snap) if !snap.loading)).await;
        assert_eq!(h.backend.with(|s| s.queries.len()), before + 1);
        quit(h).await;
    }

    /// Next board snapshot on the stream, skipping other updates.
    async fn next_tasks(ui_rx: &mut mpsc::Receiver<UiUpdate>) -> TaskSnapshot {
        match wait_for(ui_rx, |u| matches!(u, UiUpdate::Tasks(_))).await {
            UiUpdate::Tasks(snap) => *snap,
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn task_requests_publish_loading_first() {
        let mut h = logged_in("loading").await;
        let initial = next_tasks(&mut h.ui_rx).await;
        assert!(initial.loading);
        let settled = next_tasks(&mut h.ui_rx).await;
        assert!(!settled.loading);

        h.backend.with(|s| s.tasks = vec![task("t-1", "Buy milk", TaskStatus::Active)]);
        h.cmd_tx.send(UserCommand::RefreshTasks).await.unwrap();
        let busy = next_tasks(&mut h.ui_rx).await;
        assert!(busy.loading);
        assert!(busy.tasks.is_empty());
        let done = next_tasks(&mut h.ui_rx).await;
        assert!(!done.loading);
        assert_eq!(done.tasks.len(), 1);

        // The busy snapshot already carries the new filter.
        h.cmd_tx
            .send(UserCommand::SetTaskFilter(TaskStatus::Backlog))
            .await
            .unwrap();
        let busy = next_tasks(&mut h.ui_rx).await;
        assert!(busy.loading);
        assert_eq!(busy.status, TaskStatus::Backlog);
        assert!(!next_tasks(&mut h.ui_rx).await.loading);

        // A blank create sends nothing but still clears the flag.
        h.cmd_tx
            .send(UserCommand::CreateTask("   ".into()))
            .await
            .unwrap();
        assert!(next_tasks(&mut h.ui_rx).await.loading);
        assert!(!next_tasks(&mut h.ui_rx).await.loading);
        quit(h).await;
    }
}
