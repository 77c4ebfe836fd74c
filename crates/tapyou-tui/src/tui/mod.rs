// TUI dashboard: layout, input handling, and widget rendering.
//
// The TUI owns a `ViewState` that mirrors what the app loop publishes. The
// app pushes `UiUpdate` messages over an mpsc channel; the TUI applies them
// to `ViewState` and re-renders at ~30 fps.

pub mod input;
pub mod layout;
pub mod widgets;

use std::collections::BTreeSet;
use std::time::Duration;

use crossterm::event::{Event, EventStream};
use futures_util::StreamExt;
use ratatui::Frame;
use tokio::sync::mpsc;

use tapyou_core::chat::ChatStatus;
use tapyou_core::protocol::{TranscriptLine, UiUpdate, UserCommand, View};
use tapyou_core::tasks::TaskSnapshot;

use layout::{build_layout, planner_layout, tasks_layout};

// ---------------------------------------------------------------------------
// Form state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginField {
    #[default]
    Username,
    Password,
    Confirm,
}

/// Login / registration form.
#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub confirm: String,
    pub register_mode: bool,
    pub focus: LoginField,
    pub error: Option<String>,
    pub notice: Option<String>,
}

impl LoginForm {
    pub fn focused_mut(&mut self) -> &mut String {
        match self.focus {
            LoginField::Username => &mut self.username,
            LoginField::Password => &mut self.password,
            LoginField::Confirm => &mut self.confirm,
        }
    }

    /// Fields visible in the current mode, in tab order.
    pub fn fields(&self) -> &'static [LoginField] {
        if self.register_mode {
            &[LoginField::Username, LoginField::Password, LoginField::Confirm]
        } else {
            &[LoginField::Username, LoginField::Password]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskInputMode {
    Add,
    Edit { task_id: String },
}

/// Single-line add/edit input on the tasks view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInput {
    pub mode: TaskInputMode,
    pub text: String,
}

/// Status picker overlay for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPicker {
    pub task_id: String,
    pub index: usize,
}

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

/// TUI-local state that mirrors the application state for rendering.
#[derive(Debug, Default)]
pub struct ViewState {
    pub view: View,
    /// Logged-in user, if any.
    pub username: Option<String>,
    pub login: LoginForm,

    pub transcript: Vec<TranscriptLine>,
    pub chat_status: ChatStatus,
    pub compose: String,
    /// Rows scrolled up from the bottom of the transcript.
    pub transcript_scroll: usize,

    pub tasks: Option<TaskSnapshot>,
    pub selected_task: usize,
    /// Tasks marked for batch deletion.
    pub marked_tasks: BTreeSet<String>,
    pub task_input: Option<TaskInput>,
    pub status_picker: Option<StatusPicker>,
    /// Task ids awaiting delete confirmation.
    pub confirm_delete: Option<Vec<String>>,

    pub confirm_quit: bool,
}

impl ViewState {
    /// The task under the cursor.
    pub fn selected_task_id(&self) -> Option<&str> {
        self.tasks
            .as_ref()
            .and_then(|snap| snap.tasks.get(self.selected_task))
            .map(|t| t.task_id.as_str())
    }

    pub fn task_count(&self) -> usize {
        self.tasks.as_ref().map_or(0, |snap| snap.tasks.len())
    }

    /// Whether keystrokes go to a text field rather than shortcuts.
    pub fn is_typing(&self) -> bool {
        match self.view {
            View::Login | View::Planner => true,
            View::Tasks => self.task_input.is_some(),
        }
    }
}

// ---------------------------------------------------------------------------
// UiUpdate processing
// ---------------------------------------------------------------------------

/// Apply a single UiUpdate to the ViewState.
pub fn apply_ui_update(state: &mut ViewState, update: UiUpdate) {
    match update {
        UiUpdate::SessionStarted { username } => {
            state.username = Some(username);
            state.login = LoginForm::default();
        }
        UiUpdate::LoggedOut { reason } => {
            *state = ViewState {
                login: LoginForm {
                    notice: reason,
                    ..LoginForm::default()
                },
                ..ViewState::default()
            };
        }
        UiUpdate::View(view) => {
            state.view = view;
        }
        UiUpdate::AuthError(message) => {
            state.login.error = Some(message);
            state.login.notice = None;
        }
        UiUpdate::AuthNotice(message) => {
            state.login.notice = Some(message);
            state.login.error = None;
            state.login.register_mode = false;
            state.login.password.clear();
            state.login.confirm.clear();
            state.login.focus = LoginField::Password;
        }
        UiUpdate::Transcript(lines) => {
            state.transcript = lines;
        }
        UiUpdate::ChatStatus(status) => {
            state.chat_status = status;
        }
        UiUpdate::Tasks(snapshot) => {
            let len = snapshot.tasks.len();
            state.selected_task = state.selected_task.min(len.saturating_sub(1));
            state
                .marked_tasks
                .retain(|id| snapshot.tasks.iter().any(|t| &t.task_id == id));
            state.tasks = Some(*snapshot);
        }
    }
}

// ---------------------------------------------------------------------------
// Render frame
// ---------------------------------------------------------------------------

/// Render the complete frame for the current view.
pub fn render_frame(frame: &mut Frame, state: &ViewState) {
    let layout = build_layout(frame.area());

    widgets::status_bar::render(frame, layout.status_bar, state);

    match state.view {
        View::Login => widgets::login::render(frame, layout.body, &state.login),
        View::Planner => {
            let planner = planner_layout(layout.body);
            widgets::transcript::render(frame, planner.transcript, state);
            widgets::compose::render(frame, planner.compose, state);
        }
        View::Tasks => {
            let tasks = tasks_layout(layout.body);
            widgets::task_list::render_header(frame, tasks.header, state);
            widgets::task_list::render(frame, tasks.list, state);
            widgets::task_list::render_input(frame, tasks.input, state);
            if let Some(picker) = &state.status_picker {
                widgets::status_picker::render(frame, layout.body, picker);
            }
            if let Some(ids) = &state.confirm_delete {
                widgets::delete_confirm::render(frame, layout.body, ids.len());
            }
        }
    }

    widgets::help_bar::render(frame, layout.help_bar, state);

    if state.confirm_quit {
        widgets::quit_confirm::render(frame, frame.area());
    }
}

// ---------------------------------------------------------------------------
// Main TUI loop
// ---------------------------------------------------------------------------

/// Run the TUI event loop.
///
/// 1. Initializes the terminal (raw mode, alternate screen).
/// 2. Installs a panic hook to restore the terminal on crash.
/// 3. Runs an async select loop: UI updates, keyboard input, render ticks.
/// 4. Restores the terminal on exit.
pub async fn run(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
) -> anyhow::Result<()> {
    let mut terminal = ratatui::init();

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = ratatui::restore();
        original_hook(panic_info);
    }));

    let mut view_state = ViewState::default();
    let mut event_stream = EventStream::new();

    let mut render_tick = tokio::time::interval(Duration::from_millis(33));
    render_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // UI updates from the app loop
            update = ui_rx.recv() => {
                match update {
                    Some(ui_update) => apply_ui_update(&mut view_state, ui_update),
                    // Channel closed: app is shutting down
                    None => break,
                }
            }

            // Keyboard input
            maybe_event = event_stream.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key_event))) => {
                        if let Some(cmd) = input::handle_key(key_event, &mut view_state) {
                            let quit = cmd == UserCommand::Quit;
                            let _ = cmd_tx.send(cmd).await;
                            if quit {
                                break;
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("Terminal input error: {}", e);
                        break;
                    }
                    None => break,
                }
            }

            _ = render_tick.tick() => {
                terminal.draw(|frame| render_frame(frame, &view_state))?;
            }
        }
    }

    ratatui::restore();
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
