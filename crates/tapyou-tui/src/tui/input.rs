// Keyboard input handling and command dispatch.
//
// Translates crossterm key events into UserCommand messages sent to the
// app loop, or into local ViewState mutations (typing, focus, selection,
// overlays).

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use tapyou_core::api::models::TaskStatus;
use tapyou_core::protocol::{UserCommand, View};

use super::{LoginField, StatusPicker, TaskInput, TaskInputMode, ViewState};

/// Rows moved by PageUp/PageDown in the transcript.
const PAGE_SIZE: usize = 10;

/// Handle a keyboard event.
///
/// Returns `Some(UserCommand)` when the key press should be forwarded to the
/// app loop. Returns `None` when it was handled locally.
pub fn handle_key(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    // crossterm emits Release events on some platforms
    if key_event.kind != KeyEventKind::Press {
        return None;
    }

    if is_ctrl(&key_event, 'c') {
        return Some(UserCommand::Quit);
    }

    if view_state.confirm_quit {
        return handle_confirm_quit(key_event, view_state);
    }

    match view_state.view {
        View::Login => handle_login(key_event, view_state),
        View::Planner => handle_planner(key_event, view_state),
        View::Tasks => handle_tasks(key_event, view_state),
    }
}

fn is_ctrl(key_event: &KeyEvent, c: char) -> bool {
    key_event.modifiers.contains(KeyModifiers::CONTROL) && key_event.code == KeyCode::Char(c)
}

/// A character that should be typed into a text field.
fn typed_char(key_event: &KeyEvent) -> Option<char> {
    match key_event.code {
        KeyCode::Char(c)
            if !key_event
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            Some(c)
        }
        _ => None,
    }
}

/// Handle key events while in quit confirmation mode.
///
/// `y`/`q` confirm, `n`/`Esc` cancel, everything else is blocked.
fn handle_confirm_quit(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Char('q') | KeyCode::Char('Q') => {
            Some(UserCommand::Quit)
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            view_state.confirm_quit = false;
            None
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

fn handle_login(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    let form = &mut view_state.login;

    if is_ctrl(&key_event, 'r') {
        form.register_mode = !form.register_mode;
        form.error = None;
        form.notice = None;
        form.confirm.clear();
        if form.focus == LoginField::Confirm {
            form.focus = LoginField::Password;
        }
        return None;
    }

    if let Some(c) = typed_char(&key_event) {
        form.focused_mut().push(c);
        return None;
    }

    match key_event.code {
        KeyCode::Esc => {
            view_state.confirm_quit = true;
            None
        }
        KeyCode::Tab | KeyCode::Down => {
            move_focus(view_state, 1);
            None
        }
        KeyCode::BackTab | KeyCode::Up => {
            move_focus(view_state, -1);
            None
        }
        KeyCode::Backspace => {
            form.focused_mut().pop();
            None
        }
        KeyCode::Enter => {
            let cmd = if form.register_mode {
                UserCommand::Register {
                    username: form.username.clone(),
                    password: form.password.clone(),
                    confirm: form.confirm.clone(),
                }
            } else {
                UserCommand::Login {
                    username: form.username.clone(),
                    password: form.password.clone(),
                }
            };
            Some(cmd)
        }
        _ => None,
    }
}

fn move_focus(view_state: &mut ViewState, step: isize) {
    let form = &mut view_state.login;
    let fields = form.fields();
    let current = fields.iter().position(|f| *f == form.focus).unwrap_or(0) as isize;
    let next = (current + step).rem_euclid(fields.len() as isize) as usize;
    form.focus = fields[next];
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

fn handle_planner(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    if is_ctrl(&key_event, 'r') {
        view_state.transcript_scroll = 0;
        return Some(UserCommand::ReloadChat);
    }
    if is_ctrl(&key_event, 'l') {
        return Some(UserCommand::Logout);
    }

    if let Some(c) = typed_char(&key_event) {
        view_state.compose.push(c);
        return None;
    }

    match key_event.code {
        KeyCode::Enter => {
            if view_state.compose.trim().is_empty() {
                return None;
            }
            let text = std::mem::take(&mut view_state.compose);
            view_state.transcript_scroll = 0;
            Some(UserCommand::SendChat(text))
        }
        KeyCode::Backspace => {
            view_state.compose.pop();
            None
        }
        KeyCode::Tab => Some(UserCommand::SwitchView(View::Tasks)),
        KeyCode::Up => {
            view_state.transcript_scroll = view_state.transcript_scroll.saturating_add(1);
            None
        }
        KeyCode::Down => {
            view_state.transcript_scroll = view_state.transcript_scroll.saturating_sub(1);
            None
        }
        KeyCode::PageUp => {
            view_state.transcript_scroll = view_state.transcript_scroll.saturating_add(PAGE_SIZE);
            None
        }
        KeyCode::PageDown => {
            view_state.transcript_scroll = view_state.transcript_scroll.saturating_sub(PAGE_SIZE);
            None
        }
        KeyCode::Esc => {
            view_state.confirm_quit = true;
            None
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

fn handle_tasks(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    if view_state.task_input.is_some() {
        return handle_task_input(key_event, view_state);
    }
    if view_state.status_picker.is_some() {
        return handle_status_picker(key_event, view_state);
    }
    if view_state.confirm_delete.is_some() {
        return handle_confirm_delete(key_event, view_state);
    }

    if is_ctrl(&key_event, 'l') {
        return Some(UserCommand::Logout);
    }

    match key_event.code {
        KeyCode::Char(c @ '1'..='4') => {
            let index = c as usize - '1' as usize;
            view_state.selected_task = 0;
            Some(UserCommand::SetTaskFilter(TaskStatus::ALL[index]))
        }
        KeyCode::Left | KeyCode::Char('h') => Some(UserCommand::ShiftDate(-1)),
        KeyCode::Right | KeyCode::Char('l') => Some(UserCommand::ShiftDate(1)),
        KeyCode::Char('t') => Some(UserCommand::Today),
        KeyCode::Char('r') => Some(UserCommand::RefreshTasks),

        KeyCode::Down | KeyCode::Char('j') => {
            let last = view_state.task_count().saturating_sub(1);
            view_state.selected_task = (view_state.selected_task + 1).min(last);
            None
        }
        KeyCode::Up | KeyCode::Char('k') => {
            view_state.selected_task = view_state.selected_task.saturating_sub(1);
            None
        }
        KeyCode::Char(' ') => {
            if let Some(id) = view_state.selected_task_id().map(str::to_string) {
                if !view_state.marked_tasks.remove(&id) {
                    view_state.marked_tasks.insert(id);
                }
            }
            None
        }

        KeyCode::Char('a') => {
            view_state.task_input = Some(TaskInput {
                mode: TaskInputMode::Add,
                text: String::new(),
            });
            None
        }
        KeyCode::Char('e') => {
            let selected = view_state
                .tasks
                .as_ref()
                .and_then(|snap| snap.tasks.get(view_state.selected_task));
            if let Some(task) = selected {
                view_state.task_input = Some(TaskInput {
                    mode: TaskInputMode::Edit {
                        task_id: task.task_id.clone(),
                    },
                    text: task.task_description.clone(),
                });
            }
            None
        }
        KeyCode::Char('s') => {
            let selected = view_state
                .tasks
                .as_ref()
                .and_then(|snap| snap.tasks.get(view_state.selected_task));
            if let Some(task) = selected {
                let index = TaskStatus::ALL
                    .iter()
                    .position(|s| *s == task.current_status)
                    .unwrap_or(0);
                view_state.status_picker = Some(StatusPicker {
                    task_id: task.task_id.clone(),
                    index,
                });
            }
            None
        }
        KeyCode::Char('d') => {
            let ids: Vec<String> = if view_state.marked_tasks.is_empty() {
                view_state
                    .selected_task_id()
                    .map(|id| vec![id.to_string()])
                    .unwrap_or_default()
            } else {
                view_state.marked_tasks.iter().cloned().collect()
            };
            if !ids.is_empty() {
                view_state.confirm_delete = Some(ids);
            }
            None
        }

        KeyCode::Tab => Some(UserCommand::SwitchView(View::Planner)),
        KeyCode::Char('q') | KeyCode::Esc => {
            view_state.confirm_quit = true;
            None
        }
        _ => None,
    }
}

fn handle_task_input(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    if let Some(c) = typed_char(&key_event) {
        if let Some(input) = view_state.task_input.as_mut() {
            input.text.push(c);
        }
        return None;
    }

    match key_event.code {
        KeyCode::Esc => {
            view_state.task_input = None;
            None
        }
        KeyCode::Backspace => {
            if let Some(input) = view_state.task_input.as_mut() {
                input.text.pop();
            }
            None
        }
        KeyCode::Enter => {
            let input = view_state.task_input.take()?;
            let description = input.text.trim().to_string();
            if description.is_empty() {
                return None;
            }
            match input.mode {
                TaskInputMode::Add => Some(UserCommand::CreateTask(description)),
                TaskInputMode::Edit { task_id } => Some(UserCommand::EditTask {
                    task_id,
                    description,
                }),
            }
        }
        _ => None,
    }
}

fn handle_status_picker(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    let picker = view_state.status_picker.as_mut()?;
    let count = TaskStatus::ALL.len();
    match key_event.code {
        KeyCode::Down | KeyCode::Char('j') => {
            picker.index = (picker.index + 1) % count;
            None
        }
        KeyCode::Up | KeyCode::Char('k') => {
            picker.index = (picker.index + count - 1) % count;
            None
        }
        KeyCode::Char(c @ '1'..='4') => {
            picker.index = c as usize - '1' as usize;
            None
        }
        KeyCode::Enter => {
            let picker = view_state.status_picker.take()?;
            Some(UserCommand::ChangeTaskStatus {
                task_id: picker.task_id,
                status: TaskStatus::ALL[picker.index],
            })
        }
        KeyCode::Esc => {
            view_state.status_picker = None;
            None
        }
        _ => None,
    }
}

fn handle_confirm_delete(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => {
            let mut ids = view_state.confirm_delete.take()?;
            view_state.marked_tasks.clear();
            if ids.len() == 1 {
                ids.pop().map(UserCommand::DeleteTask)
            } else {
                Some(UserCommand::DeleteTasks(ids))
            }
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            view_state.confirm_delete = None;
            None
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
