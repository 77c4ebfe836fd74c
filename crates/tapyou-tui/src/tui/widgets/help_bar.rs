// Help bar widget: keyboard shortcuts for the current view and mode.

use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use tapyou_core::protocol::View;

use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let mut spans = Vec::new();
    for (key, action) in hints(state) {
        spans.push(Span::styled(format!(" {key}"), Style::default().fg(Color::Cyan)));
        spans.push(Span::styled(format!(" {action} "), Style::default().fg(Color::Gray)));
    }
    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, area);
}

/// (key, action) pairs for whatever currently has input focus.
pub fn hints(state: &ViewState) -> &'static [(&'static str, &'static str)] {
    if state.confirm_quit || state.confirm_delete.is_some() {
        return &[("y", "confirm"), ("n/Esc", "cancel")];
    }
    match state.view {
        View::Login if state.login.register_mode => &[
            ("Tab", "next field"),
            ("Enter", "register"),
            ("Ctrl+R", "back to login"),
            ("Esc", "quit"),
        ],
        View::Login => &[
            ("Tab", "next field"),
            ("Enter", "log in"),
            ("Ctrl+R", "register"),
            ("Esc", "quit"),
        ],
        View::Planner => &[
            ("Enter", "send"),
            ("PgUp/PgDn", "scroll"),
            ("Tab", "tasks"),
            ("Ctrl+R", "reload"),
            ("Ctrl+L", "log out"),
            ("Esc", "quit"),
        ],
        View::Tasks if state.task_input.is_some() => &[("Enter", "save"), ("Esc", "cancel")],
        View::Tasks if state.status_picker.is_some() => {
            &[("j/k", "choose"), ("Enter", "apply"), ("Esc", "cancel")]
        }
        View::Tasks => &[
            ("1-4", "filter"),
            ("h/l", "day"),
            ("t", "today"),
            ("a", "add"),
            ("e", "edit"),
            ("s", "status"),
            ("Space", "mark"),
            ("d", "delete"),
            ("r", "refresh"),
            ("Tab", "planner"),
            ("q", "quit"),
        ],
    }
}
