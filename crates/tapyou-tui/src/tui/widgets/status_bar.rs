// Status bar widget: app name, signed-in user, view tabs, chat status.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use tapyou_core::chat::ChatStatus;
use tapyou_core::protocol::View;

use crate::tui::ViewState;

/// Render the status bar into the given area.
///
/// Layout: [name] [user] | [tabs] | [chat status]
pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let mut spans = vec![Span::styled(
        " TapYou ",
        Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];

    match &state.username {
        Some(username) => {
            spans.push(Span::styled(
                format!(" {username} "),
                Style::default().fg(Color::White),
            ));
            spans.push(Span::styled("| ", Style::default().fg(Color::Gray)));
            spans.extend(tab_spans(state.view));
            if let Some((label, color)) = chat_indicator(state.chat_status) {
                spans.push(Span::styled("| ", Style::default().fg(Color::Gray)));
                spans.push(Span::styled(label, Style::default().fg(color)));
            }
        }
        None => spans.push(Span::styled(
            " not signed in",
            Style::default().fg(Color::DarkGray),
        )),
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, area);
}

/// Tab indicators for the authenticated views, active one highlighted.
pub fn tab_spans(active: View) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for view in [View::Planner, View::Tasks] {
        let style = if view == active {
            Style::default()
                .fg(Color::Black)
                .bg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        spans.push(Span::styled(format!("[{}]", view.label()), style));
        spans.push(Span::raw(" "));
    }
    spans
}

/// Label and color for a busy chat, `None` when idle.
pub fn chat_indicator(status: ChatStatus) -> Option<(&'static str, Color)> {
    match status {
        ChatStatus::Idle => None,
        ChatStatus::Sending => Some(("sending...", Color::Yellow)),
        ChatStatus::AwaitingReply => Some(("waiting for reply...", Color::Yellow)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::test_support::{render_rows, screen_contains};

    #[test]
    fn tab_spans_highlight_active() {
        let spans = tab_spans(View::Tasks);
        assert_eq!(spans[0].content, "[Planner]");
        assert!(!spans[0].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(spans[2].content, "[Tasks]");
        assert!(spans[2].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn idle_chat_has_no_indicator() {
        assert!(chat_indicator(ChatStatus::Idle).is_none());
        assert!(chat_indicator(ChatStatus::AwaitingReply).is_some());
    }

    #[test]
    fn signed_out_bar() {
        let state = ViewState::default();
        let rows = render_rows(60, 1, |frame| render(frame, frame.area(), &state));
        assert!(screen_contains(&rows, "not signed in"));
        assert!(!screen_contains(&rows, "[Planner]"));
    }

    #[test]
    fn signed_in_bar_shows_user_and_status() {
        let state = ViewState {
            view: View::Planner,
            username: Some("ada".into()),
            chat_status: ChatStatus::AwaitingReply,
            ..ViewState::default()
        };
        let rows = render_rows(100, 1, |frame| render(frame, frame.area(), &state));
        assert!(screen_contains(&rows, "ada"));
        assert!(screen_contains(&rows, "[Planner]"));
        assert!(screen_contains(&rows, "waiting for reply..."));
    }
}
