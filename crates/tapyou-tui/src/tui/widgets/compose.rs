// Compose box for the planner chat.

use ratatui::layout::{Position, Rect};
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green))
        .title("Message");

    let inner_width = area.width.saturating_sub(2) as usize;
    let text = tail(&state.compose, inner_width.saturating_sub(1));
    let cursor_x = area.x + 1 + text.chars().count() as u16;

    frame.render_widget(Paragraph::new(text).block(block), area);
    if state.confirm_quit || area.height < 3 {
        return;
    }
    frame.set_cursor_position(Position::new(cursor_x, area.y + 1));
}

/// The last `width` characters, so the cursor end stays visible.
pub fn tail(text: &str, width: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(width)).collect()
}
