// Delete confirmation overlay for one or more tasks.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

use super::quit_confirm::yes_no_line;
use crate::tui::layout::centered_rect;

const DIALOG_HEIGHT: u16 = 3;

pub fn prompt(count: usize) -> String {
    if count == 1 {
        "Delete this task?".to_string()
    } else {
        format!("Delete {count} tasks?")
    }
}

pub fn render(frame: &mut Frame, area: Rect, count: usize) {
    let line = yes_no_line(&prompt(count));
    let width = line.width() as u16 + 4;
    let dialog_area = centered_rect(width, DIALOG_HEIGHT, area);
    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(Span::styled(
            " Delete ",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    let paragraph = Paragraph::new(line)
        .block(block)
        .style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, dialog_area);
}
