// Status picker overlay for moving a task between statuses.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState};
use ratatui::Frame;

use tapyou_core::api::models::TaskStatus;

use crate::tui::layout::centered_rect;
use crate::tui::StatusPicker;

const DIALOG_WIDTH: u16 = 24;

pub fn render(frame: &mut Frame, area: Rect, picker: &StatusPicker) {
    let height = TaskStatus::ALL.len() as u16 + 2;
    let dialog_area = centered_rect(DIALOG_WIDTH, height, area);
    frame.render_widget(Clear, dialog_area);

    let items: Vec<ListItem> = TaskStatus::ALL
        .iter()
        .enumerate()
        .map(|(i, status)| ListItem::new(format!("{} {}", i + 1, status.label())))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(" Move to "),
        )
        .style(Style::default().bg(Color::Black))
        .highlight_style(Style::default().fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut state = ListState::default().with_selected(Some(picker.index));
    frame.render_stateful_widget(list, dialog_area, &mut state);
}
