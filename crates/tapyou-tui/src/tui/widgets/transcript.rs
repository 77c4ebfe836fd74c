// Chat transcript widget with the "thinking..." indicator.
//
// Messages are wrapped here rather than by `Paragraph` so the widget knows
// the total row count and can pin the view to the newest message.

use chrono::Local;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use tapyou_core::chat::{Author, ChatStatus};
use tapyou_core::protocol::TranscriptLine;

use crate::tui::ViewState;

const EMPTY_HINT: &str = "Tell TapYou what you need to get done.";
const THINKING: &str = "TapYou is thinking...";

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title("Planner");

    let inner_width = area.width.saturating_sub(2) as usize;
    let visible_rows = area.height.saturating_sub(2) as usize;

    if state.transcript.is_empty() && state.chat_status == ChatStatus::Idle {
        let paragraph = Paragraph::new(format!("  {EMPTY_HINT}"))
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let mut rows: Vec<Line> = Vec::new();
    for line in &state.transcript {
        rows.extend(message_rows(line, inner_width));
    }
    if state.chat_status != ChatStatus::Idle {
        rows.push(Line::styled(
            THINKING,
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        ));
    }

    let (start, end) = visible_window(rows.len(), visible_rows, state.transcript_scroll);
    let visible: Vec<Line> = rows.into_iter().skip(start).take(end - start).collect();
    frame.render_widget(Paragraph::new(visible).block(block), area);
}

/// Header plus wrapped body rows for one message, followed by a blank row.
fn message_rows(line: &TranscriptLine, width: usize) -> Vec<Line<'static>> {
    let (name, name_color) = match line.author {
        Author::Human => ("You", Color::Green),
        Author::Agent => ("TapYou", Color::Cyan),
    };
    let time = line.timestamp.with_timezone(&Local).format("%H:%M").to_string();

    let mut header = vec![
        Span::styled(
            name,
            Style::default().fg(name_color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" {time}"), Style::default().fg(Color::DarkGray)),
    ];
    if line.pending {
        header.push(Span::styled(" (sending)", Style::default().fg(Color::DarkGray)));
    }

    let body_style = if line.notice {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC)
    } else if line.pending {
        Style::default().fg(Color::Gray)
    } else {
        Style::default().fg(Color::White)
    };

    let mut rows = vec![Line::from(header)];
    for text in wrap_text(&line.content, width.saturating_sub(2)) {
        rows.push(Line::styled(format!("  {text}"), body_style));
    }
    rows.push(Line::raw(""));
    rows
}

/// Row range to show given `scroll` rows up from the bottom.
pub fn visible_window(total: usize, height: usize, scroll: usize) -> (usize, usize) {
    let max_scroll = total.saturating_sub(height);
    let scroll = scroll.min(max_scroll);
    let end = total - scroll;
    (end.saturating_sub(height), end)
}

/// Greedy word wrap. Words longer than `width` are split. Explicit newlines
/// are kept.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if current_len > 0 {
                    out.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(width);
                out.push(word.into_iter().collect());
                word = rest;
            }
            let needed = if current_len == 0 { word.len() } else { word.len() + 1 };
            if current_len + needed > width {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(word.iter());
            current_len += word.len();
        }
        out.push(current);
    }
    out
}
