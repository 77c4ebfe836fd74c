// Task board widgets: date/filter header, task list, add/edit input.

use chrono::{Local, NaiveDate};
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use tapyou_core::api::models::{Task, TaskCounts, TaskStatus};
use tapyou_core::tasks::EMPTY_MESSAGE;

use crate::tui::{TaskInputMode, ViewState};

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Date navigation on the first row, filter tabs with counts on the second.
pub fn render_header(frame: &mut Frame, area: Rect, state: &ViewState) {
    let block = Block::default().borders(Borders::ALL).title("Tasks");

    let Some(snapshot) = &state.tasks else {
        let paragraph = Paragraph::new("  Loading...")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    };

    let today = Local::now().date_naive();
    let mut spans = vec![
        Span::styled(" < ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            date_label(snapshot.date, today),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" > ", Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
    ];
    spans.extend(filter_spans(snapshot.status, &snapshot.counts));

    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

/// "Mon, Oct 19 2026", suffixed with "(today)" when applicable.
pub fn date_label(date: NaiveDate, today: NaiveDate) -> String {
    let label = date.format("%a, %b %-d %Y").to_string();
    if date == today {
        format!("{label} (today)")
    } else {
        label
    }
}

/// "[1 Active 3] [2 Completed 0] ..." with the selected filter highlighted.
pub fn filter_spans(active: TaskStatus, counts: &TaskCounts) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for (i, status) in TaskStatus::ALL.iter().enumerate() {
        let style = if *status == active {
            Style::default()
                .fg(Color::Black)
                .bg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        spans.push(Span::styled(
            format!("[{} {} {}]", i + 1, status.label(), counts.for_status(*status)),
            style,
        ));
        spans.push(Span::raw(" "));
    }
    spans
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let Some(snapshot) = &state.tasks else {
        frame.render_widget(Paragraph::new("").block(block), area);
        return;
    };

    if let Some(error) = &snapshot.error {
        let paragraph = Paragraph::new(format!("  {error}"))
            .style(Style::default().fg(Color::Red))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    if snapshot.tasks.is_empty() {
        let message = if snapshot.loading {
            "Loading tasks..."
        } else {
            EMPTY_MESSAGE
        };
        let paragraph = Paragraph::new(format!("  {message}"))
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let items: Vec<ListItem> = snapshot
        .tasks
        .iter()
        .map(|task| ListItem::new(task_line(task, state.marked_tasks.contains(&task.task_id))))
        .collect();

    let mut title = format!("{} ({})", snapshot.status.label(), snapshot.tasks.len());
    if snapshot.loading {
        title.push_str(" loading...");
    }
    let list = List::new(items)
        .block(block.title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut list_state = ListState::default().with_selected(Some(state.selected_task));
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn task_line(task: &Task, marked: bool) -> Line<'static> {
    let mark = if marked { "[x] " } else { "[ ] " };
    let description_style = if task.current_status == TaskStatus::Completed {
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT)
    } else {
        Style::default().fg(Color::White)
    };
    Line::from(vec![
        Span::styled(mark, Style::default().fg(Color::Yellow)),
        Span::styled(task.task_description.clone(), description_style),
        Span::styled(
            format!("  {}", task.current_status.label()),
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

pub fn render_input(frame: &mut Frame, area: Rect, state: &ViewState) {
    let Some(input) = &state.task_input else {
        let paragraph = Paragraph::new("  Press a to add a task")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(paragraph, area);
        return;
    };

    let title = match input.mode {
        TaskInputMode::Add => "New task",
        TaskInputMode::Edit { .. } => "Edit task",
    };
    let paragraph = Paragraph::new(format!("{}_", input.text)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green))
            .title(title),
    );
    frame.render_widget(paragraph, area);
}
