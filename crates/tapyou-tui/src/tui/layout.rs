// Screen layout: panel arrangement and sizing.
//
// +--------------------------------------------------+
// | Status Bar (1 row)                                |
// +--------------------------------------------------+
// | Body (fill)                                       |
// |   Planner: transcript (fill) + compose (3)        |
// |   Tasks:   header (3) + list (fill) + input (3)   |
// |   Login:   centered form                          |
// +--------------------------------------------------+
// | Help Bar (1 row)                                  |
// +--------------------------------------------------+

use ratatui::layout::{Constraint, Direction, Flex, Layout, Rect};

/// Resolved screen areas shared by every view.
#[derive(Debug, Clone)]
pub struct AppLayout {
    /// Top row: user, view tabs, chat status.
    pub status_bar: Rect,
    /// Everything between the bars.
    pub body: Rect,
    /// Bottom row: keyboard shortcut hints.
    pub help_bar: Rect,
}

#[derive(Debug, Clone)]
pub struct PlannerLayout {
    pub transcript: Rect,
    pub compose: Rect,
}

#[derive(Debug, Clone)]
pub struct TasksLayout {
    /// Date navigation and filter tabs.
    pub header: Rect,
    pub list: Rect,
    /// Add/edit input line.
    pub input: Rect,
}

pub fn build_layout(area: Rect) -> AppLayout {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // status bar
            Constraint::Min(6),    // body
            Constraint::Length(1), // help bar
        ])
        .split(area);

    AppLayout {
        status_bar: vertical[0],
        body: vertical[1],
        help_bar: vertical[2],
    }
}

pub fn planner_layout(body: Rect) -> PlannerLayout {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(body);
    PlannerLayout {
        transcript: parts[0],
        compose: parts[1],
    }
}

pub fn tasks_layout(body: Rect) -> TasksLayout {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(body);
    TasksLayout {
        header: parts[0],
        list: parts[1],
        input: parts[2],
    }
}

/// Compute a centered rectangle of the given size within `area`, clamped to
/// the available space.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let clamped_width = width.min(area.width);
    let clamped_height = height.min(area.height);

    let vertical = Layout::vertical([Constraint::Length(clamped_height)])
        .flex(Flex::Center)
        .split(area);

    let horizontal = Layout::horizontal([Constraint::Length(clamped_width)])
        .flex(Flex::Center)
        .split(vertical[0]);

    horizontal[0]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
