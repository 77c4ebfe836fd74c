// Login / registration form, centered in the body.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::tui::layout::centered_rect;
use crate::tui::{LoginField, LoginForm};

const FORM_WIDTH: u16 = 48;

pub fn render(frame: &mut Frame, area: Rect, form: &LoginForm) {
    let title = if form.register_mode {
        " Create account "
    } else {
        " Log in "
    };

    let mut lines = vec![Line::raw("")];
    for field in form.fields() {
        lines.push(field_line(form, *field));
    }
    lines.push(Line::raw(""));

    if let Some(error) = &form.error {
        lines.push(Line::styled(format!("  {error}"), Style::default().fg(Color::Red)));
    } else if let Some(notice) = &form.notice {
        lines.push(Line::styled(format!("  {notice}"), Style::default().fg(Color::Green)));
    }

    let height = lines.len() as u16 + 2;
    let form_area = centered_rect(FORM_WIDTH, height, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);
    frame.render_widget(Paragraph::new(lines).block(block), form_area);
}

fn field_line(form: &LoginForm, field: LoginField) -> Line<'static> {
    let (label, value) = match field {
        LoginField::Username => ("Username", form.username.clone()),
        LoginField::Password => ("Password", mask(&form.password)),
        LoginField::Confirm => ("Confirm ", mask(&form.confirm)),
    };
    let focused = form.focus == field;
    let marker = if focused { "> " } else { "  " };
    let value_style = if focused {
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };
    let cursor = if focused { "_" } else { "" };
    Line::from(vec![
        Span::styled(marker, Style::default().fg(Color::Cyan)),
        Span::raw(format!("{label}: ")),
        Span::styled(format!("{value}{cursor}"), value_style),
    ])
}

/// Password fields never echo their contents.
pub fn mask(secret: &str) -> String {
    "*".repeat(secret.chars().count())
}
