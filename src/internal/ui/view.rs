use jiff::{Timestamp, tz::TimeZone};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Padding, Paragraph},
};

use super::app::App;
use crate::api::NodeFetcher;
use crate::internal::models::{Node, Page, Row};
use crate::internal::notification::NotificationType;
use crate::utils::datetime::{format_absolute, format_relative};
use crate::utils::html::decode_comment_text;
use crate::utils::url::story_domain;

const KEY_HINTS: &str =
    " n/p: Page | g/G: First/Last | 0-9 Enter: Go to | t: Sort | r: Refresh | e: Export | q: Quit ";

#[tracing::instrument(skip(app, f))]
pub fn draw<F: NodeFetcher>(app: &App<F>, f: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(f.area());

    let snapshot = app.handle.snapshot();
    render_header(snapshot.tree.root(), snapshot.tree.comment_count(), f, chunks[0]);
    render_page(&app.page, app.config.display_width, f, chunks[1]);
    render_status_bar(app, f, chunks[2]);

    if app.notification.is_some() {
        render_notification(app, f);
    }
}

fn render_header(root: &Node, comment_count: usize, f: &mut Frame, area: Rect) {
    let width = area.width.saturating_sub(4).max(20) as usize;
    let title = root.title.as_deref().unwrap_or("Untitled");
    let mut lines: Vec<Line> = textwrap::wrap(title, width)
        .into_iter()
        .take(2)
        .map(|line| {
            Line::from(Span::styled(
                line.into_owned(),
                Style::default().add_modifier(Modifier::BOLD),
            ))
        })
        .collect();

    let mut meta = vec![format!(
        "by {}",
        root.author.as_deref().unwrap_or("unknown")
    )];
    if let Some(score) = root.score {
        meta.push(format!("{} points", score));
    }
    meta.push(format!("{} comments", comment_count));
    if let Some(domain) = root.url.as_deref().and_then(story_domain) {
        meta.push(domain);
    }
    if let Some(time) = root.created_at {
        meta.push(format_absolute(time, &TimeZone::system()));
    }
    lines.push(Line::from(Span::styled(
        meta.join(" | "),
        Style::default().fg(Color::DarkGray),
    )));

    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .padding(Padding::horizontal(1))
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(p, area);
}

fn render_page(page: &Page, display_width: Option<usize>, f: &mut Frame, area: Rect) {
    let width = wrap_width(area.width, display_width);
    let now = Timestamp::now();

    let mut all_lines: Vec<Line> = Vec::new();
    if page.is_empty_thread() {
        all_lines.push(Line::from(Span::styled(
            "No comments yet.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    for row in &page.rows {
        let guide = depth_guide(row.depth);
        let mut header = vec![Span::styled(
            guide.clone(),
            Style::default().fg(Color::DarkGray),
        )];
        match row.node.placeholder_label() {
            Some(label) => header.push(Span::styled(
                label,
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            )),
            None => {
                header.push(Span::styled(
                    row.node.author.as_deref().unwrap_or("unknown").to_string(),
                    Style::default().fg(Color::Yellow),
                ));
                header.push(Span::styled(
                    format!(" ({})", comment_age(&row.node, now)),
                    Style::default().fg(Color::DarkGray),
                ));
            }
        }
        all_lines.push(Line::from(header));

        if let (None, Some(text)) = (row.node.placeholder_label(), row.node.text.as_deref()) {
            let indent = "  ".repeat(row.depth + 1);
            let available_width = width.saturating_sub(indent.len()).max(20);
            for line in decode_comment_text(text, available_width).lines() {
                all_lines.push(Line::from(vec![
                    Span::raw(indent.clone()),
                    Span::raw(line.to_string()),
                ]));
            }
        }
        all_lines.push(Line::from(""));
    }

    let paragraph = Paragraph::new(all_lines).block(
        Block::default()
            .borders(Borders::NONE)
            .padding(Padding::horizontal(1))
            .title_bottom(Line::from(KEY_HINTS).alignment(Alignment::Right))
            .title_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn render_status_bar<F: NodeFetcher>(app: &App<F>, f: &mut Frame, area: Rect) {
    let snapshot = app.handle.snapshot();
    let mut status = format!(
        " {} | sort: {} | v{} refreshed {}",
        page_summary(&app.page),
        app.handle.state().sort_order,
        snapshot.version,
        format_relative(snapshot.fetched_at.as_second(), Timestamp::now()),
    );
    if let Some(nodes) = app.refresh_progress {
        status.push_str(&format!(" | {} refreshing ({})", app.get_spinner_char(), nodes));
    }
    if snapshot.tree.truncated() {
        status.push_str(" | truncated");
    }
    if !app.goto_input.is_empty() {
        status.push_str(&format!(" | Go to page: {}_", app.goto_input));
    }

    let p = Paragraph::new(status).style(Style::default().fg(Color::Black).bg(Color::Gray));
    f.render_widget(p, area);
}

fn render_notification<F: NodeFetcher>(app: &App<F>, f: &mut Frame) {
    if let Some(notification) = &app.notification {
        let area = f.area();

        let popup_width = (notification.message.len() as u16 + 4).min(area.width.saturating_sub(4));
        let popup_height = 3;
        let popup_x = (area.width.saturating_sub(popup_width)) / 2;
        let popup_y = area.height.saturating_sub(popup_height + 2);
        let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

        let (bg_color, title) = match notification.notification_type {
            NotificationType::Info => (Color::Blue, "Info"),
            NotificationType::Warning => (Color::Yellow, "Warning"),
            NotificationType::Error => (Color::Red, "Error"),
        };

        let popup = Paragraph::new(notification.message.as_str())
            .style(
                Style::default()
                    .bg(bg_color)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            )
            .block(Block::default().borders(Borders::ALL).title(title))
            .alignment(Alignment::Center);

        f.render_widget(Clear, popup_area);
        f.render_widget(popup, popup_area);
    }
}

/// Columns available for comment text: the pane minus padding, capped by the
/// configured display width. Never below 20.
pub fn wrap_width(pane_width: u16, display_width: Option<usize>) -> usize {
    let pane = pane_width.saturating_sub(4) as usize;
    display_width.map_or(pane, |limit| pane.min(limit)).max(20)
}

/// Tree guide drawn before a row: `│ ` per ancestor level and `└─` for the row itself.
pub fn depth_guide(depth: usize) -> String {
    let mut guide = String::new();
    for _ in 0..depth {
        guide.push_str("│ ");
    }
    guide.push_str("└─ ");
    guide
}

fn comment_age(node: &Node, now: Timestamp) -> String {
    node.created_at
        .map(|ts| format_relative(ts, now))
        .unwrap_or_else(|| "unknown".to_string())
}

/// "Page X of Y (N comments)"
pub fn page_summary(page: &Page) -> String {
    format!(
        "Page {} of {} ({} comments)",
        page.page_number, page.total_pages, page.total_rows
    )
}

/// One-line header of a row as plain text.
pub fn row_header(row: &Row, now: Timestamp) -> String {
    let label = match row.node.placeholder_label() {
        Some(label) => label.to_string(),
        None => format!(
            "{} ({})",
            row.node.author.as_deref().unwrap_or("unknown"),
            comment_age(&row.node, now)
        ),
    };
    format!("{}{}", depth_guide(row.depth), label)
}

/// Plain-text outline of a page: the summary line followed by one header per row.
pub fn page_outline(page: &Page, now: Timestamp) -> String {
    let mut out = page_summary(page);
    for row in &page.rows {
        out.push('\n');
        out.push_str(&row_header(row, now));
    }
    out
}
