use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use crate::app::{App, ExportView};
use crate::transcript::Sender;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after_open = &rest[start + 2..];
        let Some(len) = after_open.find("**").filter(|&len| len > 0) else {
            break;
        };

        if start > 0 {
            spans.push(Span::raw(rest[..start].to_string()));
        }
        spans.push(Span::styled(
            after_open[..len].to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        rest = &after_open[len + 2..];
    }

    // No closing ** (or nothing left): keep the remainder literal
    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if let Some(view) = app.export.as_mut() {
        let popup_area = popup_rect(area);
        render_export_popup(view, frame, popup_area);
        app.popup_area = Some(popup_area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Shadow ", Style::default().fg(Color::Magenta).bold()),
        Span::styled(app.client.base_url().to_string(), Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn sender_line(sender: Sender, timestamp: &str) -> Line<'static> {
    let color = match sender {
        Sender::User => Color::Cyan,
        Sender::Assistant => Color::Yellow,
    };

    Line::from(vec![
        Span::styled(
            format!("{}:", sender.label()),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" [{timestamp}]"), Style::default().fg(Color::DarkGray)),
    ])
}

/// Every row of the chat log before wrapping. `App` measures the same lines
/// to know how far down to scroll.
pub(crate) fn chat_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    for message in app.transcript.messages() {
        lines.push(sender_line(message.sender, &message.timestamp));
        for line in message.text.lines() {
            match message.sender {
                Sender::User => lines.push(Line::from(line.to_string())),
                Sender::Assistant => lines.push(parse_markdown_line(line)),
            }
        }
        lines.push(Line::default());
    }

    if app.waiting {
        lines.push(Line::from(Span::styled(
            format!("{}:", Sender::Assistant.label()),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Shadow is typing{dots}"),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store area for mouse hit-testing and inner size for scroll calculations
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(" Conversation ");

    let chat = Paragraph::new(Text::from(chat_lines(app)))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let (title, border_color) = if app.waiting {
        (" Waiting for Shadow... ", Color::DarkGray)
    } else {
        (" Message (Enter to send) ", Color::Yellow)
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if app.export.is_none() {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = if app.export.is_some() {
        vec![
            Span::styled(" c ", key_style),
            Span::styled(" copy ", label_style),
            Span::styled(" d ", key_style),
            Span::styled(" download ", label_style),
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" close ", label_style),
        ]
    } else {
        vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" ^E ", key_style),
            Span::styled(" export ", label_style),
            Span::styled(" ^L ", key_style),
            Span::styled(" clear ", label_style),
            Span::styled(" PgUp/PgDn ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" ^C ", key_style),
            Span::styled(" quit ", label_style),
        ]
    };

    if let Some(notice) = app.notice_text() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(notice.to_string(), Style::default().fg(Color::Green)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Centered popup covering most of the screen
fn popup_rect(area: Rect) -> Rect {
    let popup_width = (area.width * 4 / 5).max(20).min(area.width);
    let popup_height = (area.height * 3 / 4).max(8).min(area.height);

    let popup_x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = area.y + (area.height.saturating_sub(popup_height)) / 2;

    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

fn render_export_popup(view: &mut ExportView, frame: &mut Frame, area: Rect) {
    // Clear the area behind the popup
    frame.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(" Export Conversation ");

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [text_area, buttons_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(inner);
    view.text_width = text_area.width;
    view.text_height = text_area.height;

    let transcript = Paragraph::new(view.text.as_str())
        .wrap(Wrap { trim: false })
        .scroll((view.scroll, 0));
    frame.render_widget(transcript, text_area);

    let button_style = Style::default().bg(Color::Magenta).fg(Color::White);
    let buttons = Line::from(vec![
        Span::styled(format!(" [c] {} ", view.copy_label()), button_style),
        Span::raw("  "),
        Span::styled(" [d] Download ", button_style),
        Span::raw("  "),
        Span::styled(" [Esc] Close ", Style::default().bg(Color::DarkGray).fg(Color::White)),
    ]);
    frame.render_widget(Paragraph::new(buttons), buttons_area);
}
