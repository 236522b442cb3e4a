use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use local_chat::{Provider, Role};

use crate::app::{App, InputMode, LineEditor, Screen, SettingsField};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Chat => render_chat_screen(app, frame, body_area),
        Screen::Settings => render_settings_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.show_provider_picker {
        render_provider_picker(app, frame, area);
    } else if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let config = app.session.config();
    let model = if config.model.is_empty() { "no model" } else { config.model.as_str() };

    let mut spans = vec![
        Span::styled(" local-chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{} @ {} ", config.provider.display_name(), config.base_url),
            Style::default().fg(Color::White),
        ),
        Span::styled(format!("[{}]", model), Style::default().fg(Color::Yellow)),
    ];

    if app.speech_input.is_listening() {
        spans.push(Span::styled(
            " ● REC ",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }
    if app.session.synthesizer().is_available() {
        spans.push(Span::styled(" 🔊", Style::default().fg(Color::DarkGray)));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::Chat => " CHAT ",
        Screen::Settings => " SETTINGS ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let hints: Vec<Span> = if let Some(notice) = &app.notice {
        vec![Span::styled(format!(" {} ", notice), Style::default().fg(Color::Yellow))]
    } else {
        let pairs: Vec<(&'static str, &'static str)> = match (app.screen, app.input_mode) {
            (Screen::Chat, InputMode::Editing) => vec![
                ("Enter", "send"),
                ("Esc", "stop typing"),
                ("^R", "dictate"),
                ("Tab", "settings"),
            ],
            (Screen::Chat, InputMode::Normal) => vec![
                ("i", "type"),
                ("j/k", "scroll"),
                ("v", "dictate"),
                ("e", "export"),
                ("C", "clear"),
                ("P", "provider"),
                ("M", "model"),
                ("s", "settings"),
                ("q", "quit"),
            ],
            (Screen::Settings, InputMode::Normal) => vec![
                ("j/k", "field"),
                ("h/l", "adjust"),
                ("Enter", "edit"),
                ("r", "reload models"),
                ("M", "model"),
                ("Esc", "chat"),
            ],
            (Screen::Settings, InputMode::Editing) => vec![("Enter", "save"), ("Esc", "cancel")],
        };
        pairs.into_iter().flat_map(|(k, l)| hint(k, l)).collect()
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn role_label(role: Role) -> (&'static str, Color) {
    match role {
        Role::User => ("You", Color::Cyan),
        Role::Assistant => ("AI", Color::Yellow),
        Role::System => ("System", Color::Red),
    }
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_area = Some(chat_area);
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.input_mode == InputMode::Normal {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title(format!(" Conversation ({}) ", app.session.conversation().len()));

    let conversation = app.session.conversation();
    let in_flight = app.session.is_in_flight();

    let chat_text = if conversation.is_empty() && !in_flight {
        Text::from(Span::styled(
            "Say something to your local model...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in conversation.messages() {
            let (label, color) = role_label(msg.role());
            lines.push(Line::from(vec![
                Span::styled(
                    format!("{}:", label),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!(" {}", msg.timestamp().format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
            ]));
            match msg.role() {
                Role::Assistant => {
                    for line in msg.content().lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
                Role::System => {
                    lines.push(Line::from(Span::styled(
                        msg.content().to_string(),
                        Style::default().fg(Color::Red),
                    )));
                }
                Role::User => {
                    for line in msg.content().lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                }
            }
            lines.push(Line::default());
        }

        if in_flight {
            lines.push(Line::from(Span::styled(
                "AI:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, chat_area);

    let (title, border_color) = if app.speech_input.is_listening() {
        (" Listening... (^R to stop) ", Color::Red)
    } else if in_flight {
        (" Waiting for reply... ", Color::DarkGray)
    } else if app.input_mode == InputMode::Editing {
        (" Message (Enter to send) ", Color::Yellow)
    } else {
        (" Message (i to type) ", Color::DarkGray)
    };

    let editing = app.input_mode == InputMode::Editing && !app.show_model_picker && !app.show_provider_picker;
    render_line_editor(frame, input_area, &app.draft, title, border_color, editing);
}

/// Bordered single-line input with horizontal scrolling to keep the cursor visible.
fn render_line_editor(
    frame: &mut Frame,
    area: Rect,
    editor: &LineEditor,
    title: &str,
    border_color: Color,
    show_cursor: bool,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title.to_string());

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = editor.cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = editor
        .text
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);

    frame.render_widget(input, area);

    if show_cursor {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_settings_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [list_area, detail_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    let provider = app.session.config().provider;
    let items: Vec<ListItem> = SettingsField::ALL
        .iter()
        .map(|field| {
            let unused = field.ollama_only() && provider != Provider::Ollama;
            let value_style = if unused {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::Green)
            };
            let mut value: String = app.setting_value(*field);
            if value.chars().count() > 60 {
                value = format!("{}...", value.chars().take(57).collect::<String>());
            }
            ListItem::new(Line::from(vec![
                Span::styled(format!(" {:<16}", field.label()), Style::default().fg(Color::White)),
                Span::styled(value, value_style),
                Span::styled(
                    if unused { "  (not sent to LM Studio)" } else { "" },
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" Settings ({} models available) ", app.session.models().len()));

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, list_area, &mut app.settings_state);

    let field = app.selected_field();
    if let Some(editor) = &app.field_editor {
        let title = format!(" Edit {} (Enter to save, Esc to cancel) ", field.label());
        render_line_editor(frame, detail_area, editor, &title, Color::Yellow, true);
    } else {
        let help = match field {
            SettingsField::Provider => "h/l to switch provider (resets the base URL), Enter for a list",
            SettingsField::BaseUrl | SettingsField::Model | SettingsField::SystemPrompt => {
                "Enter to edit"
            }
            SettingsField::StreamResponse => "Replies are always fetched whole; this flag is informational",
            _ => "h/l to adjust",
        };
        let detail = Paragraph::new(help)
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
        frame.render_widget(detail, detail_area);
    }
}

/// Centered popup rectangle of at most `width` x `height`.
fn popup_rect(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

fn picker_list<'a>(items: Vec<ListItem<'a>>, title: &'a str) -> List<'a> {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);

    List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ")
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let models = app.session.models();
    let popup_area = popup_rect(area, 50, models.len() as u16 + 2);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let selected_model = &app.session.config().model;
    let items: Vec<ListItem> = models
        .iter()
        .map(|model| {
            let style = if model == selected_model {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
        .collect();

    let list = picker_list(items, " Select Model (Enter to select, Esc to cancel) ");
    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

fn render_provider_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let providers = Provider::all();
    let popup_area = popup_rect(area, 45, providers.len() as u16 + 2);

    frame.render_widget(Clear, popup_area);

    let current = app.session.config().provider;
    let items: Vec<ListItem> = providers
        .iter()
        .map(|provider| {
            let is_current = *provider == current;
            let prefix = if is_current { "* " } else { "  " };
            let style = if is_current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(
                "{}{} ({})",
                prefix,
                provider.display_name(),
                provider.default_base_url()
            ))
            .style(style)
        })
        .collect();

    let list = picker_list(items, " Select Provider ");
    frame.render_stateful_widget(list, popup_area, &mut app.provider_picker_state);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_texts(line: &Line) -> Vec<String> {
        line.spans.iter().map(|s| s.content.to_string()).collect()
    }

    #[test]
    fn test_markdown_bold() {
        let line = parse_markdown_line("a **b** c");
        assert_eq!(span_texts(&line), vec!["a ", "b", " c"]);
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_markdown_unclosed_bold_is_literal() {
        let line = parse_markdown_line("2 **3");
        assert_eq!(span_texts(&line), vec!["2 **3"]);
    }

    #[test]
    fn test_markdown_single_star_is_literal() {
        let line = parse_markdown_line("5 * 4");
        assert_eq!(span_texts(&line), vec!["5 * 4"]);
    }

    #[test]
    fn test_popup_rect_centered_and_bounded() {
        let area = Rect::new(0, 0, 100, 40);
        let popup = popup_rect(area, 50, 10);
        assert_eq!(popup, Rect::new(25, 15, 50, 10));

        let small = popup_rect(Rect::new(0, 0, 20, 8), 50, 10);
        assert_eq!(small.width, 16);
        assert_eq!(small.height, 4);
    }
}
