use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, InputMode, LineEditor, Screen, SettingsField};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::TurnFinished(reply) => app.finish_turn(reply),
        AppEvent::ModelsFetched { ticket, result } => app.models_fetched(ticket, result),
        AppEvent::Speech(event) => app.handle_speech(event),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }
    if key.code == KeyCode::Char('r') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.toggle_dictation();
        return;
    }

    app.notice = None;

    // Pickers sit on top of everything else
    if app.show_provider_picker {
        handle_provider_picker(app, key);
        return;
    }
    if app.show_model_picker {
        handle_model_picker(app, key);
        return;
    }

    match (app.screen, app.input_mode) {
        (Screen::Chat, InputMode::Normal) => handle_chat_normal(app, key),
        (Screen::Chat, InputMode::Editing) => handle_chat_editing(app, key),
        (Screen::Settings, InputMode::Normal) => handle_settings_normal(app, key),
        (Screen::Settings, InputMode::Editing) => handle_settings_editing(app, key),
    }
}

fn handle_provider_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_provider_picker = false;
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.provider_picker_nav_down();
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.provider_picker_nav_up();
        }
        KeyCode::Enter => {
            app.select_provider();
        }
        _ => {}
    }
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_model_picker = false;
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.model_picker_nav_down();
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.model_picker_nav_up();
        }
        KeyCode::Enter => {
            app.select_model();
        }
        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Start typing
        KeyCode::Char('i') | KeyCode::Char('a') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            app.draft.end();
        }

        // Scroll chat
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_chat_down(app.chat_height / 2);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_chat_up(app.chat_height / 2);
        }
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        // Conversation actions
        KeyCode::Char('e') => app.export_conversation(),
        KeyCode::Char('C') => app.clear_conversation(),
        KeyCode::Char('v') => app.toggle_dictation(),

        // Settings and pickers
        KeyCode::Char('s') | KeyCode::Tab => app.screen = Screen::Settings,
        KeyCode::Char('P') => app.open_provider_picker(),
        KeyCode::Char('M') => app.open_model_picker(),

        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => app.send_draft(),
        KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
            app.screen = Screen::Settings;
        }
        _ => edit_line(&mut app.draft, key),
    }
}

fn handle_settings_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Back to chat
        KeyCode::Esc | KeyCode::Tab => {
            app.screen = Screen::Chat;
            app.input_mode = InputMode::Editing;
        }

        KeyCode::Char('j') | KeyCode::Down => app.settings_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.settings_nav_up(),

        // Sliders and toggles
        KeyCode::Char('h') | KeyCode::Left | KeyCode::Char('-') => app.adjust_setting(-1),
        KeyCode::Char('l') | KeyCode::Right | KeyCode::Char('+') => app.adjust_setting(1),

        KeyCode::Enter => {
            let field = app.selected_field();
            if field.is_text() {
                app.begin_field_edit();
            } else if field == SettingsField::Provider {
                app.open_provider_picker();
            } else {
                app.adjust_setting(1);
            }
        }

        KeyCode::Char('r') => app.refresh_models(),
        KeyCode::Char('P') => app.open_provider_picker(),
        KeyCode::Char('M') => app.open_model_picker(),

        _ => {}
    }
}

fn handle_settings_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.cancel_field_edit(),
        KeyCode::Enter => app.commit_field_edit(),
        _ => {
            if let Some(editor) = app.field_editor.as_mut() {
                edit_line(editor, key);
            }
        }
    }
}

/// Cursor movement and character editing shared by every text box.
fn edit_line(editor: &mut LineEditor, key: KeyEvent) {
    match key.code {
        KeyCode::Backspace => editor.backspace(),
        KeyCode::Delete => editor.delete(),
        KeyCode::Left => editor.left(),
        KeyCode::Right => editor.right(),
        KeyCode::Home => editor.home(),
        KeyCode::End => editor.end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => editor.insert(c),
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);

    if app.screen != Screen::Chat || !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_chat_down(3),
        MouseEventKind::ScrollUp => app.scroll_chat_up(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use local_chat::speech::SpeechInput;
    use local_chat::{ChatSession, ModelConfig, ProviderAdapter, ReqwestTransport};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn app() -> App {
        let session = ChatSession::new(
            ModelConfig::default(),
            ProviderAdapter::new(Arc::new(ReqwestTransport::new())),
        );
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (speech_tx, _speech_rx) = mpsc::unbounded_channel();
        App::new(session, SpeechInput::unavailable(), speech_tx, events_tx, PathBuf::from("."))
    }

    fn press(app: &mut App, code: KeyCode) {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn test_typing_fills_draft() {
        let mut app = app();
        for c in "Hi!".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.draft.text, "H!");
    }

    #[test]
    fn test_blank_enter_sends_nothing() {
        let mut app = app();
        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Enter);
        assert!(app.session.conversation().is_empty());
        assert!(!app.session.is_in_flight());
    }

    #[test]
    fn test_tab_toggles_settings() {
        let mut app = app();
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.screen, Screen::Settings);
        assert_eq!(app.input_mode, InputMode::Normal);

        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Right);
        assert!((app.session.config().temperature - 0.8).abs() < 1e-6);

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.screen, Screen::Chat);
    }

    #[test]
    fn test_system_prompt_edit() {
        let mut app = app();
        press(&mut app, KeyCode::Tab);
        app.settings_state.select(Some(8));
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.input_mode, InputMode::Editing);

        // Clear the existing prompt and type a new one
        press(&mut app, KeyCode::Home);
        while !app.field_editor.as_ref().unwrap().text.is_empty() {
            press(&mut app, KeyCode::Delete);
        }
        for c in "Be terse.".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.session.config().system_prompt, "Be terse.");
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn test_escape_cancels_field_edit() {
        let mut app = app();
        press(&mut app, KeyCode::Tab);
        app.settings_state.select(Some(2));
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('x'));
        press(&mut app, KeyCode::Esc);

        assert!(app.field_editor.is_none());
        assert_eq!(app.session.config().model, "");
    }

    #[test]
    fn test_ctrl_c_quits() {
        let mut app = app();
        handle_key(&mut app, KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
    }
}
