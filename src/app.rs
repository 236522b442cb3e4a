use std::path::PathBuf;
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use local_chat::speech::{RecognitionUpdate, RecognitionUpdates, SpeechInput};
use local_chat::{ChatSession, Message, Provider, RefreshRequest};

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Chat,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Rows of the settings panel, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    Provider,
    BaseUrl,
    Model,
    Temperature,
    MaxTokens,
    TopP,
    TopK,
    RepeatPenalty,
    SystemPrompt,
    StreamResponse,
}

impl SettingsField {
    pub const ALL: [SettingsField; 10] = [
        SettingsField::Provider,
        SettingsField::BaseUrl,
        SettingsField::Model,
        SettingsField::Temperature,
        SettingsField::MaxTokens,
        SettingsField::TopP,
        SettingsField::TopK,
        SettingsField::RepeatPenalty,
        SettingsField::SystemPrompt,
        SettingsField::StreamResponse,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SettingsField::Provider => "Provider",
            SettingsField::BaseUrl => "Base URL",
            SettingsField::Model => "Model",
            SettingsField::Temperature => "Temperature",
            SettingsField::MaxTokens => "Max tokens",
            SettingsField::TopP => "Top P",
            SettingsField::TopK => "Top K",
            SettingsField::RepeatPenalty => "Repeat penalty",
            SettingsField::SystemPrompt => "System prompt",
            SettingsField::StreamResponse => "Stream response",
        }
    }

    /// Free-text fields are edited in a line editor; the rest are sliders or toggles.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            SettingsField::BaseUrl | SettingsField::Model | SettingsField::SystemPrompt
        )
    }

    /// Only meaningful for one provider.
    pub fn ollama_only(&self) -> bool {
        matches!(self, SettingsField::TopK | SettingsField::RepeatPenalty)
    }
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text buffer with a character cursor.
#[derive(Debug, Clone, Default)]
pub struct LineEditor {
    pub text: String,
    pub cursor: usize,
}

impl LineEditor {
    pub fn with_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.chars().count();
        Self { text, cursor }
    }

    /// Replace the whole buffer, cursor at the end.
    pub fn set(&mut self, text: impl Into<String>) {
        *self = Self::with_text(text);
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }
}

fn step_f32(value: f32, direction: i32, step: f32, min: f32, max: f32) -> f32 {
    let stepped = (value + direction as f32 * step).clamp(min, max);
    (stepped * 100.0).round() / 100.0
}

fn step_u32(value: u32, direction: i32, step: u32, min: u32, max: u32) -> u32 {
    let stepped = value as i64 + direction as i64 * step as i64;
    stepped.clamp(min as i64, max as i64) as u32
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    pub session: ChatSession,
    pub speech_input: SpeechInput,
    speech_sink: RecognitionUpdates,
    events: UnboundedSender<AppEvent>,

    // Chat state
    pub draft: LineEditor,
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub chat_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Settings state
    pub settings_state: ListState,
    pub field_editor: Option<LineEditor>,

    // Model picker state
    pub show_model_picker: bool,
    pub model_picker_state: ListState,

    // Provider picker state
    pub show_provider_picker: bool,
    pub provider_picker_state: ListState,

    /// One-line status shown in the footer until the next key press.
    pub notice: Option<String>,
    pub export_dir: PathBuf,
}

impl App {
    pub fn new(
        session: ChatSession,
        speech_input: SpeechInput,
        speech_sink: RecognitionUpdates,
        events: UnboundedSender<AppEvent>,
        export_dir: PathBuf,
    ) -> Self {
        let mut settings_state = ListState::default();
        settings_state.select(Some(0));

        Self {
            should_quit: false,
            screen: Screen::Chat,
            input_mode: InputMode::Editing,

            session,
            speech_input,
            speech_sink,
            events,

            draft: LineEditor::default(),
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,

            animation_frame: 0,

            settings_state,
            field_editor: None,

            show_model_picker: false,
            model_picker_state: ListState::default(),

            show_provider_picker: false,
            provider_picker_state: ListState::default(),

            notice: None,
            export_dir,
        }
    }

    // Sending

    /// Send the draft unless it's blank or a reply is still pending.
    pub fn send_draft(&mut self) {
        if self.session.is_in_flight() {
            self.notice = Some("Still waiting for the previous reply".to_string());
            return;
        }
        let Some(turn) = self.session.begin_turn(&self.draft.text) else {
            return;
        };
        self.draft.clear();
        self.scroll_chat_to_bottom();

        let adapter = self.session.adapter().clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let reply = adapter.respond(&turn).await;
            let _ = tx.send(AppEvent::TurnFinished(reply));
        });
    }

    pub fn finish_turn(&mut self, reply: Message) {
        self.session.complete_turn(reply);
        self.scroll_chat_to_bottom();
    }

    // Model directory

    pub fn spawn_refresh(&self, request: RefreshRequest) {
        let adapter = self.session.adapter().clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = adapter.list_models(&request.config).await;
            let _ = tx.send(AppEvent::ModelsFetched {
                ticket: request.ticket,
                result,
            });
        });
    }

    pub fn refresh_models(&mut self) {
        let request = self.session.request_refresh();
        self.spawn_refresh(request);
    }

    pub fn change_provider(&mut self, provider: Provider) {
        let request = self.session.set_provider(provider);
        self.spawn_refresh(request);
    }

    pub fn change_base_url(&mut self, base_url: String) {
        if base_url == self.session.config().base_url {
            return;
        }
        let request = self.session.set_base_url(base_url);
        self.spawn_refresh(request);
    }

    pub fn models_fetched(&mut self, ticket: u64, result: Result<Vec<String>, local_chat::ChatError>) {
        self.session.apply_models(ticket, result);
    }

    // Speech

    pub fn toggle_dictation(&mut self) {
        match self.speech_input.toggle(self.speech_sink.clone()) {
            Ok(true) => {
                self.notice = Some("Listening...".to_string());
                self.screen = Screen::Chat;
                self.input_mode = InputMode::Editing;
            }
            Ok(false) => self.notice = Some("Stopped listening".to_string()),
            Err(e) => {
                warn!(error = %e, "could not start dictation");
                self.notice = Some(e.to_string());
            }
        }
    }

    pub fn handle_speech(&mut self, update: RecognitionUpdate) {
        let mut text = std::mem::take(&mut self.draft.text);
        let replaced = self.speech_input.handle_event(update, &mut text);
        if replaced {
            self.draft.set(text);
        } else {
            self.draft.text = text;
        }
    }

    // Conversation actions

    pub fn export_conversation(&mut self) {
        self.notice = Some(match self.session.export_to_dir(&self.export_dir) {
            Ok(path) => format!("Exported to {}", path.display()),
            Err(e) => {
                warn!(error = %e, "export failed");
                format!("Export failed: {}", e)
            }
        });
    }

    /// Refused while a reply is pending, so the reply can't land in an empty log.
    pub fn clear_conversation(&mut self) {
        if self.session.is_in_flight() {
            self.notice = Some("Wait for the reply before clearing".to_string());
            return;
        }
        self.session.clear_conversation();
        self.chat_scroll = 0;
        self.notice = Some("Conversation cleared".to_string());
    }

    // Settings

    pub fn selected_field(&self) -> SettingsField {
        self.settings_state
            .selected()
            .and_then(|i| SettingsField::ALL.get(i).copied())
            .unwrap_or(SettingsField::Provider)
    }

    pub fn settings_nav_down(&mut self) {
        let len = SettingsField::ALL.len();
        let i = self.settings_state.selected().unwrap_or(0);
        self.settings_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn settings_nav_up(&mut self) {
        let i = self.settings_state.selected().unwrap_or(0);
        self.settings_state.select(Some(i.saturating_sub(1)));
    }

    pub fn setting_value(&self, field: SettingsField) -> String {
        let config = self.session.config();
        match field {
            SettingsField::Provider => config.provider.display_name().to_string(),
            SettingsField::BaseUrl => config.base_url.clone(),
            SettingsField::Model => {
                if config.model.is_empty() {
                    "(none)".to_string()
                } else {
                    config.model.clone()
                }
            }
            SettingsField::Temperature => format!("{:.1}", config.temperature),
            SettingsField::MaxTokens => config.max_tokens.to_string(),
            SettingsField::TopP => format!("{:.2}", config.top_p),
            SettingsField::TopK => config.top_k.to_string(),
            SettingsField::RepeatPenalty => format!("{:.2}", config.repeat_penalty),
            SettingsField::SystemPrompt => config.system_prompt.clone(),
            SettingsField::StreamResponse => {
                let state = if config.stream_response { "on" } else { "off" };
                state.to_string()
            }
        }
    }

    /// Move the selected slider by one step (`direction` is -1 or 1).
    pub fn adjust_setting(&mut self, direction: i32) {
        let field = self.selected_field();
        if field == SettingsField::Provider {
            let next = self.session.config().provider.next();
            self.change_provider(next);
            return;
        }

        let config = self.session.config_mut();
        match field {
            SettingsField::Temperature => {
                config.temperature = step_f32(config.temperature, direction, 0.1, 0.0, 2.0)
            }
            SettingsField::MaxTokens => {
                config.max_tokens = step_u32(config.max_tokens, direction, 64, 1, 32768)
            }
            SettingsField::TopP => config.top_p = step_f32(config.top_p, direction, 0.05, 0.0, 1.0),
            SettingsField::TopK => config.top_k = step_u32(config.top_k, direction, 1, 1, 100),
            SettingsField::RepeatPenalty => {
                config.repeat_penalty = step_f32(config.repeat_penalty, direction, 0.05, 0.5, 2.0)
            }
            SettingsField::StreamResponse => config.stream_response = !config.stream_response,
            SettingsField::Provider
            | SettingsField::BaseUrl
            | SettingsField::Model
            | SettingsField::SystemPrompt => {}
        }
    }

    pub fn begin_field_edit(&mut self) {
        let field = self.selected_field();
        if !field.is_text() {
            return;
        }
        let config = self.session.config();
        let current = match field {
            SettingsField::BaseUrl => config.base_url.clone(),
            SettingsField::Model => config.model.clone(),
            _ => config.system_prompt.clone(),
        };
        self.field_editor = Some(LineEditor::with_text(current));
        self.input_mode = InputMode::Editing;
    }

    pub fn commit_field_edit(&mut self) {
        let Some(editor) = self.field_editor.take() else {
            return;
        };
        self.input_mode = InputMode::Normal;

        let value = editor.text.trim().to_string();
        match self.selected_field() {
            SettingsField::BaseUrl => {
                if !value.is_empty() {
                    self.change_base_url(value);
                }
            }
            SettingsField::Model => self.session.select_model(value),
            SettingsField::SystemPrompt => self.session.config_mut().system_prompt = value,
            _ => {}
        }
    }

    pub fn cancel_field_edit(&mut self) {
        self.field_editor = None;
        self.input_mode = InputMode::Normal;
    }

    // Model picker methods

    pub fn open_model_picker(&mut self) {
        let models = self.session.models();
        if models.is_empty() {
            self.notice = Some("No models listed by the server; refreshing".to_string());
            self.refresh_models();
            return;
        }
        // Select current model if in list, otherwise first
        let current_idx = models
            .iter()
            .position(|m| *m == self.session.config().model)
            .unwrap_or(0);
        self.model_picker_state.select(Some(current_idx));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.session.models().len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = self.session.models().get(i).cloned() {
                self.session.select_model(model);
            }
        }
        self.show_model_picker = false;
    }

    // Provider picker methods

    pub fn open_provider_picker(&mut self) {
        let current_idx = Provider::all()
            .iter()
            .position(|p| *p == self.session.config().provider)
            .unwrap_or(0);
        self.provider_picker_state.select(Some(current_idx));
        self.show_provider_picker = true;
    }

    pub fn provider_picker_nav_down(&mut self) {
        let len = Provider::all().len();
        let i = self.provider_picker_state.selected().unwrap_or(0);
        self.provider_picker_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn provider_picker_nav_up(&mut self) {
        let i = self.provider_picker_state.selected().unwrap_or(0);
        self.provider_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_provider(&mut self) {
        let selected = self
            .provider_picker_state
            .selected()
            .and_then(|i| Provider::all().get(i).copied());
        if let Some(provider) = selected {
            if provider != self.session.config().provider {
                self.change_provider(provider);
            }
        }
        self.show_provider_picker = false;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_in_flight() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    /// Scroll chat to bottom so the newest entry (or "Thinking...") is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in self.session.conversation().messages() {
            total_lines = total_lines.saturating_add(1); // Role line
            for line in msg.content().lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                let wrapped = if char_count == 0 { 1 } else { char_count / wrap_width + 1 };
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.session.is_in_flight() {
            total_lines = total_lines.saturating_add(2); // "AI:" + "Thinking..."
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }
}
