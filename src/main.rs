use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use local_chat::speech::{
    CommandRecognizer, CommandSynthesizer, SilentSynthesizer, SpeechInput, SpeechSynthesizer,
};
use local_chat::{ChatSession, Config, Provider, ProviderAdapter};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "local-chat")]
#[command(about = "Chat with a local Ollama or LM Studio server from the terminal")]
#[command(version)]
struct Cli {
    /// Provider to talk to: ollama or lmstudio
    #[arg(short, long)]
    provider: Option<String>,

    /// Server base URL (defaults to the provider's usual localhost port)
    #[arg(short, long)]
    base_url: Option<String>,

    /// Model to select on startup
    #[arg(short, long)]
    model: Option<String>,

    /// System prompt sent with every request
    #[arg(long)]
    system_prompt: Option<String>,

    /// Directory that conversation exports are written to
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Command that speaks assistant replies, text passed as the last argument
    #[arg(long)]
    tts_command: Option<String>,

    /// Command that prints recognized speech, one line per phrase
    #[arg(long)]
    stt_command: Option<String>,

    /// Read settings from this file instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Command-line flags win over the config file.
    fn apply(self, config: &mut Config) -> Result<()> {
        if let Some(provider) = self.provider {
            if Provider::from_str(&provider).is_none() {
                anyhow::bail!("unknown provider '{}', expected ollama or lmstudio", provider);
            }
            config.provider = Some(provider);
        }
        if self.base_url.is_some() {
            config.base_url = self.base_url;
        }
        if self.model.is_some() {
            config.model = self.model;
        }
        if self.system_prompt.is_some() {
            config.system_prompt = self.system_prompt;
        }
        if self.export_dir.is_some() {
            config.export_dir = self.export_dir;
        }
        if self.tts_command.is_some() {
            config.tts_command = self.tts_command;
        }
        if self.stt_command.is_some() {
            config.stt_command = self.stt_command;
        }
        Ok(())
    }
}

/// Log to a file; the terminal belongs to the UI.
fn init_logging() {
    let Some(dir) = dirs::cache_dir().map(|d| d.join("local-chat")) else {
        return;
    };
    if fs::create_dir_all(&dir).is_err() {
        return;
    }
    let Ok(file) = File::create(dir.join("local-chat.log")) else {
        return;
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "local_chat=info".into()),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Config {
    let loaded = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    loaded.unwrap_or_else(|e| {
        warn!(error = %e, "could not read config, using defaults");
        Config::new()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let mut config = load_config(cli.config.as_ref());
    cli.apply(&mut config)?;

    let synthesizer: Arc<dyn SpeechSynthesizer> = match config
        .tts_command
        .as_deref()
        .and_then(CommandSynthesizer::from_command_line)
    {
        Some(synth) => Arc::new(synth),
        None => Arc::new(SilentSynthesizer),
    };
    let speech_input = match config
        .stt_command
        .as_deref()
        .and_then(CommandRecognizer::from_command_line)
    {
        Some(recognizer) => SpeechInput::new(Box::new(recognizer)),
        None => SpeechInput::unavailable(),
    };

    let model_config = config.model_config();
    info!(
        provider = model_config.provider.as_str(),
        base_url = %model_config.base_url,
        "starting local-chat"
    );

    let session = ChatSession::new(model_config, ProviderAdapter::default())
        .with_synthesizer(synthesizer);

    let (speech_tx, speech_rx) = mpsc::unbounded_channel();
    let mut events = EventHandler::new(speech_rx);
    let mut app = App::new(session, speech_input, speech_tx, events.sender(), config.export_dir());

    // Populate the model list in the background
    app.refresh_models();

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    info!("exiting");
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    app.speech_input.stop();
    Ok(())
}
