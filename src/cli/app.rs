//! Wiring shared by the voice and text commands

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use voxgen::assistant::{Assistant, AssistantDeps, AssistantEvent, AssistantStatus};
use voxgen::audio::SoxCapture;
use voxgen::config::Config;
use voxgen::events::Subscription;
use voxgen::generation::{GenerationOptions, HttpCompletionClient};
use voxgen::services::{ConfigCredentials, FileStore, StaticExamples, SyntaxCheckCompiler};
use voxgen::transcription::WebSocketConnector;

/// Open the persistent store configured in `config`
pub fn open_store(config: &Config) -> Result<Arc<FileStore>> {
    let data_dir = config.data_dir();
    let store = FileStore::open(&data_dir)
        .with_context(|| format!("Failed to open data store in {}", data_dir.display()))?;
    Ok(Arc::new(store))
}

/// Build an assistant backed by the real microphone and network services
pub fn build_assistant(config: &Config) -> Result<Assistant> {
    let deps = AssistantDeps {
        capture: Arc::new(SoxCapture::new(config.capture.program.clone())),
        connector: Arc::new(WebSocketConnector::new(
            config.transcription.session_url.clone(),
        )),
        credentials: Arc::new(ConfigCredentials::from_config(config)),
        completion: Arc::new(HttpCompletionClient::new(config.generation.endpoint.clone())),
        examples: Arc::new(StaticExamples::builtin()),
        store: open_store(config)?,
        compiler: Some(Arc::new(SyntaxCheckCompiler)),
        session: config.session_settings(),
        generation: GenerationOptions {
            model: None,
            max_tokens: config.generation.max_tokens,
        },
    };
    Assistant::new(deps).context("Failed to initialize assistant")
}

/// Mirror assistant events on the terminal. Streamed code goes to stdout,
/// everything else to stderr.
pub fn print_events(assistant: &Assistant) -> Subscription {
    assistant.events().subscribe(|event: &AssistantEvent| match event {
        AssistantEvent::StatusChanged { to, .. } => eprintln!("[{}]", to),
        AssistantEvent::ModeChanged(mode) => eprintln!("[mode: {:?}]", mode),
        AssistantEvent::PartialTranscript(text) => eprintln!("  ... {}", text),
        AssistantEvent::Transcript(text) => eprintln!("> {}", text),
        AssistantEvent::ResponseDelta(chunk) => {
            let mut out = std::io::stdout();
            let _ = out.write_all(chunk.as_bytes());
            let _ = out.flush();
        }
        AssistantEvent::Completed(entry) => {
            println!();
            eprintln!("Saved turn for {}", display_widget(&entry.component.widget_url));
        }
        AssistantEvent::Error(message) => eprintln!("Error: {}", message),
        AssistantEvent::Volume(_) | AssistantEvent::HistoryChanged => {}
    })
}

pub fn display_widget(widget_url: &str) -> &str {
    if widget_url.is_empty() {
        "(new widget)"
    } else {
        widget_url
    }
}

/// Turn a terminal error state into a command failure
pub fn ensure_no_error(assistant: &Assistant) -> Result<()> {
    let snapshot = assistant.snapshot();
    if snapshot.status == AssistantStatus::Error {
        bail!(
            "{}",
            snapshot.error.clone().unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}
