//! Voice and text turn commands

use anyhow::Result;

use voxgen::assistant::{AssistantSnapshot, AssistantStatus};
use voxgen::config::Config;

use super::app::{build_assistant, ensure_no_error, print_events};

fn is_busy(snapshot: &AssistantSnapshot) -> bool {
    matches!(
        snapshot.status,
        AssistantStatus::Thinking | AssistantStatus::Processing
    )
}

/// Record one push-to-talk utterance until Enter, then generate
pub async fn talk_command(config: &Config) -> Result<()> {
    let mut assistant = build_assistant(config)?;
    let _printer = print_events(&assistant);

    assistant.start_recording().await?;
    ensure_no_error(&assistant)?;
    eprintln!("Recording... press Enter to stop.");

    let mut enter = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    });

    while assistant.status() == AssistantStatus::Listening {
        tokio::select! {
            _ = &mut enter => {
                assistant.stop_recording()?;
                break;
            }
            more = assistant.process_next() => {
                if !more {
                    break;
                }
            }
        }
    }

    assistant.run_until(|s| !is_busy(s)).await;
    ensure_no_error(&assistant)
}

/// Continuous call mode until Ctrl-C
pub async fn call_command(config: &Config) -> Result<()> {
    let mut assistant = build_assistant(config)?;
    let _printer = print_events(&assistant);

    assistant.start_call().await?;
    ensure_no_error(&assistant)?;
    eprintln!("Call started. Press Ctrl-C to hang up.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            more = assistant.process_next() => {
                if !more || assistant.status() == AssistantStatus::Error {
                    break;
                }
            }
        }
    }

    assistant.end_call();
    if is_busy(assistant.snapshot()) {
        eprintln!("Finishing the current turn...");
        assistant.run_until(|s| !is_busy(s)).await;
    }
    ensure_no_error(&assistant)
}

/// Generate from typed text
pub async fn type_command(config: &Config, text: &str) -> Result<()> {
    let mut assistant = build_assistant(config)?;
    let _printer = print_events(&assistant);

    assistant.submit_text(text)?;
    assistant.run_until(|s| !is_busy(s)).await;
    ensure_no_error(&assistant)
}
