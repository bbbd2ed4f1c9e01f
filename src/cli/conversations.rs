//! History and conversation management commands

use anyhow::Result;
use chrono::{Local, TimeZone};

use voxgen::assistant::ConversationStore;
use voxgen::config::Config;

use super::app::{display_widget, open_store};

/// Conversation management actions
#[derive(Debug, Clone, clap::Subcommand)]
pub enum ConversationAction {
    /// List conversations, most recent first
    List,
    /// Start a new conversation and make it active
    New,
    /// Make another conversation active
    Switch { id: String },
    /// Delete a conversation
    Delete { id: String },
    /// Rename a conversation
    Rename { id: String, title: String },
}

fn format_time(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn open(config: &Config) -> Result<ConversationStore> {
    let store = open_store(config)?;
    Ok(ConversationStore::open(store)?)
}

/// Print the active conversation's turns
pub fn history_command(config: &Config) -> Result<()> {
    let store = open(config)?;
    let title = store
        .active()
        .map(|c| c.title.clone())
        .unwrap_or_default();
    let history = store.history();

    if history.is_empty() {
        println!("No turns in \"{}\" yet.", title);
        return Ok(());
    }

    println!("{} ({} turns):\n", title, history.len());
    for (index, entry) in history.entries.iter().enumerate() {
        let marker = if history.current_index == Some(index) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:>2}. [{}] {} {}",
            marker,
            index,
            entry.intent,
            format_time(entry.timestamp),
            display_widget(&entry.component.widget_url)
        );
        println!("      {}", entry.transcript);
    }
    Ok(())
}

pub fn conversations_command(config: &Config, action: ConversationAction) -> Result<()> {
    let mut store = open(config)?;

    match action {
        ConversationAction::List => {
            let active = store.active_id().to_string();
            for conversation in store.list() {
                let marker = if conversation.id == active { "*" } else { " " };
                println!(
                    "{} {}  {}  {}",
                    marker,
                    conversation.id,
                    format_time(conversation.updated_at),
                    conversation.title
                );
                if !conversation.preview_text.is_empty() {
                    println!("      {}", conversation.preview_text);
                }
            }
        }
        ConversationAction::New => {
            let conversation = store.new_conversation()?;
            println!("Created {}", conversation.id);
        }
        ConversationAction::Switch { id } => {
            store.switch(&id)?;
            println!("Active: {}", id);
        }
        ConversationAction::Delete { id } => {
            store.delete(&id)?;
            println!("Deleted {}", id);
        }
        ConversationAction::Rename { id, title } => {
            store.rename(&id, &title)?;
            println!("Renamed {}", id);
        }
    }
    Ok(())
}
