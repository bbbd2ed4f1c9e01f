use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use voxgen::config::Config;

mod cli;

use cli::conversations::ConversationAction;

#[derive(Parser)]
#[command(name = "voxgen")]
#[command(about = "Speak a widget into existence - voice to UI code")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.voxgen/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one utterance (push-to-talk), then generate
    Talk,

    /// Continuous call mode until Ctrl-C
    Call,

    /// Generate from typed text instead of speech
    Type {
        /// Request text
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Show the active conversation's history
    History,

    /// Manage conversations
    Conversations {
        #[command(subcommand)]
        action: Option<ConversationAction>,
    },

    /// Write a default ~/.voxgen/config.toml
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match cli.command {
        Some(Commands::Init { force }) => {
            cli::init::init_command(cli.config, force)?;
        }
        Some(Commands::Call) => {
            let config = load_config(cli.config.as_ref())?;
            cli::talk::call_command(&config).await?;
        }
        Some(Commands::Type { text }) => {
            let config = load_config(cli.config.as_ref())?;
            cli::talk::type_command(&config, &text.join(" ")).await?;
        }
        Some(Commands::History) => {
            let config = load_config(cli.config.as_ref())?;
            cli::conversations::history_command(&config)?;
        }
        Some(Commands::Conversations { action }) => {
            let config = load_config(cli.config.as_ref())?;
            cli::conversations::conversations_command(
                &config,
                action.unwrap_or(ConversationAction::List),
            )?;
        }
        Some(Commands::Talk) | None => {
            let config = load_config(cli.config.as_ref())?;
            cli::talk::talk_command(&config).await?;
        }
    }

    Ok(())
}
