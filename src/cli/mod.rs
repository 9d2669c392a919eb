//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments, sets up logging and the async
//! runtime, and dispatches to the chat REPL or the one-shot commands.

pub mod chat;
pub mod voice;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

use crate::core::backend::BackendId;
use crate::core::chat_stream::ChatStreamService;
use crate::core::config::Config;
use crate::core::live::devices::AudioFiles;
use crate::core::persistence::StateStore;
use crate::core::profile::Gender;
use crate::core::session::{ChatSession, SessionEvent};

/// Environment variable holding the log filter, e.g. `JAMCHAT_LOG=debug`.
pub const LOG_ENV: &str = "JAMCHAT_LOG";

#[derive(Parser)]
#[command(name = "jamchat")]
#[command(about = "A terminal chat client with streaming replies and a voice mode")]
#[command(
    long_about = "jamchat talks to two remote LLM backends, each with its own conversation \
history, and can hold realtime voice conversations against the primary backend.\n\n\
Environment Variables:\n\
  GEMINI_API_KEY      Key for the primary backend and voice mode\n\
  OPENROUTER_API_KEY  Key for the alternate backend\n\
  JAMCHAT_LOG         Log filter (default: warn), written to stderr\n\n\
Controls:\n\
  Enter             Send the message\n\
  Ctrl+C            Stop the reply being generated\n\
  Ctrl+D, /quit     Leave jamchat\n\
  /help             List slash commands"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Backend to chat with (primary or alternate)
    #[arg(short = 'b', long, global = true, value_parser = parse_backend)]
    pub backend: Option<BackendId>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// Hold a voice conversation through the microphone and speakers
    Voice {
        /// Read your side of the conversation from a WAV recording instead
        #[arg(long, value_name = "WAV")]
        input: Option<PathBuf>,
        /// Write the model's spoken replies to a WAV file instead
        #[arg(long, value_name = "WAV")]
        output: Option<PathBuf>,
    },
    /// Set your name and gender
    Profile {
        name: String,
        #[arg(value_parser = parse_gender)]
        gender: Gender,
    },
    /// Show the current configuration
    Config,
    /// Set a configuration value
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        value: Vec<String>,
    },
    /// Restore a configuration value to its default
    Unset {
        /// Configuration key to unset
        key: String,
    },
    /// Forget both conversations and the profile
    Reset,
}

fn parse_backend(value: &str) -> Result<BackendId, String> {
    BackendId::try_from(value)
}

fn parse_gender(value: &str) -> Result<Gender, String> {
    Gender::try_from(value)
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let config = Config::load()?;
            chat::run_chat(config, args.backend).await
        }
        Commands::Voice { input, output } => {
            let config = Config::load()?;
            voice::run_voice_command(config, AudioFiles { input, output }).await
        }
        Commands::Profile { name, gender } => {
            let config = Config::load()?;
            let (mut session, _events) = open_session(config)?;
            session.set_profile(&name, gender);
            println!("✅ Profile set: {} ({gender:?})", name.trim());
            Ok(())
        }
        Commands::Config => {
            let config = Config::load()?;
            config.print_all();
            Ok(())
        }
        Commands::Set { key, value } => {
            let mut config = Config::load()?;
            let value = value.join(" ");
            if let Err(e) = config.set_value(&key, &value) {
                eprintln!("❌ {e}");
                std::process::exit(1);
            }
            config.save()?;
            println!("✅ Set {key} to: {value}");
            Ok(())
        }
        Commands::Unset { key } => {
            let mut config = Config::load()?;
            if let Err(e) = config.unset_value(&key) {
                eprintln!("❌ {e}");
                std::process::exit(1);
            }
            config.save()?;
            println!("✅ Unset {key}");
            Ok(())
        }
        Commands::Reset => {
            let config = Config::load()?;
            StateStore::new(config.resolve_state_path()?).clear()?;
            println!("✅ Conversations and profile forgotten");
            Ok(())
        }
    }
}

/// Loads the saved state and wires a session to the HTTP backends.
pub fn open_session(
    config: Config,
) -> Result<(ChatSession, UnboundedReceiver<SessionEvent>), Box<dyn Error>> {
    let store = StateStore::new(config.resolve_state_path()?);
    let state = store.load_or_default();
    let backend = Arc::new(ChatStreamService::new(reqwest::Client::new(), &config));
    Ok(ChatSession::new(config, state, backend, Some(store)))
}
