//! jamchat is a terminal chat client for two streaming LLM backends with a
//! realtime voice mode.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation histories, the streaming and
//!   regeneration controllers, persistence and the voice session.
//! - [`ui`] projects history entries into message views and prints them.
//! - [`commands`] parses the slash commands typed at the chat prompt.
//! - [`api`] defines the wire payloads of the text and voice endpoints.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod ui;
pub mod utils;
