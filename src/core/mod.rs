pub mod attachments;
pub mod backend;
pub mod chat_stream;
pub mod config;
pub mod generation;
pub mod history;
pub mod live;
pub mod message;
pub mod persistence;
pub mod profile;
pub mod prompt;
pub mod regenerate;
pub mod reveal;
pub mod search;
pub mod session;
