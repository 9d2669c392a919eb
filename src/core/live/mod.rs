//! Realtime voice mode.
//!
//! [`LiveSession`] is a pure state machine: it consumes server messages,
//! microphone frames and clock readings and answers with [`LiveEffect`]s.
//! The driver applies those effects against the transport, the speaker and
//! the chat session's history.

pub mod devices;
pub mod driver;
pub mod pcm;
pub mod playback;
pub mod session;
pub mod system_audio;
pub mod transcript;
pub mod transport;

use std::error::Error as StdError;
use std::fmt;

pub use driver::{format_elapsed, VoiceControl, VoiceDevices, VoiceSummary};
pub use session::{LiveEffect, LiveSession, LiveState};

pub const STATUS_THINKING: &str = "Thinking...";
pub const STATUS_NO_MICROPHONE: &str = "No microphone access";
pub const STATUS_CONNECTION_ERROR: &str = "Connection error";
pub const STATUS_NO_SPEAKER: &str = "No audio output";

type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug)]
pub enum LiveError {
    /// A live session is already connecting or open.
    AlreadyActive,
    /// Voice mode is only offered on the primary backend.
    Unsupported,
    MissingApiKey(String),
    Microphone(BoxError),
    Speaker(BoxError),
    Connect(BoxError),
    Transport(BoxError),
    Protocol(BoxError),
    Audio(BoxError),
}

impl fmt::Display for LiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveError::AlreadyActive => write!(f, "A voice session is already running"),
            LiveError::Unsupported => write!(f, "Voice mode needs the primary backend"),
            LiveError::MissingApiKey(var) => {
                write!(f, "Environment variable {var} is not set")
            }
            LiveError::Microphone(reason) => write!(f, "Microphone unavailable: {reason}"),
            LiveError::Speaker(reason) => write!(f, "Speaker unavailable: {reason}"),
            LiveError::Connect(reason) => write!(f, "Failed to connect voice session: {reason}"),
            LiveError::Transport(reason) => write!(f, "Voice connection failed: {reason}"),
            LiveError::Protocol(reason) => write!(f, "Unexpected voice message: {reason}"),
            LiveError::Audio(reason) => write!(f, "Invalid audio: {reason}"),
        }
    }
}

impl StdError for LiveError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            LiveError::Microphone(source)
            | LiveError::Speaker(source)
            | LiveError::Connect(source)
            | LiveError::Transport(source)
            | LiveError::Protocol(source)
            | LiveError::Audio(source) => Some(source.as_ref()),
            LiveError::AlreadyActive | LiveError::Unsupported | LiveError::MissingApiKey(_) => {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_are_exposed_as_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no device");
        let err = LiveError::Microphone(io.into());
        assert_eq!(err.to_string(), "Microphone unavailable: no device");
        let source = err.source().expect("source");
        assert!(source.downcast_ref::<std::io::Error>().is_some());

        assert!(LiveError::Unsupported.source().is_none());
    }
}
