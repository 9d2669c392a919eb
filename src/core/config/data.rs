use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Connection settings for one text-generation backend.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct VoiceConfig {
    /// Websocket endpoint of the realtime voice service, without the key.
    pub url: String,
    pub model: String,
    /// Prebuilt voice used for spoken replies.
    pub voice_name: String,
    pub api_key_env: String,
    /// Microphone to capture from, by name; unset uses the system default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Name the assistant introduces itself with
    pub assistant_name: String,
    /// Language the assistant is asked to reply in
    pub response_language: String,
    /// Delay between revealed characters; 0 reveals the whole reply at once
    pub reveal_interval_ms: u64,
    /// Overrides the location of the saved conversation state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
    pub primary: EndpointConfig,
    pub alternate: EndpointConfig,
    pub voice: VoiceConfig,
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
