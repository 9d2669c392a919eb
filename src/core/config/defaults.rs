use std::env;
use std::time::Duration;

use crate::core::backend::BackendId;
use crate::core::config::data::{Config, EndpointConfig, VoiceConfig};

pub const DEFAULT_PRIMARY_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_PRIMARY_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_ALTERNATE_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_ALTERNATE_MODEL: &str = "deepseek/deepseek-chat";
pub const DEFAULT_VOICE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_VOICE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";
pub const DEFAULT_VOICE_NAME: &str = "Charon";
pub const DEFAULT_REVEAL_INTERVAL_MS: u64 = 5;

impl Default for Config {
    fn default() -> Self {
        Self {
            assistant_name: "Dzhem".to_string(),
            response_language: "Russian".to_string(),
            reveal_interval_ms: DEFAULT_REVEAL_INTERVAL_MS,
            state_path: None,
            primary: EndpointConfig {
                base_url: DEFAULT_PRIMARY_BASE_URL.to_string(),
                model: DEFAULT_PRIMARY_MODEL.to_string(),
                api_key_env: "GEMINI_API_KEY".to_string(),
            },
            alternate: EndpointConfig {
                base_url: DEFAULT_ALTERNATE_BASE_URL.to_string(),
                model: DEFAULT_ALTERNATE_MODEL.to_string(),
                api_key_env: "OPENROUTER_API_KEY".to_string(),
            },
            voice: VoiceConfig::default(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_VOICE_URL.to_string(),
            model: DEFAULT_VOICE_MODEL.to_string(),
            voice_name: DEFAULT_VOICE_NAME.to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            input_device: None,
            output_device: None,
        }
    }
}

impl Config {
    pub fn endpoint(&self, backend: BackendId) -> &EndpointConfig {
        match backend {
            BackendId::Primary => &self.primary,
            BackendId::Alternate => &self.alternate,
        }
    }

    pub fn endpoint_mut(&mut self, backend: BackendId) -> &mut EndpointConfig {
        match backend {
            BackendId::Primary => &mut self.primary,
            BackendId::Alternate => &mut self.alternate,
        }
    }

    pub fn reveal_interval(&self) -> Duration {
        Duration::from_millis(self.reveal_interval_ms)
    }
}

impl EndpointConfig {
    /// Reads the API key from the configured environment variable. An unset
    /// or blank variable yields `None`.
    pub fn api_key(&self) -> Option<String> {
        read_key(&self.api_key_env)
    }
}

impl VoiceConfig {
    pub fn api_key(&self) -> Option<String> {
        read_key(&self.api_key_env)
    }
}

fn read_key(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
