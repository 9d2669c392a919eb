use serde::{Deserialize, Serialize};
use std::fmt;

/// Selectable remote model provider. Each backend owns an independent
/// conversation history.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    /// Multimodal generateContent endpoint; also hosts voice mode.
    #[default]
    #[serde(alias = "gemini")]
    Primary,
    /// Text-only OpenAI-compatible chat completions endpoint.
    #[serde(alias = "deepseek")]
    Alternate,
}

impl BackendId {
    pub const ALL: [BackendId; 2] = [BackendId::Primary, BackendId::Alternate];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendId::Primary => "primary",
            BackendId::Alternate => "alternate",
        }
    }

    pub fn capabilities(self) -> BackendCapabilities {
        match self {
            BackendId::Primary => BackendCapabilities {
                attachments: true,
                regenerate: true,
                edit: true,
                voice: true,
            },
            BackendId::Alternate => BackendCapabilities {
                attachments: false,
                regenerate: false,
                edit: false,
                voice: false,
            },
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for BackendId {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "primary" | "gemini" => Ok(BackendId::Primary),
            "alternate" | "deepseek" => Ok(BackendId::Alternate),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// What the front end offers for a backend. The controllers themselves work
/// with either backend; these flags gate user-facing actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub attachments: bool,
    pub regenerate: bool,
    pub edit: bool,
    pub voice: bool,
}
