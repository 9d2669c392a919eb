use serde::{Deserialize, Serialize};

use crate::core::backend::BackendId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl TryFrom<&str> for Gender {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            other => Err(format!("unknown gender: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub current_model: BackendId,
    pub is_nsfw_enabled: bool,
}

impl UserProfile {
    /// Onboarding is complete once both a name and a gender are known.
    pub fn is_complete(&self) -> bool {
        self.name.as_deref().is_some_and(|name| !name.trim().is_empty()) && self.gender.is_some()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("you")
    }
}
