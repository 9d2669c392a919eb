use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Author of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "assistant")]
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }

    /// Role name used by OpenAI-compatible chat endpoints.
    pub fn to_chat_role(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_model(self) -> bool {
        self == Role::Model
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64 payload without the `data:` prefix.
    pub data: String,
}

impl InlineData {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }

    pub fn is_visual(&self) -> bool {
        self.is_image() || self.is_video()
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Part::InlineData {
            inline_data: InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            Part::InlineData { .. } => None,
        }
    }

    pub fn as_inline(&self) -> Option<&InlineData> {
        match self {
            Part::InlineData { inline_data } => Some(inline_data),
            Part::Text { .. } => None,
        }
    }
}

/// Adjustment requested for a regenerated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modification {
    Shorter,
    Longer,
}

impl Modification {
    pub fn as_str(self) -> &'static str {
        match self {
            Modification::Shorter => "shorter",
            Modification::Longer => "longer",
        }
    }
}

impl TryFrom<&str> for Modification {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "shorter" => Ok(Modification::Shorter),
            "longer" => Ok(Modification::Longer),
            other => Err(format!("invalid modification: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    Audio,
}

/// Marks a model entry that stands in for a reply instead of carrying one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Stopped,
    Error,
    Empty,
    Blocked,
}

impl EntryStatus {
    /// Placeholders that regeneration removes and reinserts rather than
    /// rewriting in place.
    pub fn is_replaceable(self) -> bool {
        matches!(self, EntryStatus::Stopped | EntryStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification: Option<Modification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<EntrySource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EntryStatus>,
}

impl Entry {
    pub fn new(id: impl Into<String>, role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: id.into(),
            role,
            parts,
            modification: None,
            source: None,
            status: None,
        }
    }

    pub fn user_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::User, vec![Part::text(text)])
    }

    pub fn model_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::Model, vec![Part::text(text)])
    }

    pub fn placeholder(id: impl Into<String>, status: EntryStatus, text: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::model_text(id, text)
        }
    }

    pub fn with_source(mut self, source: EntrySource) -> Self {
        self.source = Some(source);
        self
    }

    /// First text part, if any.
    pub fn text(&self) -> Option<&str> {
        self.parts.iter().find_map(Part::as_text)
    }

    pub fn text_or_empty(&self) -> &str {
        self.text().unwrap_or_default()
    }

    pub fn has_text(&self) -> bool {
        self.text().is_some_and(|text| !text.trim().is_empty())
    }

    pub fn attachments(&self) -> impl Iterator<Item = &InlineData> {
        self.parts.iter().filter_map(Part::as_inline)
    }

    pub fn has_media(&self) -> bool {
        self.attachments().next().is_some()
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_model(&self) -> bool {
        self.role.is_model()
    }

    pub fn is_from_audio(&self) -> bool {
        self.source == Some(EntrySource::Audio)
    }

    pub fn is_placeholder(&self) -> bool {
        self.status.is_some()
    }

    /// Replaces the text while keeping inline media, dropping the text part
    /// entirely when `text` is empty.
    pub fn replace_text(&mut self, text: &str) {
        self.parts.retain(|part| part.as_inline().is_some());
        if !text.is_empty() {
            self.parts.push(Part::text(text));
        }
    }
}

/// Produces `msg-<millis>` ids that never repeat within a process, even when
/// two entries are created in the same millisecond.
#[derive(Debug, Default, Clone)]
pub struct IdGenerator {
    last_millis: i64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts after the newest id found in `ids` so reloaded histories keep
    /// their uniqueness.
    pub fn seeded_from<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        let last_millis = ids
            .into_iter()
            .filter_map(parse_id_millis)
            .max()
            .unwrap_or_default();
        Self { last_millis }
    }

    pub fn next_id(&mut self) -> String {
        format!("msg-{}", self.next_millis())
    }

    pub fn next_with_suffix(&mut self, suffix: &str) -> String {
        format!("msg-{}-{suffix}", self.next_millis())
    }

    fn next_millis(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let millis = now.max(self.last_millis + 1);
        self.last_millis = millis;
        millis
    }
}

fn parse_id_millis(id: &str) -> Option<i64> {
    id.strip_prefix("msg-")?.split('-').next()?.parse().ok()
}

/// Upper-cases the first character, used for voice transcripts.
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_round_trips_in_browser_state_shape() {
        let raw = r#"{"id":"msg-1","role":"user","parts":[{"inlineData":{"mimeType":"image/png","data":"AAAA"}},{"text":"look"}]}"#;
        let entry: Entry = serde_json::from_str(raw).expect("entry");
        assert_eq!(entry.role, Role::User);
        assert_eq!(entry.text(), Some("look"));
        assert!(entry.has_media());
        assert_eq!(entry.modification, None);
        assert_eq!(serde_json::to_string(&entry).unwrap(), raw);
    }

    #[test]
    fn assistant_role_alias_is_accepted() {
        let entry: Entry =
            serde_json::from_str(r#"{"id":"a","role":"assistant","parts":[]}"#).unwrap();
        assert_eq!(entry.role, Role::Model);
    }

    #[test]
    fn replace_text_keeps_attachments() {
        let mut entry = Entry::new(
            "msg-1",
            Role::User,
            vec![Part::inline("image/png", "AAAA"), Part::text("old")],
        );
        entry.replace_text("new");
        assert_eq!(entry.parts.len(), 2);
        assert_eq!(entry.text(), Some("new"));

        entry.replace_text("");
        assert_eq!(entry.parts.len(), 1);
        assert!(entry.text().is_none());
    }

    #[test]
    fn ids_are_unique_within_the_same_millisecond() {
        let mut ids = IdGenerator::new();
        let first = ids.next_id();
        let second = ids.next_id();
        let third = ids.next_with_suffix("user");
        assert_ne!(first, second);
        assert!(third.ends_with("-user"));
        assert_ne!(parse_id_millis(&second), parse_id_millis(&third));
    }

    #[test]
    fn seeded_generator_starts_after_existing_ids() {
        let far_future = "msg-99999999999999-model";
        let mut ids = IdGenerator::seeded_from([far_future, "msg-5", "garbage"]);
        assert_eq!(ids.next_id(), "msg-100000000000000");
    }

    #[test]
    fn capitalize_handles_cyrillic() {
        assert_eq!(capitalize_first("привет"), "Привет");
        assert_eq!(capitalize_first(""), "");
    }

    #[test]
    fn invalid_modification_strings_are_rejected() {
        assert_eq!(Modification::try_from("Shorter"), Ok(Modification::Shorter));
        assert!(Modification::try_from("wider").is_err());
    }
}
