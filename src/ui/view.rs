//! View models for the conversation.
//!
//! Entries are projected once per render. Which actions a message offers
//! depends on the backend it belongs to and whether it came from voice mode.

use crate::core::backend::BackendId;
use crate::core::message::{Entry, EntryStatus, Modification, Role};
use crate::core::session::ChatSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    File,
}

impl MediaKind {
    fn from_mime(mime_type: &str) -> Self {
        match mime_type.split('/').next() {
            Some("image") => MediaKind::Image,
            Some("video") => MediaKind::Video,
            Some("audio") => MediaKind::Audio,
            _ => MediaKind::File,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::File => "file",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageActions {
    pub copy: bool,
    pub edit: bool,
    pub regenerate: bool,
    /// Shorter/longer variants of a reply.
    pub modify: bool,
}

impl MessageActions {
    pub fn for_entry(entry: &Entry, backend: BackendId) -> Self {
        let caps = backend.capabilities();
        let typed = !entry.is_from_audio();
        Self {
            copy: entry.has_text() && !entry.is_placeholder(),
            edit: entry.is_user() && caps.edit && typed,
            regenerate: entry.is_model() && caps.regenerate && typed,
            modify: entry.is_model() && caps.regenerate && typed && !entry.is_placeholder(),
        }
    }

    /// Slash commands that apply to the message.
    pub fn labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.edit {
            labels.push("edit");
        }
        if self.regenerate {
            labels.push("regen");
        }
        if self.modify {
            labels.extend(["shorter", "longer"]);
        }
        if self.copy {
            labels.push("copy");
        }
        labels
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub id: String,
    /// 1-based position in the visible list; commands address messages by it.
    pub number: usize,
    pub role: Role,
    pub text: Option<String>,
    pub media: Vec<MediaKind>,
    pub status: Option<EntryStatus>,
    pub modification: Option<Modification>,
    pub from_audio: bool,
    pub actions: MessageActions,
}

impl MessageView {
    pub fn from_entry(entry: &Entry, number: usize, backend: BackendId) -> Self {
        Self {
            id: entry.id.clone(),
            number,
            role: entry.role,
            text: entry.text().map(str::to_string),
            media: entry
                .attachments()
                .map(|media| MediaKind::from_mime(&media.mime_type))
                .collect(),
            status: entry.status,
            modification: entry.modification,
            from_audio: entry.is_from_audio(),
            actions: MessageActions::for_entry(entry, backend),
        }
    }
}

pub fn project(entries: &[Entry], backend: BackendId) -> Vec<MessageView> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| MessageView::from_entry(entry, index + 1, backend))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationView {
    pub backend: BackendId,
    /// Greeting shown instead of an empty list.
    pub welcome: Option<String>,
    pub messages: Vec<MessageView>,
}

impl ConversationView {
    pub fn of(session: &ChatSession) -> Self {
        let backend = session.active_backend();
        Self {
            backend,
            welcome: session.welcome(),
            messages: project(session.history().entries(), backend),
        }
    }

    /// Looks up a message by its display number.
    pub fn message(&self, number: usize) -> Option<&MessageView> {
        number
            .checked_sub(1)
            .and_then(|index| self.messages.get(index))
    }

    /// Display number of the newest model message.
    pub fn last_model_number(&self) -> Option<usize> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role.is_model())
            .map(|message| message.number)
    }
}
