//! Conversation controller.
//!
//! [`ChatSession`] owns the history store, the generation state and the
//! attachment tray, and drives one request/response cycle at a time. The
//! front end observes progress through [`SessionEvent`]s and cancels through
//! a cloned [`StopHandle`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::attachments::{AttachmentError, AttachmentTray, StagedAttachment};
use crate::core::backend::BackendId;
use crate::core::chat_stream::{CompletionBackend, CompletionRequest, StreamMessage};
use crate::core::config::Config;
use crate::core::generation::{GenerationState, StopHandle};
use crate::core::history::HistoryStore;
use crate::core::message::{Entry, EntryStatus, IdGenerator, Modification, Part, Role};
use crate::core::persistence::{AppState, StateStore};
use crate::core::profile::{Gender, UserProfile};
use crate::core::prompt::{
    Persona, BLOCKED_TEXT, EMPTY_TEXT, ERROR_TEXT, STOPPED_TEXT, UNPROCESSED_TEXT,
};
use crate::core::reveal::reveal;
use crate::core::search::{self, SearchHit};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A complete entry was appended.
    EntryAdded(Entry),
    /// An existing entry changed in place.
    EntryUpdated(Entry),
    EntryRemoved {
        id: String,
    },
    /// A model reply is being generated under this id.
    Pending {
        id: String,
    },
    /// The entry is in history; its text follows as reveal chunks.
    RevealStarted(Entry),
    RevealChunk {
        id: String,
        text: String,
    },
    RevealFinished {
        id: String,
        completed: bool,
    },
    /// The whole visible list must be re-rendered.
    HistoryReplaced {
        backend: BackendId,
        entries: Vec<Entry>,
    },
    AttachmentsChanged {
        staged: usize,
    },
    /// Voice mode status line; `None` hides it.
    Status(Option<String>),
}

/// How a generation ended, as recorded in history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub entry_id: String,
    pub status: Option<EntryStatus>,
    /// The reveal ran to the end without being stopped.
    pub revealed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    NotFound,
    Unchanged,
    Edited(Option<TurnOutcome>),
}

#[derive(Debug, Default)]
pub(crate) struct StreamResult {
    pub text: String,
    pub error: Option<String>,
    pub blocked: bool,
    pub stopped: bool,
}

impl StreamResult {
    fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Drains a completion stream until it ends or `cancel` fires.
pub(crate) async fn collect_stream(
    mut rx: mpsc::UnboundedReceiver<StreamMessage>,
    cancel: &CancellationToken,
) -> StreamResult {
    let mut result = StreamResult::default();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                result.stopped = true;
                break;
            }
            message = rx.recv() => match message {
                Some(StreamMessage::Chunk(text)) => result.text.push_str(&text),
                Some(StreamMessage::Error(error)) => {
                    warn!("completion stream failed: {error}");
                    result.error = Some(error);
                }
                Some(StreamMessage::Blocked(reason)) => {
                    info!(%reason, "prompt blocked by endpoint");
                    result.blocked = true;
                }
                Some(StreamMessage::End) | None => break,
            }
        }
    }
    result
}

pub struct ChatSession {
    config: Config,
    profile: UserProfile,
    history: HistoryStore,
    backend: Arc<dyn CompletionBackend>,
    generation: GenerationState,
    ids: IdGenerator,
    attachments: AttachmentTray,
    store: Option<StateStore>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ChatSession {
    pub fn new(
        config: Config,
        state: AppState,
        backend: Arc<dyn CompletionBackend>,
        store: Option<StateStore>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (profile, history) = state.into_parts();
        let ids = IdGenerator::seeded_from(history.all_ids());
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            config,
            profile,
            history,
            backend,
            generation: GenerationState::new(),
            ids,
            attachments: AttachmentTray::new(),
            store,
            events,
        };
        (session, rx)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn active_backend(&self) -> BackendId {
        self.history.active_backend()
    }

    pub fn is_generating(&self) -> bool {
        self.generation.is_generating()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.generation.stop_handle()
    }

    pub fn attachments(&self) -> &AttachmentTray {
        &self.attachments
    }

    pub fn persona(&self) -> Persona {
        Persona::new(&self.config, &self.profile)
    }

    /// Greeting shown in place of an empty conversation.
    pub fn welcome(&self) -> Option<String> {
        self.history
            .is_empty()
            .then(|| format!("Hi, {}!", self.profile.display_name()))
    }

    pub(crate) fn history_mut(&mut self) -> &mut HistoryStore {
        &mut self.history
    }

    pub(crate) fn generation_mut(&mut self) -> &mut GenerationState {
        &mut self.generation
    }

    pub(crate) fn completion_backend(&self) -> &dyn CompletionBackend {
        self.backend.as_ref()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn next_id_with_suffix(&mut self, suffix: &str) -> String {
        self.ids.next_with_suffix(suffix)
    }

    /// Writes the state record; failures are logged and otherwise ignored.
    pub fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(err) = store.save(&AppState::new(&self.profile, &self.history)) {
            warn!("{err}");
        }
    }

    pub fn stage_attachments(
        &mut self,
        batch: Vec<StagedAttachment>,
    ) -> Result<(), AttachmentError> {
        let backend = self.active_backend();
        if !backend.capabilities().attachments {
            return Err(AttachmentError::Unsupported(backend));
        }
        self.attachments.stage_all(batch)?;
        self.emit(SessionEvent::AttachmentsChanged {
            staged: self.attachments.len(),
        });
        Ok(())
    }

    pub fn remove_attachment(&mut self, index: usize) -> Option<StagedAttachment> {
        let removed = self.attachments.remove(index)?;
        self.emit(SessionEvent::AttachmentsChanged {
            staged: self.attachments.len(),
        });
        Some(removed)
    }

    /// Drops every staged attachment.
    pub fn clear_attachments(&mut self) {
        if !self.attachments.is_empty() {
            self.attachments.clear();
            self.emit(SessionEvent::AttachmentsChanged { staged: 0 });
        }
    }

    /// Appends a user message built from the staged attachments and `text`,
    /// then generates the reply. Blank input with nothing staged is ignored.
    pub async fn send(&mut self, text: &str) -> Option<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() && self.attachments.is_empty() {
            return None;
        }

        self.history.clear_modifications();

        let mut parts = self.attachments.take_parts();
        if !parts.is_empty() {
            self.emit(SessionEvent::AttachmentsChanged { staged: 0 });
        }
        if !text.is_empty() {
            parts.push(Part::text(text));
        }

        let entry = Entry::new(self.ids.next_id(), Role::User, parts);
        self.history.push(entry.clone());
        self.emit(SessionEvent::EntryAdded(entry));
        self.persist();

        self.stream_response().await
    }

    /// Generates a reply to the last entry, which must be a user entry.
    pub async fn stream_response(&mut self) -> Option<TurnOutcome> {
        let prompt_index = self.history.len().checked_sub(1)?;
        let prompt = self.history.get_index(prompt_index)?.clone();
        if !prompt.is_user() {
            return None;
        }

        let id = self.ids.next_id();
        let cancel = self.generation.begin(id.clone());
        self.emit(SessionEvent::Pending { id: id.clone() });
        debug!(%id, backend = %self.active_backend(), "generating reply");

        let request = self.request_for(prompt_index, &prompt, None);
        let rx = self.backend.start_stream(request, cancel.clone());
        let result = collect_stream(rx, &cancel).await;

        let entry = self.reply_entry(id, result, &prompt);
        self.history.push(entry.clone());
        let outcome = self.present(entry, false, &cancel).await;

        self.generation.finish();
        self.persist();
        Some(outcome)
    }

    /// Maps a finished stream to the entry stored in history.
    fn reply_entry(&self, id: String, result: StreamResult, prompt: &Entry) -> Entry {
        let prompt_has_media = prompt.has_media();
        if result.stopped {
            if result.has_text() {
                return Entry::model_text(id, result.text);
            }
            let text = if prompt_has_media {
                UNPROCESSED_TEXT
            } else {
                STOPPED_TEXT
            };
            return Entry::placeholder(id, EntryStatus::Stopped, text);
        }
        if result.error.is_some() {
            return Entry::placeholder(id, EntryStatus::Error, ERROR_TEXT);
        }
        if result.has_text() {
            return Entry::model_text(id, result.text);
        }

        let filter_suspected = self.active_backend() == BackendId::Primary
            && !self.profile.is_nsfw_enabled
            && !prompt_has_media;
        if result.blocked || filter_suspected {
            Entry::placeholder(id, EntryStatus::Blocked, BLOCKED_TEXT)
        } else {
            Entry::placeholder(id, EntryStatus::Empty, EMPTY_TEXT)
        }
    }

    /// Context for a request: the history before `prefix_end` without error
    /// placeholders, then the prompt.
    pub(crate) fn request_for(
        &self,
        prefix_end: usize,
        prompt: &Entry,
        modification: Option<Modification>,
    ) -> CompletionRequest {
        let backend = self.active_backend();
        let entries = self.history.entries();
        let mut contents: Vec<Entry> = entries[..prefix_end.min(entries.len())]
            .iter()
            .filter(|entry| entry.status != Some(EntryStatus::Error))
            .cloned()
            .collect();
        contents.push(prompt.clone());

        let persona = self.persona();
        let safety_settings = match backend {
            BackendId::Primary => persona.safety_settings(),
            BackendId::Alternate => Vec::new(),
        };
        CompletionRequest {
            backend,
            contents,
            system_instruction: persona.text_instruction(modification),
            safety_settings,
        }
    }

    /// Announces a finished entry. Replies and empty/blocked notices are
    /// revealed. Placeholders, and text kept from a stopped generation,
    /// appear at once.
    pub(crate) async fn present(
        &self,
        entry: Entry,
        replaced: bool,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let id = entry.id.clone();
        let status = entry.status;
        let revealable = !cancel.is_cancelled()
            && !matches!(status, Some(EntryStatus::Stopped | EntryStatus::Error));

        if !revealable {
            self.emit(if replaced {
                SessionEvent::EntryUpdated(entry)
            } else {
                SessionEvent::EntryAdded(entry)
            });
            return TurnOutcome {
                entry_id: id,
                status,
                revealed: false,
            };
        }

        let text = entry.text_or_empty().to_string();
        self.emit(SessionEvent::RevealStarted(entry));
        let completed = reveal(&text, self.config.reveal_interval(), cancel, |chunk| {
            self.emit(SessionEvent::RevealChunk {
                id: id.clone(),
                text: chunk.to_string(),
            })
        })
        .await;
        self.emit(SessionEvent::RevealFinished {
            id: id.clone(),
            completed,
        });

        TurnOutcome {
            entry_id: id,
            status,
            revealed: completed,
        }
    }

    /// Swaps the visible history. Staged files are dropped when the new
    /// backend is text-only.
    pub fn switch_backend(&mut self, backend: BackendId) -> bool {
        if !self.history.set_active(backend) {
            return false;
        }
        self.profile.current_model = backend;
        if !backend.capabilities().attachments {
            self.clear_attachments();
        }
        self.emit(SessionEvent::HistoryReplaced {
            backend,
            entries: self.history.entries().to_vec(),
        });
        self.persist();
        true
    }

    pub fn set_content_policy(&mut self, unfiltered: bool) {
        if self.profile.is_nsfw_enabled != unfiltered {
            self.profile.is_nsfw_enabled = unfiltered;
            self.persist();
        }
    }

    pub fn set_profile(&mut self, name: &str, gender: Gender) {
        self.profile.name = Some(name.trim().to_string());
        self.profile.gender = Some(gender);
        self.persist();
    }

    /// Forgets both histories and the profile and removes the state record.
    pub fn reset(&mut self) {
        self.history = HistoryStore::new(BackendId::default());
        self.profile = UserProfile::default();
        self.clear_attachments();
        if let Some(store) = &self.store {
            if let Err(err) = store.clear() {
                warn!("{err}");
            }
        }
        self.emit(SessionEvent::HistoryReplaced {
            backend: self.active_backend(),
            entries: Vec::new(),
        });
    }

    /// Rewrites a user entry's text, keeping its attachments, then
    /// regenerates the reply that follows it or, for the last entry,
    /// generates a fresh one.
    pub async fn edit_user_entry(&mut self, id: &str, new_text: &str) -> EditOutcome {
        let Some(index) = self.history.position(id) else {
            return EditOutcome::NotFound;
        };
        let new_text = new_text.trim();
        let Some(entry) = self.history.get_index_mut(index) else {
            return EditOutcome::NotFound;
        };
        if !entry.is_user() {
            return EditOutcome::NotFound;
        }
        if entry.text_or_empty() == new_text || (new_text.is_empty() && !entry.has_media()) {
            return EditOutcome::Unchanged;
        }

        entry.replace_text(new_text);
        let updated = entry.clone();
        self.emit(SessionEvent::EntryUpdated(updated));
        self.persist();

        let outcome = match self.history.get_index(index + 1) {
            Some(next) if next.is_model() => {
                let next_id = next.id.clone();
                self.regenerate(&next_id, None).await
            }
            Some(_) => None,
            None => self.stream_response().await,
        };
        EditOutcome::Edited(outcome)
    }

    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        search::search(self.history.entries(), query)
    }

    pub fn media_gallery(&self) -> Vec<String> {
        search::media_gallery(self.history.entries())
    }

    /// Appends an entry produced outside the request/response cycle, such as
    /// a voice transcript, to the active history.
    pub fn append_entry(&mut self, entry: Entry) {
        self.history.push(entry.clone());
        self.emit(SessionEvent::EntryAdded(entry));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat_stream::StreamMessage;
    use crate::utils::test_utils::{create_test_session, drain_events, ScriptedBackend};
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn send_hello_appends_user_then_model_entry() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["Hel", "lo ", "there"]);
        let (mut session, mut events) = create_test_session(backend.clone());

        let outcome = session.send("  hello ").await.expect("turn");

        let entries = session.history().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[0].text(), Some("hello"));
        assert_eq!(entries[1].role, Role::Model);
        assert_eq!(entries[1].text(), Some("Hello there"));
        assert_eq!(outcome.status, None);
        assert!(outcome.revealed);
        assert!(!session.is_generating());

        let revealed: String = drain_events(&mut events)
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::RevealChunk { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(revealed, "Hello there");
    }

    #[tokio::test]
    async fn blank_send_without_attachments_is_ignored() {
        let backend = ScriptedBackend::new();
        let (mut session, _events) = create_test_session(backend.clone());
        assert!(session.send("   ").await.is_none());
        assert!(session.history().is_empty());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn cancel_before_any_text_appends_stopped_placeholder() {
        let backend = ScriptedBackend::new();
        backend.push_hanging(Vec::new());
        let (mut session, _events) = create_test_session(backend.clone());

        let handle = session.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.stop();
        });

        let outcome = session.send("hello").await.expect("turn");
        let entries = session.history().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].status, Some(EntryStatus::Stopped));
        assert_eq!(entries[1].text(), Some(STOPPED_TEXT));
        assert_eq!(outcome.status, Some(EntryStatus::Stopped));
        assert!(!session.is_generating());
    }

    #[tokio::test]
    async fn cancel_after_partial_text_keeps_partial_reply() {
        let backend = ScriptedBackend::new();
        backend.push_hanging(vec![StreamMessage::Chunk("Partial".into())]);
        let (mut session, _events) = create_test_session(backend.clone());

        let handle = session.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.stop();
        });

        session.send("hello").await.expect("turn");
        let reply = &session.history().entries()[1];
        assert_eq!(reply.text(), Some("Partial"));
        assert_eq!(reply.status, None);
    }

    #[tokio::test]
    async fn partial_text_from_a_stop_is_shown_at_once() {
        let backend = ScriptedBackend::new();
        backend.push_hanging(vec![StreamMessage::Chunk("Half an ans".into())]);
        let (mut session, mut events) = create_test_session(backend.clone());

        let handle = session.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.stop();
        });

        let outcome = session.send("hello").await.expect("turn");
        assert!(!outcome.revealed);

        let events = drain_events(&mut events);
        assert!(!events
            .iter()
            .any(|event| matches!(event, SessionEvent::RevealStarted(_))));
        let shown = events.iter().find_map(|event| match event {
            SessionEvent::EntryAdded(entry) if entry.is_model() => entry.text(),
            _ => None,
        });
        assert_eq!(shown, Some("Half an ans"));
    }

    #[tokio::test]
    async fn stop_during_reveal_keeps_history_and_rearms() {
        let backend = ScriptedBackend::new();
        let alphabet = "abcdefghijklmnopqrstuvwxyz";
        backend.push_reply(&[alphabet]);
        backend.push_reply(&["ok"]);
        let config = Config {
            reveal_interval_ms: 10,
            ..crate::utils::test_utils::test_config()
        };
        let state = AppState {
            user_profile: crate::utils::test_utils::test_profile(),
            ..Default::default()
        };
        let (mut session, mut events) = ChatSession::new(config, state, backend.clone(), None);

        let handle = session.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            handle.stop();
        });

        let outcome = session.send("spell it").await.expect("turn");
        assert_eq!(outcome.status, None);
        assert!(!outcome.revealed);
        assert!(!session.is_generating());

        let reply = &session.history().entries()[1];
        assert_eq!(reply.text(), Some(alphabet));
        assert_eq!(reply.status, None);

        let events = drain_events(&mut events);
        let revealed: String = events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::RevealChunk { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(!revealed.is_empty());
        assert!(revealed.len() < alphabet.len());
        assert!(alphabet.starts_with(&revealed));
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::RevealFinished {
                completed: false,
                ..
            }
        )));

        let next = session.send("again").await.expect("turn");
        assert!(next.revealed);
        assert_eq!(session.history().entries()[3].text(), Some("ok"));
    }

    #[tokio::test]
    async fn transport_error_yields_single_error_entry() {
        let backend = ScriptedBackend::new();
        backend.push_script(vec![
            StreamMessage::Chunk("half".into()),
            StreamMessage::Error("API Error: boom".into()),
            StreamMessage::End,
        ]);
        let (mut session, _events) = create_test_session(backend.clone());

        let outcome = session.send("hello").await.expect("turn");
        assert_eq!(outcome.status, Some(EntryStatus::Error));
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history().entries()[1].text(), Some(ERROR_TEXT));
    }

    #[tokio::test]
    async fn blank_reply_is_blocked_when_filter_is_on() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["  "]);
        backend.push_reply(&[]);
        let (mut session, _events) = create_test_session(backend.clone());

        session.send("hello").await.expect("turn");
        assert_eq!(
            session.history().entries()[1].status,
            Some(EntryStatus::Blocked)
        );

        session.set_content_policy(true);
        session.send("again").await.expect("turn");
        let last = session.history().last().expect("entry");
        assert_eq!(last.status, Some(EntryStatus::Empty));
        assert_eq!(last.text(), Some(EMPTY_TEXT));
    }

    #[tokio::test]
    async fn reported_block_wins_even_when_unfiltered() {
        let backend = ScriptedBackend::new();
        backend.push_script(vec![StreamMessage::Blocked("SAFETY".into()), StreamMessage::End]);
        let (mut session, _events) = create_test_session(backend.clone());
        session.set_content_policy(true);

        session.send("hello").await.expect("turn");
        assert_eq!(
            session.history().last().and_then(|entry| entry.status),
            Some(EntryStatus::Blocked)
        );
    }

    #[tokio::test]
    async fn request_excludes_error_entries_and_carries_persona() {
        let backend = ScriptedBackend::new();
        backend.push_script(vec![StreamMessage::Error("boom".into()), StreamMessage::End]);
        backend.push_reply(&["ok"]);
        let (mut session, _events) = create_test_session(backend.clone());

        session.send("first").await.expect("turn");
        session.send("second").await.expect("turn");

        let requests = backend.requests();
        let second = &requests[1];
        let texts: Vec<_> = second
            .contents
            .iter()
            .map(|entry| entry.text_or_empty().to_string())
            .collect();
        assert_eq!(texts, ["first", "second"]);
        assert!(second.system_instruction.contains("The user's name is Velly."));
        assert!(second.safety_settings.is_empty());
    }

    #[tokio::test]
    async fn sending_clears_stored_modifications() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["one"]);
        backend.push_reply(&["short"]);
        backend.push_reply(&["two"]);
        let (mut session, _events) = create_test_session(backend.clone());

        session.send("q1").await.expect("turn");
        let reply_id = session.history().entries()[1].id.clone();
        session
            .regenerate(&reply_id, Some(Modification::Shorter))
            .await
            .expect("regen");
        assert_eq!(
            session.history().entries()[1].modification,
            Some(Modification::Shorter)
        );

        session.send("q2").await.expect("turn");
        assert!(session
            .history()
            .entries()
            .iter()
            .all(|entry| entry.modification.is_none()));
    }

    #[tokio::test]
    async fn attachments_precede_text_and_tray_is_cleared() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["nice picture"]);
        let (mut session, _events) = create_test_session(backend.clone());

        session
            .stage_attachments(vec![StagedAttachment::from_bytes(
                "cat.png",
                Some("image/png"),
                &[1, 2, 3],
            )])
            .expect("stage");
        session.send("look").await.expect("turn");

        let prompt = &session.history().entries()[0];
        assert!(prompt.parts[0].as_inline().is_some());
        assert_eq!(prompt.parts[1].as_text(), Some("look"));
        assert!(session.attachments().is_empty());
        assert_eq!(session.media_gallery(), vec!["data:image/png;base64,AQID"]);
    }

    #[tokio::test]
    async fn stopping_a_media_prompt_uses_unprocessed_text() {
        let backend = ScriptedBackend::new();
        backend.push_hanging(Vec::new());
        let (mut session, _events) = create_test_session(backend.clone());
        session
            .stage_attachments(vec![StagedAttachment::from_bytes(
                "clip.mp4",
                Some("video/mp4"),
                b"v",
            )])
            .expect("stage");

        let handle = session.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.stop();
        });
        session.send("").await.expect("turn");

        assert_eq!(
            session.history().last().and_then(Entry::text),
            Some(UNPROCESSED_TEXT)
        );
    }

    #[tokio::test]
    async fn switching_backend_keeps_other_history_and_rerenders() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["primary reply"]);
        backend.push_reply(&["alternate reply"]);
        let (mut session, mut events) = create_test_session(backend.clone());

        session.send("on primary").await.expect("turn");
        let primary_before = session.history().entries().to_vec();
        drain_events(&mut events);

        assert!(session.switch_backend(BackendId::Alternate));
        match drain_events(&mut events).as_slice() {
            [SessionEvent::HistoryReplaced { backend, entries }] => {
                assert_eq!(*backend, BackendId::Alternate);
                assert!(entries.is_empty());
            }
            other => panic!("unexpected events: {other:?}"),
        }

        session.send("on alternate").await.expect("turn");
        assert_eq!(
            session.history().entries_for(BackendId::Primary),
            primary_before.as_slice()
        );
        assert_eq!(session.profile().current_model, BackendId::Alternate);
        assert_eq!(backend.requests()[1].backend, BackendId::Alternate);

        assert!(session.switch_backend(BackendId::Primary));
        assert_eq!(session.history().entries(), primary_before.as_slice());
        assert!(!session.switch_backend(BackendId::Primary));
    }

    #[tokio::test]
    async fn text_only_backend_rejects_and_clears_attachments() {
        let backend = ScriptedBackend::new();
        let (mut session, _events) = create_test_session(backend);
        session
            .stage_attachments(vec![StagedAttachment::from_bytes("a.png", Some("image/png"), b"a")])
            .expect("stage");

        session.switch_backend(BackendId::Alternate);
        assert!(session.attachments().is_empty());
        let err = session
            .stage_attachments(vec![StagedAttachment::from_bytes("b.png", Some("image/png"), b"b")])
            .expect_err("text only");
        assert!(matches!(err, AttachmentError::Unsupported(BackendId::Alternate)));
    }

    #[tokio::test]
    async fn editing_user_entry_regenerates_following_reply_once() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["first answer"]);
        backend.push_reply(&["edited answer"]);
        let (mut session, _events) = create_test_session(backend.clone());

        session.send("question").await.expect("turn");
        let user_id = session.history().entries()[0].id.clone();
        let model_id = session.history().entries()[1].id.clone();

        let outcome = session.edit_user_entry(&user_id, " better question ").await;
        match outcome {
            EditOutcome::Edited(Some(turn)) => assert_eq!(turn.entry_id, model_id),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let entries = session.history().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text(), Some("better question"));
        assert_eq!(entries[1].id, model_id);
        assert_eq!(entries[1].text(), Some("edited answer"));
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn editing_last_user_entry_streams_fresh_reply() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["fresh"]);
        let state = AppState {
            histories: [(BackendId::Primary, vec![Entry::user_text("msg-1", "orphan")])]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let (mut session, _events) = ChatSession::new(
            crate::utils::test_utils::test_config(),
            state,
            backend.clone(),
            None,
        );

        let outcome = session.edit_user_entry("msg-1", "adopted").await;
        assert!(matches!(outcome, EditOutcome::Edited(Some(_))));
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history().entries()[1].text(), Some("fresh"));
    }

    #[tokio::test]
    async fn unchanged_edit_is_a_no_op() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["answer"]);
        let (mut session, _events) = create_test_session(backend.clone());
        session.send("question").await.expect("turn");
        let user_id = session.history().entries()[0].id.clone();

        assert_eq!(
            session.edit_user_entry(&user_id, "question ").await,
            EditOutcome::Unchanged
        );
        assert_eq!(
            session.edit_user_entry("msg-missing", "x").await,
            EditOutcome::NotFound
        );
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn turns_are_persisted_and_reset_clears_everything() {
        let dir = TempDir::new().expect("temp dir");
        let store = StateStore::new(dir.path().join("state.json"));
        let backend = ScriptedBackend::new();
        backend.push_reply(&["saved"]);
        let (mut session, _events) = ChatSession::new(
            crate::utils::test_utils::test_config(),
            AppState::default(),
            backend.clone(),
            Some(store.clone()),
        );

        session.send("remember me").await.expect("turn");
        let (_, reloaded) = store.load().expect("load").into_parts();
        assert_eq!(reloaded.len(), 2);

        session.reset();
        assert!(session.history().is_empty());
        assert!(!store.path().exists());
        assert_eq!(session.welcome().as_deref(), Some("Hi, you!"));
    }

    #[tokio::test]
    async fn stopped_and_failed_turns_are_persisted() {
        let dir = TempDir::new().expect("temp dir");
        let store = StateStore::new(dir.path().join("state.json"));
        let backend = ScriptedBackend::new();
        backend.push_hanging(Vec::new());
        backend.push_script(vec![StreamMessage::Error("boom".into()), StreamMessage::End]);
        backend.push_hanging(vec![StreamMessage::Chunk("Kept".into())]);
        let (mut session, _events) = ChatSession::new(
            crate::utils::test_utils::test_config(),
            AppState::default(),
            backend.clone(),
            Some(store.clone()),
        );
        let stop_soon = |handle: StopHandle| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                handle.stop();
            })
        };

        stop_soon(session.stop_handle());
        session.send("first").await.expect("turn");
        let (_, saved) = store.load().expect("load").into_parts();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved.entries()[1].status, Some(EntryStatus::Stopped));

        session.send("second").await.expect("turn");
        let (_, saved) = store.load().expect("load").into_parts();
        assert_eq!(saved.len(), 4);
        assert_eq!(saved.entries()[3].status, Some(EntryStatus::Error));
        assert_eq!(saved.entries()[3].text(), Some(ERROR_TEXT));

        let error_id = saved.entries()[3].id.clone();
        stop_soon(session.stop_handle());
        session.regenerate(&error_id, None).await.expect("regen");
        let (_, saved) = store.load().expect("load").into_parts();
        assert_eq!(saved.len(), 4);
        assert_eq!(saved.entries()[3].id, error_id);
        assert_eq!(saved.entries()[3].text(), Some("Kept"));
        assert_eq!(saved.entries()[3].status, None);
    }

    #[tokio::test]
    async fn search_scans_active_history() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["Paris is the capital"]);
        let (mut session, _events) = create_test_session(backend);
        session.send("capital of France?").await.expect("turn");

        let hits = session.search("CAPITAL");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].role, Role::Model);
    }
}
