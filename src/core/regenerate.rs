//! Regenerating a model reply in place, optionally shorter or longer.

use tracing::{debug, warn};

use crate::core::message::{Entry, EntryStatus, Modification};
use crate::core::prompt::{EMPTY_TEXT, ERROR_TEXT, UNPROCESSED_TEXT};
use crate::core::session::{collect_stream, ChatSession, SessionEvent, StreamResult, TurnOutcome};

impl ChatSession {
    /// Re-asks the model for the reply with id `model_entry_id`, replaying the
    /// nearest preceding user entry against the history before it.
    ///
    /// Without a new `modification` the one stored on the entry is reused.
    /// Unknown ids and replies with no preceding user entry are ignored. The
    /// history length never changes.
    pub async fn regenerate(
        &mut self,
        model_entry_id: &str,
        modification: Option<Modification>,
    ) -> Option<TurnOutcome> {
        let index = self.history().position(model_entry_id)?;
        let target = self.history().get_index(index)?;
        if !target.is_model() {
            return None;
        }
        let Some(prompt_index) = self.history().preceding_user_index(index) else {
            warn!(id = model_entry_id, "cannot regenerate: no preceding user prompt");
            return None;
        };
        let prompt = self.history().get_index(prompt_index)?.clone();

        let id = target.id.clone();
        let modification = modification.or(target.modification);
        let replaceable = target.status.is_some_and(EntryStatus::is_replaceable);

        if replaceable {
            self.history_mut().remove(index);
            self.emit(SessionEvent::EntryRemoved { id: id.clone() });
        } else if let Some(entry) = self.history_mut().get_index_mut(index) {
            entry.modification = modification;
        }

        let cancel = self.generation_mut().begin(id.clone());
        self.emit(SessionEvent::Pending { id: id.clone() });
        debug!(%id, ?modification, "regenerating reply");

        let request = self.request_for(prompt_index, &prompt, modification);
        let rx = self.completion_backend().start_stream(request, cancel.clone());
        let result = collect_stream(rx, &cancel).await;

        let entry = regenerated_entry(id, result, modification);
        if replaceable {
            self.history_mut().insert(index, entry.clone());
        } else if let Some(slot) = self.history_mut().get_index_mut(index) {
            *slot = entry.clone();
        }
        let outcome = self.present(entry, true, &cancel).await;

        self.generation_mut().finish();
        self.persist();
        Some(outcome)
    }
}

fn regenerated_entry(
    id: String,
    result: StreamResult,
    modification: Option<Modification>,
) -> Entry {
    let failed = result.error.is_some() && !result.stopped;
    let mut entry = if failed {
        Entry::placeholder(id, EntryStatus::Error, ERROR_TEXT)
    } else if !result.text.trim().is_empty() {
        Entry::model_text(id, result.text)
    } else if result.stopped {
        Entry::placeholder(id, EntryStatus::Stopped, UNPROCESSED_TEXT)
    } else {
        return Entry::placeholder(id, EntryStatus::Empty, EMPTY_TEXT);
    };
    entry.modification = modification;
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat_stream::StreamMessage;
    use crate::core::message::Role;
    use crate::core::prompt::STOPPED_TEXT;
    use crate::utils::test_utils::{create_test_session, drain_events, ScriptedBackend};
    use std::time::Duration;

    #[tokio::test]
    async fn shorter_regeneration_replaces_text_in_place() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["A long and winding answer"]);
        backend.push_reply(&["Short."]);
        let (mut session, _events) = create_test_session(backend.clone());

        session.send("explain").await.expect("turn");
        let reply_id = session.history().entries()[1].id.clone();

        let outcome = session
            .regenerate(&reply_id, Some(Modification::Shorter))
            .await
            .expect("regen");

        let entries = session.history().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].id, reply_id);
        assert_eq!(entries[1].text(), Some("Short."));
        assert_eq!(entries[1].modification, Some(Modification::Shorter));
        assert_eq!(outcome.status, None);

        let request = &backend.requests()[1];
        assert!(request
            .system_instruction
            .ends_with(" Make your response significantly shorter."));
        let texts: Vec<_> = request
            .contents
            .iter()
            .map(|entry| entry.text_or_empty())
            .collect();
        assert_eq!(texts, ["explain"]);
    }

    #[tokio::test]
    async fn plain_regeneration_reuses_stored_modification() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["first"]);
        backend.push_reply(&["longer"]);
        backend.push_reply(&["longer again"]);
        let (mut session, _events) = create_test_session(backend.clone());

        session.send("q").await.expect("turn");
        let reply_id = session.history().entries()[1].id.clone();
        session
            .regenerate(&reply_id, Some(Modification::Longer))
            .await
            .expect("regen");
        session.regenerate(&reply_id, None).await.expect("regen");

        assert!(backend.requests()[2]
            .system_instruction
            .ends_with(" Make your response more detailed and longer."));
        assert_eq!(
            session.history().entries()[1].modification,
            Some(Modification::Longer)
        );
    }

    #[tokio::test]
    async fn error_placeholder_is_replaced_at_same_index() {
        let backend = ScriptedBackend::new();
        backend.push_script(vec![StreamMessage::Error("boom".into()), StreamMessage::End]);
        backend.push_reply(&["recovered"]);
        let (mut session, mut events) = create_test_session(backend.clone());

        session.send("q").await.expect("turn");
        let error_id = session.history().entries()[1].id.clone();
        assert_eq!(
            session.history().entries()[1].status,
            Some(EntryStatus::Error)
        );
        drain_events(&mut events);

        session.regenerate(&error_id, None).await.expect("regen");
        let entries = session.history().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].id, error_id);
        assert_eq!(entries[1].text(), Some("recovered"));
        assert_eq!(entries[1].status, None);

        let events = drain_events(&mut events);
        assert!(matches!(&events[0], SessionEvent::EntryRemoved { id } if *id == error_id));
    }

    #[tokio::test]
    async fn failed_regeneration_stores_error_placeholder() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["fine"]);
        backend.push_script(vec![StreamMessage::Error("boom".into()), StreamMessage::End]);
        let (mut session, _events) = create_test_session(backend.clone());

        session.send("q").await.expect("turn");
        let reply_id = session.history().entries()[1].id.clone();
        let outcome = session.regenerate(&reply_id, None).await.expect("regen");

        assert_eq!(outcome.status, Some(EntryStatus::Error));
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history().entries()[1].text(), Some(ERROR_TEXT));
    }

    #[tokio::test]
    async fn blank_regeneration_clears_modification() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["fine"]);
        backend.push_reply(&[]);
        let (mut session, _events) = create_test_session(backend.clone());

        session.send("q").await.expect("turn");
        let reply_id = session.history().entries()[1].id.clone();
        session
            .regenerate(&reply_id, Some(Modification::Shorter))
            .await
            .expect("regen");

        let reply = &session.history().entries()[1];
        assert_eq!(reply.status, Some(EntryStatus::Empty));
        assert_eq!(reply.text(), Some(EMPTY_TEXT));
        assert_eq!(reply.modification, None);
    }

    #[tokio::test]
    async fn stopped_regeneration_without_text_uses_unprocessed_placeholder() {
        let backend = ScriptedBackend::new();
        backend.push_reply(&["fine"]);
        backend.push_hanging(Vec::new());
        let (mut session, _events) = create_test_session(backend.clone());

        session.send("q").await.expect("turn");
        let reply_id = session.history().entries()[1].id.clone();

        let handle = session.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.stop();
        });
        session.regenerate(&reply_id, None).await.expect("regen");

        let reply = &session.history().entries()[1];
        assert_eq!(reply.status, Some(EntryStatus::Stopped));
        assert_eq!(reply.text(), Some(UNPROCESSED_TEXT));
        assert_ne!(reply.text(), Some(STOPPED_TEXT));
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn regeneration_needs_a_preceding_user_entry() {
        let backend = ScriptedBackend::new();
        let state = crate::core::persistence::AppState {
            histories: [(
                crate::core::backend::BackendId::Primary,
                vec![Entry::model_text("msg-1", "orphan reply")],
            )]
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

        assert!(session.regenerate("msg-1", None).await.is_none());
        assert!(session.regenerate("msg-404", None).await.is_none());
        assert!(backend.requests().is_empty());
        assert_eq!(session.history().entries()[0].role, Role::Model);
    }

    #[test]
    fn partial_text_survives_a_stop() {
        let result = StreamResult {
            text: "partial".into(),
            stopped: true,
            ..Default::default()
        };
        let entry = regenerated_entry("msg-1".into(), result, Some(Modification::Longer));
        assert_eq!(entry.text(), Some("partial"));
        assert_eq!(entry.modification, Some(Modification::Longer));
    }
}
