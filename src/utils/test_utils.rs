use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::chat_stream::{CompletionBackend, CompletionRequest, StreamMessage};
use crate::core::config::Config;
use crate::core::persistence::AppState;
use crate::core::profile::{Gender, UserProfile};
use crate::core::session::{ChatSession, SessionEvent};

enum Script {
    /// Sent in order; the channel then closes.
    Finite(Vec<StreamMessage>),
    /// Sent in order; the channel stays open until the request is cancelled.
    Hanging(Vec<StreamMessage>),
}

/// Completion backend that replays queued scripts and records every request.
/// An exhausted queue answers with an immediate `End`.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_reply(&self, chunks: &[&str]) {
        let mut messages: Vec<StreamMessage> = chunks
            .iter()
            .map(|chunk| StreamMessage::Chunk(chunk.to_string()))
            .collect();
        messages.push(StreamMessage::End);
        self.push_script(messages);
    }

    pub fn push_script(&self, messages: Vec<StreamMessage>) {
        self.scripts.lock().unwrap().push_back(Script::Finite(messages));
    }

    pub fn push_hanging(&self, messages: Vec<StreamMessage>) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script::Hanging(messages));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionBackend for ScriptedBackend {
    fn start_stream(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<StreamMessage> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::Finite(vec![StreamMessage::End]));

        let (tx, rx) = mpsc::unbounded_channel();
        match script {
            Script::Finite(messages) => {
                for message in messages {
                    let _ = tx.send(message);
                }
            }
            Script::Hanging(messages) => {
                for message in messages {
                    let _ = tx.send(message);
                }
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    drop(tx);
                });
            }
        }
        rx
    }
}

pub fn test_config() -> Config {
    Config {
        reveal_interval_ms: 0,
        ..Default::default()
    }
}

pub fn test_profile() -> UserProfile {
    UserProfile {
        name: Some("Velly".to_string()),
        gender: Some(Gender::Female),
        ..Default::default()
    }
}

pub fn create_test_session(
    backend: Arc<ScriptedBackend>,
) -> (ChatSession, mpsc::UnboundedReceiver<SessionEvent>) {
    let state = AppState {
        user_profile: test_profile(),
        ..Default::default()
    };
    ChatSession::new(test_config(), state, backend, None)
}

pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
