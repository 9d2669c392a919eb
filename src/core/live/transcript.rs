//! Assembly of streamed transcriptions into whole conversation turns.
//!
//! The endpoint interleaves input and output transcription fragments. Input
//! is flushed as soon as the model starts answering; output is flushed when
//! the turn completes.

use crate::core::message::{capitalize_first, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct TranscriptBuffers {
    input: String,
    output: String,
    awaiting_model: bool,
}

impl TranscriptBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when the model produces output of any kind. Returns the user's
    /// utterance when one is buffered and not yet flushed for this turn.
    pub fn on_model_output(&mut self) -> Option<Utterance> {
        if self.awaiting_model {
            return None;
        }
        let utterance = take_utterance(&mut self.input, Role::User)?;
        self.awaiting_model = true;
        Some(utterance)
    }

    pub fn push_input(&mut self, text: &str) {
        self.input.push_str(text);
        self.awaiting_model = false;
    }

    pub fn push_output(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// Flushes whatever the turn left behind: user input first, then the
    /// model's reply.
    pub fn complete_turn(&mut self) -> Vec<Utterance> {
        let flushed = [
            take_utterance(&mut self.input, Role::User),
            take_utterance(&mut self.output, Role::Model),
        ];
        self.awaiting_model = false;
        flushed.into_iter().flatten().collect()
    }

    pub fn is_awaiting_model(&self) -> bool {
        self.awaiting_model
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.output.clear();
        self.awaiting_model = false;
    }
}

fn take_utterance(buffer: &mut String, role: Role) -> Option<Utterance> {
    let text = std::mem::take(buffer);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let text = match role {
        Role::User => capitalize_first(trimmed),
        Role::Model => trimmed.to_string(),
    };
    Some(Utterance { role, text })
}
