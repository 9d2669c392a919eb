//! Stop signal and in-flight bookkeeping for a single generation.

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

/// Cloneable handle that cancels whatever generation is currently running.
///
/// The token is swapped for a fresh one when a generation starts or ends, so
/// a stop requested while idle never leaks into the next turn.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_cancelled()
    }

    fn rearm(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = fresh.clone();
        fresh
    }
}

#[derive(Debug, Default)]
pub struct GenerationState {
    stop: StopHandle,
    current_message_id: Option<String>,
}

impl GenerationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `message_id` as pending and returns the token the stream and
    /// reveal must observe.
    pub fn begin(&mut self, message_id: impl Into<String>) -> CancellationToken {
        self.current_message_id = Some(message_id.into());
        self.stop.rearm()
    }

    pub fn finish(&mut self) {
        self.current_message_id = None;
        self.stop.rearm();
    }

    pub fn is_generating(&self) -> bool {
        self.current_message_id.is_some()
    }

    pub fn current_message_id(&self) -> Option<&str> {
        self.current_message_id.as_deref()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}
