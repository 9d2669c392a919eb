use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::api::live::ServerContent;
use crate::core::live::pcm::{decode_pcm16, encode_pcm16, OUTPUT_RATE};
use crate::core::live::playback::{PlaybackScheduler, ScheduledSource};
use crate::core::live::transcript::{TranscriptBuffers, Utterance};
use crate::core::live::{
    LiveError, STATUS_CONNECTION_ERROR, STATUS_NO_MICROPHONE, STATUS_NO_SPEAKER, STATUS_THINKING,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    Listening,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LiveState {
    #[default]
    Idle,
    Connecting,
    Open(Capture),
    Closed,
}

impl LiveState {
    pub fn is_active(self) -> bool {
        matches!(self, LiveState::Connecting | LiveState::Open(_))
    }
}

/// Which half of the session failed to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    Microphone,
    Speaker,
    Transport,
}

/// Work the driver performs on behalf of the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEffect {
    /// Base64 PCM for the realtime input stream.
    SendAudio(String),
    Transcript(Utterance),
    Persist,
    Status(Option<String>),
    Play {
        source: ScheduledSource,
        samples: Vec<f32>,
    },
    StopPlayback,
    /// Release the microphone, the speaker and the transport.
    Close,
}

#[derive(Debug, Default)]
pub struct LiveSession {
    state: LiveState,
    transcripts: TranscriptBuffers,
    playback: PlaybackScheduler,
    opened_at: Option<Instant>,
}

impl LiveSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LiveState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    pub fn begin_connect(&mut self) -> Result<(), LiveError> {
        if self.state.is_active() {
            return Err(LiveError::AlreadyActive);
        }
        self.transcripts.clear();
        self.playback = PlaybackScheduler::new();
        self.opened_at = None;
        self.state = LiveState::Connecting;
        Ok(())
    }

    pub fn opened(&mut self, now: Instant) {
        if self.state == LiveState::Connecting {
            self.state = LiveState::Open(Capture::Listening);
            self.opened_at = Some(now);
            debug!("voice session open");
        }
    }

    pub fn open_failed(&mut self, failure: OpenFailure) -> Vec<LiveEffect> {
        let status = match failure {
            OpenFailure::Microphone => STATUS_NO_MICROPHONE,
            OpenFailure::Speaker => STATUS_NO_SPEAKER,
            OpenFailure::Transport => STATUS_CONNECTION_ERROR,
        };
        let mut effects = self.teardown();
        effects.push(LiveEffect::Status(Some(status.to_string())));
        effects
    }

    pub fn transport_error(&mut self, err: &LiveError) -> Vec<LiveEffect> {
        warn!("{err}");
        if !self.state.is_active() {
            return Vec::new();
        }
        vec![LiveEffect::Status(Some(STATUS_CONNECTION_ERROR.to_string()))]
    }

    pub fn remote_closed(&mut self) -> Vec<LiveEffect> {
        debug!("voice session closed by remote");
        self.teardown()
    }

    /// Encodes a 16 kHz microphone frame, unless the model is speaking or
    /// the user paused.
    pub fn capture(&self, frame: &[f32]) -> Option<LiveEffect> {
        if self.state != LiveState::Open(Capture::Listening) || self.playback.is_playing() {
            return None;
        }
        Some(LiveEffect::SendAudio(encode_pcm16(frame)))
    }

    pub fn handle_server(&mut self, content: &ServerContent, now: f64) -> Vec<LiveEffect> {
        let mut effects = Vec::new();
        if !matches!(self.state, LiveState::Open(_)) {
            return effects;
        }

        if content.model_turn.is_some() || content.output_transcription.is_some() {
            if let Some(utterance) = self.transcripts.on_model_output() {
                effects.push(LiveEffect::Transcript(utterance));
                effects.push(LiveEffect::Status(Some(STATUS_THINKING.to_string())));
            }
        }

        if let Some(data) = content.audio_data() {
            match decode_pcm16(data) {
                Ok(samples) if !samples.is_empty() => {
                    effects.push(LiveEffect::Status(None));
                    let duration = samples.len() as f64 / OUTPUT_RATE as f64;
                    let source = self.playback.schedule(duration, now);
                    effects.push(LiveEffect::Play { source, samples });
                }
                Ok(_) => {}
                Err(err) => warn!("dropping model audio: {err}"),
            }
        }

        if let Some(transcription) = &content.input_transcription {
            self.transcripts.push_input(&transcription.text);
        }
        if let Some(transcription) = &content.output_transcription {
            self.transcripts.push_output(&transcription.text);
        }

        if content.turn_complete {
            let flushed = self.transcripts.complete_turn();
            if !flushed.is_empty() {
                effects.extend(flushed.into_iter().map(LiveEffect::Transcript));
                effects.push(LiveEffect::Persist);
            }
        }

        if content.interrupted {
            self.playback.stop_all();
            effects.push(LiveEffect::StopPlayback);
        }

        effects
    }

    /// Forgets finished playback. Returns `true` once the model fell silent.
    pub fn reap(&mut self, now: f64) -> bool {
        self.playback.reap(now)
    }

    /// Flips between listening and suspended. Suspending silences the model.
    pub fn toggle_pause(&mut self) -> Vec<LiveEffect> {
        match self.state {
            LiveState::Open(Capture::Listening) => {
                self.state = LiveState::Open(Capture::Suspended);
                self.playback.stop_all();
                vec![LiveEffect::StopPlayback]
            }
            LiveState::Open(Capture::Suspended) => {
                self.state = LiveState::Open(Capture::Listening);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    pub fn teardown(&mut self) -> Vec<LiveEffect> {
        if !self.state.is_active() {
            return Vec::new();
        }
        self.state = LiveState::Closed;
        self.transcripts.clear();
        self.playback.stop_all();
        vec![LiveEffect::StopPlayback, LiveEffect::Close]
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.opened_at
            .map(|opened| now.saturating_duration_since(opened))
            .unwrap_or_default()
    }
}
