//! Runs a voice session against the chat history.

use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::live::SetupMessage;
use crate::core::live::devices::{Microphone, Speaker};
use crate::core::live::pcm::CAPTURE_FRAME;
use crate::core::live::session::{LiveEffect, LiveSession, LiveState, OpenFailure};
use crate::core::live::transport::{LiveConnector, LiveSink};
use crate::core::live::LiveError;
use crate::core::message::{Entry, EntrySource, Part, Role};
use crate::core::session::{ChatSession, SessionEvent};

/// Speech below this amplitude counts as silence.
const SPEECH_THRESHOLD: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceControl {
    TogglePause,
    End,
}

pub struct VoiceDevices {
    pub microphone: Box<dyn Microphone>,
    pub speaker: Box<dyn Speaker>,
    /// How often the microphone is polled for a frame.
    pub frame_interval: Duration,
}

impl VoiceDevices {
    pub fn new(microphone: Box<dyn Microphone>, speaker: Box<dyn Speaker>) -> Self {
        Self {
            microphone,
            speaker,
            frame_interval: CAPTURE_FRAME,
        }
    }

    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = frame_interval;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceSummary {
    pub elapsed: Duration,
    pub turns: usize,
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

struct VoiceIo {
    devices: VoiceDevices,
    sink: Option<Box<dyn LiveSink>>,
}

impl VoiceIo {
    /// Performs device and transport effects. A failed send is returned so
    /// the state machine can report it.
    async fn apply(
        &mut self,
        session: &mut ChatSession,
        effects: Vec<LiveEffect>,
    ) -> Option<LiveError> {
        let mut failure = None;
        for effect in effects {
            match effect {
                LiveEffect::SendAudio(data) => {
                    if let Some(sink) = self.sink.as_mut() {
                        if let Err(err) = sink.send_audio(data).await {
                            failure = Some(err);
                        }
                    }
                }
                LiveEffect::Transcript(utterance) => {
                    let suffix = match utterance.role {
                        Role::User => "user",
                        Role::Model => "model",
                    };
                    let id = session.next_id_with_suffix(suffix);
                    let entry = Entry::new(id, utterance.role, vec![Part::text(utterance.text)])
                        .with_source(EntrySource::Audio);
                    session.append_entry(entry);
                }
                LiveEffect::Persist => session.persist(),
                LiveEffect::Status(status) => session.emit(SessionEvent::Status(status)),
                LiveEffect::Play { source, samples } => {
                    if let Err(err) = self.devices.speaker.play(source, &samples) {
                        warn!("{err}");
                    }
                }
                LiveEffect::StopPlayback => self.devices.speaker.stop(),
                LiveEffect::Close => {
                    if let Some(mut sink) = self.sink.take() {
                        if let Err(err) = sink.close().await {
                            debug!("closing voice stream: {err}");
                        }
                    }
                    self.devices.microphone.close();
                    if let Err(err) = self.devices.speaker.close() {
                        warn!("{err}");
                    }
                }
            }
        }
        failure
    }
}

impl ChatSession {
    /// Holds a voice conversation until the user ends it, the remote closes
    /// the stream, or the input runs out and the model has answered.
    ///
    /// Transcripts land in the active history as audio-sourced entries.
    pub async fn run_voice(
        &mut self,
        connector: &dyn LiveConnector,
        devices: VoiceDevices,
        mut controls: UnboundedReceiver<VoiceControl>,
    ) -> Result<VoiceSummary, LiveError> {
        if !self.active_backend().capabilities().voice {
            return Err(LiveError::Unsupported);
        }

        let mut live = LiveSession::new();
        live.begin_connect()?;
        let frame_interval = devices.frame_interval;
        let mut io = VoiceIo {
            devices,
            sink: None,
        };

        if let Err(err) = io.devices.microphone.open() {
            io.apply(self, live.open_failed(OpenFailure::Microphone))
                .await;
            return Err(err);
        }
        if let Err(err) = io.devices.speaker.open() {
            io.apply(self, live.open_failed(OpenFailure::Speaker)).await;
            return Err(err);
        }

        let voice = &self.config().voice;
        let setup = SetupMessage::audio(
            &voice.model,
            &voice.voice_name,
            self.persona().voice_instruction(),
        );
        let mut source = match connector.connect(setup).await {
            Ok((sink, source)) => {
                io.sink = Some(sink);
                source
            }
            Err(err) => {
                io.apply(self, live.open_failed(OpenFailure::Transport))
                    .await;
                return Err(err);
            }
        };
        live.opened(Instant::now());
        info!("voice session started");

        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut input_exhausted = false;
        let mut answered_since_speech = false;
        let mut turns = 0;

        while live.state() != LiveState::Closed {
            let effects = tokio::select! {
                biased;
                control = controls.recv() => match control {
                    Some(VoiceControl::TogglePause) => live.toggle_pause(),
                    Some(VoiceControl::End) | None => live.teardown(),
                },
                message = source.next_message() => match message {
                    Ok(Some(content)) => live.handle_server(&content, io.devices.speaker.now()),
                    Ok(None) => live.remote_closed(),
                    Err(err) => live.transport_error(&err),
                },
                _ = ticker.tick() => {
                    live.reap(io.devices.speaker.now());
                    match io.devices.microphone.read_frame() {
                        Some(frame) => {
                            let effect = live.capture(&frame);
                            if effect.is_some()
                                && frame.iter().any(|sample| sample.abs() > SPEECH_THRESHOLD)
                            {
                                answered_since_speech = false;
                            }
                            effect.into_iter().collect()
                        }
                        None => {
                            input_exhausted = io.devices.microphone.is_exhausted();
                            Vec::new()
                        }
                    }
                }
            };

            if effects.contains(&LiveEffect::Persist) {
                turns += 1;
                answered_since_speech = true;
            }
            if let Some(err) = io.apply(self, effects).await {
                let reported = live.transport_error(&err);
                io.apply(self, reported).await;
            }

            if input_exhausted && answered_since_speech && !live.is_playing() {
                let effects = live.teardown();
                io.apply(self, effects).await;
            }
        }

        let summary = VoiceSummary {
            elapsed: live.elapsed(Instant::now()),
            turns,
        };
        info!(
            turns,
            elapsed = %format_elapsed(summary.elapsed),
            "voice session ended"
        );
        Ok(summary)
    }
}
