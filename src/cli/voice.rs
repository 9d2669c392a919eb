//! Voice mode: the microphone and speakers, or WAV files standing in for them.

use std::error::Error;
use std::io;

use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::cli::chat::drive;
use crate::cli::open_session;
use crate::core::config::data::VoiceConfig;
use crate::core::config::Config;
use crate::core::live::devices::{AudioFiles, Microphone, Speaker, WavMicrophone, WavSpeaker};
use crate::core::live::pcm::CAPTURE_FRAME;
use crate::core::live::system_audio::{CpalMicrophone, RodioSpeaker};
use crate::core::live::transport::WebSocketConnector;
use crate::core::live::{format_elapsed, LiveError, VoiceControl, VoiceDevices, VoiceSummary};
use crate::core::session::{ChatSession, SessionEvent};
use crate::ui::terminal::TerminalRenderer;

pub async fn run_voice_command(config: Config, files: AudioFiles) -> Result<(), Box<dyn Error>> {
    let assistant_name = config.assistant_name.clone();
    let (mut session, mut events) = open_session(config)?;
    let mut renderer = TerminalRenderer::new(
        io::stdout(),
        assistant_name,
        session.profile().display_name(),
    );

    let summary = converse(&mut session, &mut events, &mut renderer, &files).await??;
    renderer.notice(&summary_line(&summary, &files))?;
    Ok(())
}

pub(crate) fn summary_line(summary: &VoiceSummary, files: &AudioFiles) -> String {
    let mut line = format!(
        "Voice session ended after {} ({} turn(s)).",
        format_elapsed(summary.elapsed),
        summary.turns
    );
    if let Some(output) = files.output.as_ref().filter(|_| summary.turns > 0) {
        line.push_str(&format!(" Replies saved to {}.", output.display()));
    }
    line
}

/// Live devices unless a WAV file replaces them. A live microphone is polled
/// faster than it produces frames.
pub(crate) fn voice_devices(voice: &VoiceConfig, files: &AudioFiles) -> VoiceDevices {
    let microphone: Box<dyn Microphone> = match &files.input {
        Some(path) => Box::new(WavMicrophone::new(path)),
        None => Box::new(CpalMicrophone::new(voice.input_device.clone())),
    };
    let frame_interval = match files.input {
        Some(_) => CAPTURE_FRAME,
        None => CpalMicrophone::poll_interval(),
    };
    let speaker: Box<dyn Speaker> = match &files.output {
        Some(path) => Box::new(WavSpeaker::new(path)),
        None => Box::new(RodioSpeaker::new(voice.output_device.clone())),
    };
    VoiceDevices::new(microphone, speaker).with_frame_interval(frame_interval)
}

/// Holds one voice session. Ctrl+C ends it.
pub(crate) async fn converse(
    session: &mut ChatSession,
    events: &mut UnboundedReceiver<SessionEvent>,
    renderer: &mut TerminalRenderer<io::Stdout>,
    files: &AudioFiles,
) -> io::Result<Result<VoiceSummary, LiveError>> {
    let voice = &session.config().voice;
    let Some(api_key) = voice.api_key() else {
        return Ok(Err(LiveError::MissingApiKey(voice.api_key_env.clone())));
    };
    let connector = WebSocketConnector::new(voice.url.clone(), api_key);
    let devices = voice_devices(voice, files);

    let (controls_tx, controls) = mpsc::unbounded_channel();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = controls_tx.send(VoiceControl::End);
        }
    });

    renderer.notice("Voice session starting; Ctrl+C ends it.")?;
    let result = drive(session.run_voice(&connector, devices, controls), events, renderer).await;
    interrupt.abort();
    result
}
