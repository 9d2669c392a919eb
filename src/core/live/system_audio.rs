//! The machine's own microphone and speakers.
//!
//! cpal and rodio streams are not `Send` on every platform, so each device
//! lives on its own thread for the length of a session and talks to the
//! driver over channels.

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::sync::mpsc::{self as std_mpsc, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source};
use tracing::{debug, warn};

use crate::core::live::devices::{Microphone, Speaker};
use crate::core::live::pcm::{downmix, FrameResampler, CAPTURE_FRAME, INPUT_RATE, OUTPUT_RATE};
use crate::core::live::playback::ScheduledSource;
use crate::core::live::LiveError;

/// Device name that always means the system default.
const DEFAULT_DEVICE: &str = "Default";

fn microphone_error(err: impl StdError + Send + Sync + 'static) -> LiveError {
    LiveError::Microphone(Box::new(err))
}

fn speaker_error(err: impl StdError + Send + Sync + 'static) -> LiveError {
    LiveError::Speaker(Box::new(err))
}

fn requested(name: Option<&str>) -> Option<&str> {
    name.filter(|name| !name.is_empty() && *name != DEFAULT_DEVICE)
}

struct Capture {
    samples: Receiver<Vec<f32>>,
    resampler: FrameResampler,
    shutdown: Sender<()>,
}

/// Live microphone input, resampled to 16 kHz frames.
pub struct CpalMicrophone {
    device_name: Option<String>,
    capture: Option<Capture>,
    ready: VecDeque<Vec<f32>>,
}

impl CpalMicrophone {
    /// `device_name` picks an input device by name; `None` or `"Default"`
    /// uses the system default.
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            capture: None,
            ready: VecDeque::new(),
        }
    }

    /// Polling interval that keeps up with the device without letting
    /// frames queue.
    pub fn poll_interval() -> Duration {
        CAPTURE_FRAME / 4
    }
}

impl Microphone for CpalMicrophone {
    fn open(&mut self) -> Result<(), LiveError> {
        if self.capture.is_some() {
            return Ok(());
        }
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (samples_tx, samples_rx) = std_mpsc::channel();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();
        let device_name = self.device_name.clone();

        thread::Builder::new()
            .name("jamchat-microphone".to_string())
            .spawn(move || match start_capture(device_name.as_deref(), samples_tx) {
                Ok((stream, sample_rate)) => {
                    let _ = ready_tx.send(Ok(sample_rate));
                    // Blocks until the session drops its sender.
                    let _ = shutdown_rx.recv();
                    drop(stream);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(microphone_error)?;

        let sample_rate = ready_rx.recv().map_err(microphone_error)??;
        let resampler = FrameResampler::new(sample_rate, INPUT_RATE, CAPTURE_FRAME)?;
        debug!(sample_rate, "microphone open");
        self.capture = Some(Capture {
            samples: samples_rx,
            resampler,
            shutdown: shutdown_tx,
        });
        Ok(())
    }

    fn read_frame(&mut self) -> Option<Vec<f32>> {
        if let Some(capture) = self.capture.as_mut() {
            let ready = &mut self.ready;
            while let Ok(chunk) = capture.samples.try_recv() {
                capture
                    .resampler
                    .push(&chunk, |frame| ready.push_back(frame.to_vec()));
            }
        }
        self.ready.pop_front()
    }

    fn close(&mut self) {
        if let Some(capture) = self.capture.take() {
            drop(capture.shutdown);
            debug!("microphone closed");
        }
        self.ready.clear();
    }
}

fn input_device(name: Option<&str>) -> Result<cpal::Device, LiveError> {
    let host = cpal::default_host();
    if let Some(name) = requested(name) {
        let devices = host.input_devices().map_err(microphone_error)?;
        for device in devices {
            if device.name().is_ok_and(|found| found == name) {
                return Ok(device);
            }
        }
        warn!("Input device '{}' not found, using default device", name);
    }
    host.default_input_device()
        .ok_or_else(|| LiveError::Microphone("no input device available".into()))
}

fn start_capture(
    device_name: Option<&str>,
    samples: Sender<Vec<f32>>,
) -> Result<(cpal::Stream, u32), LiveError> {
    let device = input_device(device_name)?;
    let supported = device.default_input_config().map_err(microphone_error)?;
    let channels = supported.channels();
    let sample_rate = supported.sample_rate().0;
    let config = supported.config();

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_capture::<f32>(&device, &config, channels, samples),
        SampleFormat::I16 => build_capture::<i16>(&device, &config, channels, samples),
        SampleFormat::U16 => build_capture::<u16>(&device, &config, channels, samples),
        other => Err(LiveError::Microphone(
            format!("unsupported sample format {other:?}").into(),
        )),
    }?;
    stream.play().map_err(microphone_error)?;
    Ok((stream, sample_rate))
}

fn build_capture<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: u16,
    samples: Sender<Vec<f32>>,
) -> Result<cpal::Stream, LiveError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let converted: Vec<f32> =
                    data.iter().map(|sample| sample.to_sample::<f32>()).collect();
                let _ = samples.send(downmix(&converted, channels));
            },
            |err| warn!("microphone stream error: {err}"),
            None,
        )
        .map_err(microphone_error)
}

enum PlaybackCommand {
    Play { delay: Duration, samples: Vec<f32> },
    Stop,
}

/// Plays model audio through an output device. Each scheduled source gets
/// its own sink, delayed to its start time on the speaker clock.
pub struct RodioSpeaker {
    device_name: Option<String>,
    started: Instant,
    commands: Option<Sender<PlaybackCommand>>,
}

impl RodioSpeaker {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            started: Instant::now(),
            commands: None,
        }
    }

    fn send(&mut self, command: PlaybackCommand) {
        let Some(commands) = self.commands.as_ref() else {
            return;
        };
        if commands.send(command).is_err() {
            warn!("audio output thread stopped");
            self.commands = None;
        }
    }
}

impl Speaker for RodioSpeaker {
    fn open(&mut self) -> Result<(), LiveError> {
        if self.commands.is_some() {
            return Ok(());
        }
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (commands_tx, commands_rx) = std_mpsc::channel();
        let device_name = self.device_name.clone();

        thread::Builder::new()
            .name("jamchat-speaker".to_string())
            .spawn(move || match open_output(device_name.as_deref()) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    run_playback(&stream, commands_rx);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(speaker_error)?;

        ready_rx.recv().map_err(speaker_error)??;
        self.started = Instant::now();
        self.commands = Some(commands_tx);
        debug!("audio output open");
        Ok(())
    }

    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn play(&mut self, source: ScheduledSource, samples: &[f32]) -> Result<(), LiveError> {
        if self.commands.is_none() {
            return Err(LiveError::Speaker("audio output is not open".into()));
        }
        let delay = Duration::from_secs_f64((source.start - self.now()).max(0.0));
        self.send(PlaybackCommand::Play {
            delay,
            samples: samples.to_vec(),
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.send(PlaybackCommand::Stop);
    }

    fn close(&mut self) -> Result<(), LiveError> {
        if self.commands.take().is_some() {
            debug!("audio output closed");
        }
        Ok(())
    }
}

fn open_output(device_name: Option<&str>) -> Result<OutputStream, LiveError> {
    let builder = match requested(device_name) {
        Some(name) => {
            let host = rodio::cpal::default_host();
            let devices = host.output_devices().map_err(speaker_error)?;
            let mut found_device = None;
            for device in devices {
                if device.name().is_ok_and(|found| found == name) {
                    found_device = Some(device);
                    break;
                }
            }
            match found_device {
                Some(device) => OutputStreamBuilder::from_device(device),
                None => {
                    warn!("Output device '{}' not found, using default device", name);
                    OutputStreamBuilder::from_default_device()
                }
            }
        }
        None => OutputStreamBuilder::from_default_device(),
    }
    .map_err(speaker_error)?;

    let mut stream = builder.open_stream().map_err(speaker_error)?;
    stream.log_on_drop(false);
    Ok(stream)
}

/// Runs until the speaker drops its command sender.
fn run_playback(stream: &OutputStream, commands: Receiver<PlaybackCommand>) {
    let mut sinks: Vec<Sink> = Vec::new();
    while let Ok(command) = commands.recv() {
        match command {
            PlaybackCommand::Play { delay, samples } => {
                sinks.retain(|sink| !sink.empty());
                let sink = Sink::connect_new(stream.mixer());
                sink.append(SamplesBuffer::new(1, OUTPUT_RATE, samples).delay(delay));
                sinks.push(sink);
            }
            PlaybackCommand::Stop => {
                for sink in sinks.drain(..) {
                    sink.stop();
                }
            }
        }
    }
    for sink in sinks {
        sink.stop();
    }
}
