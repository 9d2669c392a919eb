//! Audio endpoints for voice mode.
//!
//! Live sessions use the machine's devices (see `system_audio`). The WAV
//! implementations here read the user's side of the conversation from a file
//! and render the model's replies into another one, laid out on the same
//! clock the playback scheduler uses.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Instant;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

use crate::core::live::pcm::{downmix, FrameResampler, CAPTURE_FRAME, INPUT_RATE, OUTPUT_RATE};
use crate::core::live::playback::ScheduledSource;
use crate::core::live::LiveError;

/// Trailing silence after the recording so voice activity detection can
/// notice the end of the utterance.
const TRAILING_SILENCE_FRAMES: usize = 8;

/// WAV files standing in for the microphone and the speaker. Unset sides use
/// the machine's devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioFiles {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

pub trait Microphone: Send {
    fn open(&mut self) -> Result<(), LiveError>;

    /// Next 16 kHz mono frame, `None` when none is ready yet.
    fn read_frame(&mut self) -> Option<Vec<f32>>;

    /// A recording that has been read to the end. Live devices never are.
    fn is_exhausted(&self) -> bool {
        false
    }

    fn close(&mut self);
}

pub trait Speaker: Send {
    fn open(&mut self) -> Result<(), LiveError> {
        Ok(())
    }

    /// Seconds on the playback clock.
    fn now(&self) -> f64;

    fn play(&mut self, source: ScheduledSource, samples: &[f32]) -> Result<(), LiveError>;

    /// Silences everything that has not played by now.
    fn stop(&mut self);

    fn close(&mut self) -> Result<(), LiveError>;
}

pub struct WavMicrophone {
    path: PathBuf,
    frames: VecDeque<Vec<f32>>,
}

impl WavMicrophone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frames: VecDeque::new(),
        }
    }
}

impl Microphone for WavMicrophone {
    fn open(&mut self) -> Result<(), LiveError> {
        let (samples, sample_rate) = load_wav_mono(&self.path)?;
        let mut resampler = FrameResampler::new(sample_rate, INPUT_RATE, CAPTURE_FRAME)?;
        let mut frames = VecDeque::new();
        resampler.push(&samples, |frame| frames.push_back(frame.to_vec()));
        resampler.finish(|frame| frames.push_back(frame.to_vec()));

        let frame_len = frames.front().map(Vec::len).unwrap_or_default();
        frames.extend(std::iter::repeat_n(vec![0.0; frame_len], TRAILING_SILENCE_FRAMES));
        debug!(path = %self.path.display(), frames = frames.len(), "microphone ready");
        self.frames = frames;
        Ok(())
    }

    fn read_frame(&mut self) -> Option<Vec<f32>> {
        self.frames.pop_front()
    }

    fn is_exhausted(&self) -> bool {
        self.frames.is_empty()
    }

    fn close(&mut self) {
        self.frames.clear();
    }
}

/// Renders scheduled model audio into a 24 kHz mono WAV file on close.
/// Nothing is written when no audio was ever played.
pub struct WavSpeaker {
    path: PathBuf,
    started: Instant,
    timeline: Vec<f32>,
    played: bool,
    closed: bool,
}

impl WavSpeaker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            started: Instant::now(),
            timeline: Vec::new(),
            played: false,
            closed: false,
        }
    }

    fn offset(seconds: f64) -> usize {
        (seconds.max(0.0) * OUTPUT_RATE as f64).round() as usize
    }
}

impl Speaker for WavSpeaker {
    fn open(&mut self) -> Result<(), LiveError> {
        self.started = Instant::now();
        Ok(())
    }

    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn play(&mut self, source: ScheduledSource, samples: &[f32]) -> Result<(), LiveError> {
        let start = Self::offset(source.start);
        let end = start + samples.len();
        if self.timeline.len() < end {
            self.timeline.resize(end, 0.0);
        }
        for (slot, sample) in self.timeline[start..end].iter_mut().zip(samples) {
            *slot += sample;
        }
        self.played = true;
        Ok(())
    }

    fn stop(&mut self) {
        let played = Self::offset(self.now());
        self.timeline.truncate(played);
    }

    fn close(&mut self) -> Result<(), LiveError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if !self.played {
            debug!(path = %self.path.display(), "no audio played, nothing to save");
            return Ok(());
        }
        save_wav_mono(&self.path, &self.timeline, OUTPUT_RATE)
    }
}

/// Reads any PCM WAV file as mono samples in [-1, 1].
pub fn load_wav_mono(path: &Path) -> Result<(Vec<f32>, u32), LiveError> {
    let mut reader =
        WavReader::open(path).map_err(|err| LiveError::Microphone(err.into()))?;
    let spec = reader.spec();
    debug!(path = %path.display(), ?spec, "loading WAV file");

    let samples: Result<Vec<f32>, _> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|sample| sample.map(|value| value as f32 / i16::MAX as f32))
            .collect(),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|sample| sample.map(|value| value as f32 / i32::MAX as f32))
            .collect(),
        (SampleFormat::Float, _) => reader.samples::<f32>().collect(),
        (_, bits) => {
            return Err(LiveError::Microphone(format!(
                "unsupported bit depth: {bits}"
            )
            .into()))
        }
    };
    let samples = samples.map_err(|err| LiveError::Microphone(err.into()))?;
    Ok((downmix(&samples, spec.channels), spec.sample_rate))
}

pub fn save_wav_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), LiveError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let speaker_err = |err: hound::Error| LiveError::Speaker(err.into());

    let mut writer = WavWriter::create(path, spec).map_err(speaker_err)?;
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).map_err(speaker_err)?;
    }
    writer.finalize().map_err(speaker_err)?;
    debug!(path = %path.display(), samples = samples.len(), "saved WAV file");
    Ok(())
}
