//! 16-bit PCM framing and resampling for the realtime endpoint.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rubato::{FftFixedIn, Resampler};

use crate::core::live::LiveError;

/// Rate the endpoint expects for microphone audio.
pub const INPUT_RATE: u32 = 16_000;
/// Rate of the audio the endpoint speaks back.
pub const OUTPUT_RATE: u32 = 24_000;
/// Samples per capture frame at [`INPUT_RATE`].
pub const CAPTURE_FRAME: Duration = Duration::from_millis(256);

const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// Little-endian 16-bit PCM, base64 encoded. Samples are clamped to [-1, 1].
pub fn encode_pcm16(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32);
        bytes.extend_from_slice(&(value as i16).to_le_bytes());
    }
    BASE64.encode(bytes)
}

pub fn decode_pcm16(data: &str) -> Result<Vec<f32>, LiveError> {
    let bytes = BASE64
        .decode(data)
        .map_err(|err| LiveError::Audio(err.into()))?;
    if bytes.len() % 2 != 0 {
        return Err(LiveError::Audio(format!(
            "odd PCM payload length {}",
            bytes.len()
        )
        .into()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Averages interleaved channels into mono.
pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 | 1 => interleaved.to_vec(),
        n => interleaved
            .chunks(n as usize)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect(),
    }
}

/// Streams mono audio through an FFT resampler and regroups the output into
/// fixed-length frames.
pub struct FrameResampler {
    resampler: Option<FftFixedIn<f32>>,
    chunk_in: usize,
    in_buf: Vec<f32>,
    frame_samples: usize,
    pending: Vec<f32>,
}

impl FrameResampler {
    pub fn new(in_hz: u32, out_hz: u32, frame_dur: Duration) -> Result<Self, LiveError> {
        let frame_samples = (out_hz as f64 * frame_dur.as_secs_f64()).round() as usize;
        if frame_samples == 0 {
            return Err(LiveError::Audio("frame duration too short".into()));
        }

        let chunk_in = RESAMPLER_CHUNK_SIZE;
        let resampler = if in_hz == out_hz {
            None
        } else {
            Some(
                FftFixedIn::<f32>::new(in_hz as usize, out_hz as usize, chunk_in, 1, 1)
                    .map_err(|err| LiveError::Audio(err.into()))?,
            )
        };

        Ok(Self {
            resampler,
            chunk_in,
            in_buf: Vec::with_capacity(chunk_in),
            frame_samples,
            pending: Vec::with_capacity(frame_samples),
        })
    }

    pub fn push(&mut self, mut src: &[f32], mut emit: impl FnMut(&[f32])) {
        let Some(resampler) = self.resampler.as_mut() else {
            Self::emit_frames(&mut self.pending, self.frame_samples, src, &mut emit);
            return;
        };

        while !src.is_empty() {
            let space = self.chunk_in - self.in_buf.len();
            let take = space.min(src.len());
            self.in_buf.extend_from_slice(&src[..take]);
            src = &src[take..];

            if self.in_buf.len() == self.chunk_in {
                if let Ok(out) = resampler.process(&[&self.in_buf[..]], None) {
                    Self::emit_frames(&mut self.pending, self.frame_samples, &out[0], &mut emit);
                }
                self.in_buf.clear();
            }
        }
    }

    /// Flushes buffered input, zero-padding the last frame.
    pub fn finish(&mut self, mut emit: impl FnMut(&[f32])) {
        if let Some(resampler) = self.resampler.as_mut() {
            if !self.in_buf.is_empty() {
                self.in_buf.resize(self.chunk_in, 0.0);
                if let Ok(out) = resampler.process(&[&self.in_buf[..]], None) {
                    Self::emit_frames(&mut self.pending, self.frame_samples, &out[0], &mut emit);
                }
                self.in_buf.clear();
            }
        }

        if !self.pending.is_empty() {
            self.pending.resize(self.frame_samples, 0.0);
            emit(&self.pending);
            self.pending.clear();
        }
    }

    fn emit_frames(
        pending: &mut Vec<f32>,
        frame_samples: usize,
        mut data: &[f32],
        emit: &mut impl FnMut(&[f32]),
    ) {
        while !data.is_empty() {
            let space = frame_samples - pending.len();
            let take = space.min(data.len());
            pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if pending.len() == frame_samples {
                emit(pending);
                pending.clear();
            }
        }
    }
}
