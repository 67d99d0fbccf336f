//! Real-time paced sine tone, an [`AudioInput`] that needs no device.

use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use tarantino_common::error::TarantinoResult;
use tarantino_frame_model::AudioFormat;

use crate::engine::AudioInput;

/// Sine generator that releases samples no faster than real time.
#[derive(Debug)]
pub struct ToneInput {
    format: AudioFormat,
    frequency_hz: f32,
    amplitude: f32,
    frames_emitted: u64,
    started_at: Option<Instant>,
}

impl ToneInput {
    pub fn new(format: AudioFormat, frequency_hz: f32, amplitude: f32) -> Self {
        Self {
            format,
            frequency_hz,
            amplitude: amplitude.clamp(0.0, 1.0),
            frames_emitted: 0,
            started_at: None,
        }
    }

    fn due(&self, started_at: Instant, frames: u64) -> Instant {
        started_at + Duration::from_secs_f64(frames as f64 / self.format.sample_rate.max(1) as f64)
    }
}

impl AudioInput for ToneInput {
    fn read_chunk(&mut self, max_samples: usize) -> TarantinoResult<Vec<i16>> {
        let channels = self.format.channels.max(1) as usize;
        let frames = (max_samples / channels).max(1) as u64;
        let started_at = *self.started_at.get_or_insert_with(Instant::now);

        let due = self.due(started_at, self.frames_emitted + frames);
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }

        let rate = self.format.sample_rate.max(1) as f32;
        let mut chunk = Vec::with_capacity(frames as usize * channels);
        for i in 0..frames {
            let t = (self.frames_emitted + i) as f32 / rate;
            let value = (TAU * self.frequency_hz * t).sin() * self.amplitude;
            let sample = (value * 32767.0).round() as i16;
            chunk.extend(std::iter::repeat(sample).take(channels));
        }
        self.frames_emitted += frames;
        Ok(chunk)
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn name(&self) -> &str {
        "tone"
    }
}
