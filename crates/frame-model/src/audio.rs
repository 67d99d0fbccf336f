//! Audio conditioning settings and PCM layout.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tarantino_common::error::{TarantinoError, TarantinoResult};

/// Which device feeds the audio branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSourceKind {
    #[default]
    Microphone,
    /// Loopback of what the system is playing.
    System,
}

/// Conditioning controls, read as one snapshot per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub source: AudioSourceKind,
    pub mic_volume: f32,
    pub system_volume: f32,
    pub gain_db: f32,
    /// Ratio applied above the compression knee; 1.0 disables.
    pub compression_ratio: f32,
    pub noise_suppression: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            source: AudioSourceKind::Microphone,
            mic_volume: 1.0,
            system_volume: 1.0,
            gain_db: 0.0,
            compression_ratio: 1.0,
            noise_suppression: false,
        }
    }
}

impl AudioSettings {
    /// Volume multiplier for the configured source.
    pub fn volume(&self) -> f32 {
        match self.source {
            AudioSourceKind::Microphone => self.mic_volume,
            AudioSourceKind::System => self.system_volume,
        }
    }

    pub fn validate(&self) -> TarantinoResult<()> {
        for (name, value) in [
            ("mic_volume", self.mic_volume),
            ("system_volume", self.system_volume),
        ] {
            if !value.is_finite() || !(0.0..=4.0).contains(&value) {
                return Err(TarantinoError::config(format!(
                    "Audio '{name}' = {value} is outside 0..=4"
                )));
            }
        }
        if !self.gain_db.is_finite() || !(-60.0..=60.0).contains(&self.gain_db) {
            return Err(TarantinoError::config(format!(
                "Audio gain {} dB is outside -60..=60",
                self.gain_db
            )));
        }
        if !self.compression_ratio.is_finite() || self.compression_ratio < 1.0 {
            return Err(TarantinoError::config(format!(
                "Compression ratio {} must be at least 1",
                self.compression_ratio
            )));
        }
        Ok(())
    }
}

/// Fixed PCM layout of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames (samples per channel) per processed chunk.
    pub chunk_frames: usize,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            chunk_frames: 1024,
        }
    }
}

impl AudioFormat {
    /// Interleaved samples per chunk.
    pub fn chunk_samples(&self) -> usize {
        self.chunk_frames * self.channels as usize
    }

    /// Wall time covered by one chunk.
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_frames as f64 / self.sample_rate.max(1) as f64)
    }

    /// Duration of `samples` interleaved samples.
    pub fn duration_of(&self, samples: usize) -> Duration {
        let frames = samples / self.channels.max(1) as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }

    pub fn validate(&self) -> TarantinoResult<()> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(TarantinoError::config(format!(
                "Sample rate {} is outside 8000..=192000",
                self.sample_rate
            )));
        }
        if !(1..=8).contains(&self.channels) {
            return Err(TarantinoError::config(format!(
                "Channel count {} is outside 1..=8",
                self.channels
            )));
        }
        if self.chunk_frames == 0 {
            return Err(TarantinoError::config("Audio chunk size must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_follows_source_kind() {
        let mut settings = AudioSettings {
            mic_volume: 0.5,
            system_volume: 2.0,
            ..Default::default()
        };
        assert_eq!(settings.volume(), 0.5);
        settings.source = AudioSourceKind::System;
        assert_eq!(settings.volume(), 2.0);
    }

    #[test]
    fn format_durations() {
        let format = AudioFormat {
            sample_rate: 48_000,
            channels: 2,
            chunk_frames: 480,
        };
        assert_eq!(format.chunk_samples(), 960);
        assert_eq!(format.chunk_duration(), Duration::from_millis(10));
        assert_eq!(format.duration_of(96_000), Duration::from_secs(1));
    }

    #[test]
    fn rejects_invalid_settings() {
        let bad_ratio = AudioSettings {
            compression_ratio: 0.5,
            ..Default::default()
        };
        assert!(bad_ratio.validate().is_err());
        let bad_gain = AudioSettings {
            gain_db: 90.0,
            ..Default::default()
        };
        assert!(bad_gain.validate().is_err());
        let bad_format = AudioFormat {
            channels: 0,
            ..Default::default()
        };
        assert!(bad_format.validate().is_err());
    }
}
