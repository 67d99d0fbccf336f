//! Per-chunk audio conditioning.
//!
//! Chain order: noise gate (optional) → i16 to f32 → gain → soft
//! compression with clip → source volume → f32 to clamped i16.

use tarantino_frame_model::AudioSettings;

/// Magnitude above which compression applies, in full-scale units.
pub const COMPRESSION_KNEE: f32 = 0.5;

/// RMS gate used when noise suppression is enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseGateConfig {
    /// Chunks quieter than this are attenuated.
    pub threshold_dbfs: f32,

    /// Attenuation applied to gated chunks, in dB.
    pub attenuation_db: f32,
}

impl Default for NoiseGateConfig {
    fn default() -> Self {
        Self {
            threshold_dbfs: -45.0,
            attenuation_db: 20.0,
        }
    }
}

/// Linear amplitude factor for a level in dB.
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// RMS level of a chunk in dBFS; `-inf` for silence or an empty chunk.
pub fn rms_dbfs(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let x = s as f64 / 32768.0;
            x * x
        })
        .sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    if rms <= 0.0 {
        f32::NEG_INFINITY
    } else {
        (20.0 * rms.log10()) as f32
    }
}

/// Scale-then-clip compression: the part of the magnitude above the knee is
/// divided by `ratio`, then the result is clipped to `[-1, 1]`.
pub fn compress(x: f32, ratio: f32) -> f32 {
    let magnitude = x.abs();
    let shaped = if magnitude > COMPRESSION_KNEE && ratio > 1.0 {
        (COMPRESSION_KNEE + (magnitude - COMPRESSION_KNEE) / ratio).copysign(x)
    } else {
        x
    };
    shaped.clamp(-1.0, 1.0)
}

/// Convert a full-scale float back to a saturated i16.
pub fn to_i16(x: f32) -> i16 {
    (x * 32767.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Run one chunk through the conditioning chain.
pub fn condition_chunk(samples: &[i16], settings: &AudioSettings, gate: &NoiseGateConfig) -> Vec<i16> {
    let gate_gain = if settings.noise_suppression && rms_dbfs(samples) < gate.threshold_dbfs {
        db_to_gain(-gate.attenuation_db)
    } else {
        1.0
    };
    let gain = db_to_gain(settings.gain_db);
    let volume = settings.volume();

    samples
        .iter()
        .map(|&s| {
            let x = s as f32 / 32768.0 * gate_gain;
            let x = compress(x * gain, settings.compression_ratio);
            to_i16(x * volume)
        })
        .collect()
}
