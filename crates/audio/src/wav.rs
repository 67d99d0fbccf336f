//! 16-bit PCM WAV output.

use std::path::{Path, PathBuf};

use tarantino_common::error::{TarantinoError, TarantinoResult};
use tarantino_frame_model::AudioFormat;

/// Write interleaved samples to `path` with the session's PCM header.
pub fn write_wav(path: &Path, format: &AudioFormat, samples: &[i16]) -> TarantinoResult<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| {
        TarantinoError::write(format!("Failed to create {}: {e}", path.display()))
    })?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| TarantinoError::write(format!("Failed to write PCM sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| TarantinoError::write(format!("Failed to finalize WAV: {e}")))?;

    tracing::info!(
        path = %path.display(),
        samples = samples.len(),
        duration_secs = format.duration_of(samples.len()).as_secs_f64(),
        "Audio artifact written"
    );
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_matches_session_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("take.audio.wav");
        let format = AudioFormat {
            sample_rate: 22_050,
            channels: 1,
            chunk_frames: 256,
        };
        write_wav(&path, &format, &[0, 1, -1, i16::MAX, i16::MIN]).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 22_050);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.into_samples().map(Result::unwrap).collect();
        assert_eq!(samples, vec![0, 1, -1, i16::MAX, i16::MIN]);
    }
}
