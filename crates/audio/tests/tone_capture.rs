use std::time::Duration;

use tarantino_audio::{AudioCaptureEngine, ToneInput};
use tarantino_frame_model::{AudioFormat, AudioSettings};

fn format() -> AudioFormat {
    AudioFormat {
        sample_rate: 16_000,
        channels: 2,
        chunk_frames: 160,
    }
}

#[test]
fn captured_audio_tracks_wall_clock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.audio.wav");
    let mut engine = AudioCaptureEngine::new(format(), AudioSettings::default(), &path);
    engine
        .start(Box::new(ToneInput::new(format(), 440.0, 0.5)))
        .unwrap();
    std::thread::sleep(Duration::from_millis(600));
    let written = engine.stop().unwrap().expect("artifact path");
    assert_eq!(written, path);

    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().sample_rate, 16_000);
    assert_eq!(reader.spec().channels, 2);
    let frames = reader.duration() as f64;
    // 0.6 s at 16 kHz, generous bounds for scheduler jitter.
    assert!(frames > 0.4 * 16_000.0, "too few frames: {frames}");
    assert!(frames < 0.9 * 16_000.0, "too many frames: {frames}");
}

#[test]
fn paused_chunks_are_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = AudioCaptureEngine::new(
        format(),
        AudioSettings::default(),
        dir.path().join("paused.wav"),
    );
    engine.pause();
    engine
        .start(Box::new(ToneInput::new(format(), 440.0, 0.5)))
        .unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(engine.samples_captured(), 0);

    engine.resume();
    std::thread::sleep(Duration::from_millis(200));
    assert!(engine.samples_captured() > 0);
    engine.stop().unwrap();
}

#[test]
fn tone_is_conditioned_with_volume() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("muted.wav");
    let settings = AudioSettings {
        mic_volume: 0.0,
        ..Default::default()
    };
    let mut engine = AudioCaptureEngine::new(format(), settings, &path);
    engine
        .start(Box::new(ToneInput::new(format(), 440.0, 0.8)))
        .unwrap();
    std::thread::sleep(Duration::from_millis(100));
    engine.stop().unwrap();

    let samples: Vec<i16> = hound::WavReader::open(&path)
        .unwrap()
        .into_samples()
        .map(Result::unwrap)
        .collect();
    assert!(!samples.is_empty());
    assert!(samples.iter().all(|&s| s == 0));
}
