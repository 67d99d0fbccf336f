//! Tarantino Audio
//!
//! The parallel audio branch of a recording:
//! - **Capture loop:** a worker thread pulling fixed-size PCM chunks from an
//!   [`AudioInput`] and appending them, conditioned, to an ordered buffer
//! - **Conditioning:** noise gate, gain, soft compression, and source volume
//! - **Output:** 16-bit PCM WAV written when the engine stops

pub mod conditioning;
pub mod engine;
pub mod tone;
pub mod wav;

pub use conditioning::{condition_chunk, NoiseGateConfig};
pub use engine::{AudioCaptureEngine, AudioInput};
pub use tone::ToneInput;
pub use wav::write_wav;
