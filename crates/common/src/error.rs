//! Error types shared across Tarantino crates.

use std::path::PathBuf;

/// Top-level error type for Tarantino operations.
#[derive(Debug, thiserror::Error)]
pub enum TarantinoError {
    /// Screen or camera could not be opened or read at the device level.
    #[error("Device error: {message}")]
    Device { message: String },

    /// Audio input stream could not be opened.
    #[error("Audio stream error: {message}")]
    Stream { message: String },

    /// The video sink could not persist a frame or finalize its container.
    #[error("Write error: {message}")]
    Write { message: String },

    /// Merging the intermediate artifacts failed.
    #[error("Mux error: {message}")]
    Mux { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A single frame could not be captured; callers substitute and continue.
    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using TarantinoError.
pub type TarantinoResult<T> = Result<T, TarantinoError>;

impl TarantinoError {
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device {
            message: msg.into(),
        }
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream {
            message: msg.into(),
        }
    }

    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write {
            message: msg.into(),
        }
    }

    pub fn mux(msg: impl Into<String>) -> Self {
        Self::Mux {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    /// Whether the error only affects one frame or chunk.
    ///
    /// Transient errors are substituted inside worker loops instead of
    /// ending them.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Capture { .. } | Self::Write { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_category() {
        assert_eq!(
            TarantinoError::config("fps must be positive").to_string(),
            "Configuration error: fps must be positive"
        );
        assert_eq!(
            TarantinoError::mux("ffmpeg not found").to_string(),
            "Mux error: ffmpeg not found"
        );
    }

    #[test]
    fn only_frame_level_errors_are_transient() {
        assert!(TarantinoError::capture("dropped").is_transient());
        assert!(TarantinoError::write("disk full").is_transient());
        assert!(!TarantinoError::device("no camera").is_transient());
        assert!(!TarantinoError::stream("no mic").is_transient());
    }
}
