//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where recordings are written.
    pub output_dir: PathBuf,

    /// Default recording settings.
    pub recording: RecordingDefaults,

    /// Default preview settings.
    pub preview: PreviewDefaults,

    /// Device handling.
    pub devices: DeviceDefaults,

    /// Default audio capture settings.
    pub audio: AudioDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    /// Output resolution as "WxH".
    pub resolution: String,

    /// Target FPS.
    pub fps: u32,

    /// Video bitrate in kbit/s.
    pub bitrate_kbps: u32,

    /// Final container extension (mp4, mkv, mov, webm).
    pub container: String,
}

/// Default live preview parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewDefaults {
    /// Preview refresh rate.
    pub fps: u32,

    /// Preview frames wider than this are downscaled.
    pub max_width: u32,
}

/// Capture device parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceDefaults {
    /// How long a grabbed screenshot is reused, in milliseconds.
    pub screen_cache_ms: u64,

    /// Upper bound for opening any capture device, in milliseconds.
    pub open_timeout_ms: u64,

    /// Camera device index.
    pub camera_index: u32,
}

/// Default audio parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioDefaults {
    /// Whether audio is captured at all.
    pub enabled: bool,

    /// Abort start() when the audio stream cannot be opened.
    pub required: bool,

    /// Sample rate written into the PCM header.
    pub sample_rate: u32,

    /// Interleaved channel count.
    pub channels: u16,

    /// Frames per processed chunk.
    pub chunk_frames: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "tarantino_capture_engine=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs_default_recordings(),
            recording: RecordingDefaults::default(),
            preview: PreviewDefaults::default(),
            devices: DeviceDefaults::default(),
            audio: AudioDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            resolution: "1920x1080".to_string(),
            fps: 30,
            bitrate_kbps: 6000,
            container: "mp4".to_string(),
        }
    }
}

impl Default for PreviewDefaults {
    fn default() -> Self {
        Self {
            fps: 10,
            max_width: 640,
        }
    }
}

impl Default for DeviceDefaults {
    fn default() -> Self {
        Self {
            screen_cache_ms: 500,
            open_timeout_ms: 5000,
            camera_index: 0,
        }
    }
}

impl Default for AudioDefaults {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            sample_rate: 44_100,
            channels: 2,
            chunk_frames: 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("tarantino").join("config.json")
}

/// Default recordings directory.
fn dirs_default_recordings() -> PathBuf {
    let base = std::env::var("XDG_VIDEOS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join("Videos")
        });
    base.join("tarantino")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_in_defaults() {
        let json = r#"{ "recording": { "fps": 60 }, "audio": { "enabled": false } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.recording.fps, 60);
        assert_eq!(config.recording.resolution, "1920x1080");
        assert!(!config.audio.enabled);
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.devices.screen_cache_ms, 500);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.preview.max_width, config.preview.max_width);
        assert_eq!(parsed.logging.level, "info");
    }
}
