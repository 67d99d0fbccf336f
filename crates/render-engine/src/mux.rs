//! Final mux of the intermediate artifacts via ffmpeg.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tarantino_common::error::{TarantinoError, TarantinoResult};
use tarantino_frame_model::extension_of;

/// Combines the intermediate video (and optional audio) into the final file.
pub trait Muxer: Send + Sync {
    /// Write `output` from `video` plus `audio` when present.
    ///
    /// Without audio the video stream is rewrapped alone.
    fn merge(&self, video: &Path, audio: Option<&Path>, output: &Path) -> TarantinoResult<PathBuf>;

    /// Check if this muxer can run on the system.
    fn is_available(&self) -> bool;

    /// Muxer name.
    fn name(&self) -> &str;
}

/// Muxer backed by the `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    binary: String,
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegMuxer {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    /// Use a specific ffmpeg executable (name on `PATH` or absolute path).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Muxer for FfmpegMuxer {
    fn merge(&self, video: &Path, audio: Option<&Path>, output: &Path) -> TarantinoResult<PathBuf> {
        require_input(video, "video")?;
        if let Some(audio) = audio {
            require_input(audio, "audio")?;
        }
        if !self.is_available() {
            return Err(TarantinoError::mux(format!(
                "{} not found in PATH; raw artifacts kept",
                self.binary
            )));
        }
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let args = merge_args(video, audio, output);
        tracing::debug!(args = ?args, "Running ffmpeg");
        let result = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| TarantinoError::mux(format!("Failed to start ffmpeg: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(TarantinoError::mux(format!(
                "ffmpeg mux failed (status {}): {}",
                result.status,
                stderr.trim()
            )));
        }

        tracing::info!(
            output = %output.display(),
            with_audio = audio.is_some(),
            "Mux complete"
        );
        Ok(output.to_path_buf())
    }

    fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Audio codec accepted by the target container.
pub fn audio_codec_for(container: &str) -> &'static str {
    match container {
        "webm" => "libopus",
        _ => "aac",
    }
}

/// ffmpeg arguments for a merge (or, without audio, a rewrap).
pub fn merge_args(video: &Path, audio: Option<&Path>, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
        .into_iter()
        .map(String::from)
        .collect();
    args.push("-i".to_string());
    args.push(video.display().to_string());

    match audio {
        Some(audio) => {
            args.push("-i".to_string());
            args.push(audio.display().to_string());
            args.extend(
                [
                    "-map",
                    "0:v:0",
                    "-map",
                    "1:a:0",
                    "-c:v",
                    "copy",
                    "-c:a",
                    audio_codec_for(&extension_of(output)),
                    "-shortest",
                ]
                .into_iter()
                .map(String::from),
            );
        }
        None => {
            args.extend(["-c", "copy"].into_iter().map(String::from));
        }
    }

    args.push(output.display().to_string());
    args
}

fn require_input(path: &Path, what: &str) -> TarantinoResult<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(TarantinoError::mux(format!(
            "Intermediate {what} artifact is empty: {}",
            path.display()
        ))),
        Err(_) => Err(TarantinoError::mux(format!(
            "Intermediate {what} artifact is missing: {}",
            path.display()
        ))),
    }
}

/// Whether `binary` resolves on `PATH` (or is an existing path).
pub fn command_exists(binary: &str) -> bool {
    if binary.contains('/') {
        return Path::new(binary).is_file();
    }
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_args_copy_video_and_encode_audio() {
        let args = merge_args(
            Path::new("/r/take.video.mkv"),
            Some(Path::new("/r/take.audio.wav")),
            Path::new("/r/take.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-i /r/take.video.mkv -i /r/take.audio.wav"));
        assert!(joined.contains("-c:v copy -c:a aac -shortest"));
        assert_eq!(args.last().map(String::as_str), Some("/r/take.mp4"));
    }

    #[test]
    fn webm_uses_opus() {
        let args = merge_args(
            Path::new("v.mkv"),
            Some(Path::new("a.wav")),
            Path::new("out.WEBM"),
        );
        assert!(args.iter().any(|a| a == "libopus"));
    }

    #[test]
    fn video_only_is_a_stream_copy() {
        let args = merge_args(Path::new("v.mkv"), None, Path::new("out.mp4"));
        let joined = args.join(" ");
        assert!(joined.ends_with("-i v.mkv -c copy out.mp4"));
        assert!(!joined.contains("-shortest"));
    }

    #[test]
    fn missing_inputs_are_mux_errors() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = FfmpegMuxer::new();
        let err = muxer
            .merge(&dir.path().join("none.mkv"), None, &dir.path().join("o.mp4"))
            .unwrap_err();
        assert!(matches!(err, TarantinoError::Mux { .. }));

        let empty = dir.path().join("empty.mkv");
        std::fs::write(&empty, b"").unwrap();
        let err = muxer.merge(&empty, None, &dir.path().join("o.mp4")).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn unavailable_binary_is_a_mux_error() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("v.mkv");
        std::fs::write(&video, b"not really video").unwrap();
        let muxer = FfmpegMuxer::with_binary("tarantino-no-such-ffmpeg");
        assert!(!muxer.is_available());
        let err = muxer.merge(&video, None, &dir.path().join("o.mp4")).unwrap_err();
        assert!(matches!(err, TarantinoError::Mux { .. }));
        assert!(!dir.path().join("o.mp4").exists());
    }
}
