//! Paths of the files a recording produces.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Container used for the intermediate video file.
pub const INTERMEDIATE_VIDEO_EXTENSION: &str = "mkv";

/// Container used for the intermediate audio file.
pub const INTERMEDIATE_AUDIO_EXTENSION: &str = "wav";

/// Intermediate and final artifacts of one recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArtifact {
    /// Encoded composite frames, before muxing.
    pub video: PathBuf,
    /// Conditioned PCM samples.
    pub audio: PathBuf,
    /// Muxed (or rewrapped) result.
    pub final_path: PathBuf,
}

impl OutputArtifact {
    /// Lay out artifacts as `<dir>/<name>.video.mkv`, `<dir>/<name>.audio.wav`
    /// and `<dir>/<name>.<container>`.
    pub fn in_dir(dir: &Path, name: &str, container: &str) -> Self {
        let container = container.trim_start_matches('.');
        Self {
            video: dir.join(format!("{name}.video.{INTERMEDIATE_VIDEO_EXTENSION}")),
            audio: dir.join(format!("{name}.audio.{INTERMEDIATE_AUDIO_EXTENSION}")),
            final_path: dir.join(format!("{name}.{container}")),
        }
    }

    pub fn has_video(&self) -> bool {
        is_nonempty_file(&self.video)
    }

    pub fn has_audio(&self) -> bool {
        is_nonempty_file(&self.audio)
    }

    pub fn has_final(&self) -> bool {
        is_nonempty_file(&self.final_path)
    }

    /// Extension of the final container, lowercased.
    pub fn container(&self) -> String {
        extension_of(&self.final_path)
    }
}

/// Lowercased extension of `path`, empty when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn is_nonempty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lays_out_paths_from_name_and_container() {
        let artifact = OutputArtifact::in_dir(Path::new("/tmp/out"), "take1", ".mp4");
        assert_eq!(artifact.video, PathBuf::from("/tmp/out/take1.video.mkv"));
        assert_eq!(artifact.audio, PathBuf::from("/tmp/out/take1.audio.wav"));
        assert_eq!(artifact.final_path, PathBuf::from("/tmp/out/take1.mp4"));
        assert_eq!(artifact.container(), "mp4");
    }

    #[test]
    fn missing_files_are_not_reported() {
        let artifact = OutputArtifact::in_dir(Path::new("/nonexistent/dir"), "x", "mkv");
        assert!(!artifact.has_video());
        assert!(!artifact.has_audio());
        assert!(!artifact.has_final());
    }
}
