//! Audio source resolution
//!
//! Jobs reference audio files by id; the source turns that reference into
//! a locally readable path before the engine runs. Remote backends stage
//! into the job's scratch directory, which the caller owns and removes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::storage::AudioFile;
use crate::{Result, ScribedError};

#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Resolve a registered file to a readable local path. Anything staged
    /// or downloaded must land under `work_dir` so job cleanup removes it.
    async fn resolve(&self, file: &AudioFile, work_dir: &Path) -> Result<PathBuf>;
}

/// Source for audio already on the local filesystem
pub struct LocalAudioSource;

#[async_trait]
impl AudioSource for LocalAudioSource {
    async fn resolve(&self, file: &AudioFile, _work_dir: &Path) -> Result<PathBuf> {
        let path = PathBuf::from(&file.source_path);

        if !path.is_file() {
            return Err(ScribedError::NotFound(format!(
                "audio file {} missing at {}",
                file.id,
                path.display()
            )));
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let audio_path = tmp.path().join("meeting.wav");
        std::fs::write(&audio_path, b"fake audio").unwrap();

        let file = AudioFile::new(
            "meeting.wav".to_string(),
            audio_path.to_string_lossy().to_string(),
        );

        let resolved = LocalAudioSource
            .resolve(&file, tmp.path())
            .await
            .unwrap();
        assert_eq!(resolved, audio_path);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let file = AudioFile::new(
            "gone.wav".to_string(),
            tmp.path().join("gone.wav").to_string_lossy().to_string(),
        );

        let err = LocalAudioSource
            .resolve(&file, tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ScribedError::NotFound(_)));
    }
}
