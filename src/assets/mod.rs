pub mod audio;
pub mod cover;

use crate::saber::{COVER_FILENAME, SONG_FILENAME};
use crate::ConvertError;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Removes a partially written file unless kept.
pub(crate) struct PartialFile {
    pub(crate) path: PathBuf,
    pub(crate) keep: bool,
}

impl PartialFile {
    pub(crate) const fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.keep && self.path.is_file() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::warn!("Could not remove {}: {e}", self.path.display());
            }
        }
    }
}

/// Produces the audio and cover files of a level.
///
/// Both operations leave an existing output untouched, so reruns only pay
/// for what is missing.
pub trait AssetPipeline: Send + Sync + 'static {
    /// Transcode `source` into `song.egg` inside `target_dir`
    fn transcode_audio(
        &self,
        source: &Path,
        target_dir: &Path,
    ) -> impl Future<Output = Result<PathBuf, ConvertError>> + Send;

    /// Square `cover.jpg` inside `target_dir`, a placeholder without usable source
    fn convert_cover(
        &self,
        source: Option<&Path>,
        target_dir: &Path,
    ) -> impl Future<Output = Result<PathBuf, ConvertError>> + Send;
}

/// Assets converted with an external `ffmpeg` and the `image` crate.
#[derive(Debug, Clone)]
pub struct FfmpegAssets {
    ffmpeg: PathBuf,
    timeout: Duration,
    cover_size: u32,
}

impl FfmpegAssets {
    pub fn new(ffmpeg: impl Into<PathBuf>, timeout: Duration, cover_size: u32) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout,
            cover_size,
        }
    }
}

impl AssetPipeline for FfmpegAssets {
    async fn transcode_audio(&self, source: &Path, target_dir: &Path) -> Result<PathBuf, ConvertError> {
        let target = target_dir.join(SONG_FILENAME);
        audio::transcode(&self.ffmpeg, source, &target, self.timeout).await?;
        Ok(target)
    }

    async fn convert_cover(
        &self,
        source: Option<&Path>,
        target_dir: &Path,
    ) -> Result<PathBuf, ConvertError> {
        let target = target_dir.join(COVER_FILENAME);
        let source = source.map(Path::to_path_buf);
        let size = self.cover_size;
        let output = target.clone();
        // image decoding is CPU bound
        tokio::task::spawn_blocking(move || cover::convert(source.as_deref(), &output, size))
            .await
            .map_err(|e| ConvertError::Asset(format!("cover conversion aborted: {e}")))??;
        Ok(target)
    }
}
