//! Media introspection for video items
//!
//! Thumbnail extraction and stream probing via the ffmpeg tools, invoked
//! lazily by the presentation layer and cached on disk. Never called by
//! the ingestion engine; a missing ffmpeg binary just means no artifact.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::mime;

#[derive(Clone)]
pub struct MediaService {
    thumbnail_dir: PathBuf,
}

impl MediaService {
    pub async fn new(thumbnail_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let thumbnail_dir = thumbnail_dir.into();
        tokio::fs::create_dir_all(&thumbnail_dir).await?;
        Ok(Self { thumbnail_dir })
    }

    pub fn thumbnail_path(&self, item_id: &str) -> PathBuf {
        self.thumbnail_dir.join(format!("{}.jpg", item_id))
    }

    /// Thumbnail for a video file, extracted at t=1s and cached as
    /// `<item id>.jpg`. `None` for non-video content or when extraction
    /// is not possible.
    pub async fn thumbnail(
        &self,
        item_id: &str,
        extension: &str,
        source: &Path,
    ) -> Option<PathBuf> {
        if !mime::is_video(extension) {
            return None;
        }

        let target = self.thumbnail_path(item_id);
        if tokio::fs::metadata(&target).await.is_ok() {
            return Some(target);
        }

        let status = Command::new("ffmpeg")
            .arg("-y")
            .args(["-ss", "1"])
            .arg("-i")
            .arg(source)
            .args(["-frames:v", "1"])
            .arg(&target)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Some(target),
            Ok(status) => {
                tracing::warn!(item_id = %item_id, code = ?status.code(), "ffmpeg failed to extract thumbnail");
                None
            }
            Err(e) => {
                tracing::warn!(item_id = %item_id, error = %e, "ffmpeg unavailable");
                None
            }
        }
    }

    /// Container/stream metadata as reported by ffprobe, for listeners that
    /// want to inspect finalized videos.
    pub async fn probe(&self, source: &Path) -> Option<serde_json::Value> {
        let output = Command::new("ffprobe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(source)
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }
        serde_json::from_slice(&output.stdout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn non_video_yields_no_thumbnail() {
        let dir = TempDir::new().unwrap();
        let media = MediaService::new(dir.path().join("thumbs")).await.unwrap();

        let result = media
            .thumbnail("abc", "png", Path::new("/nonexistent.png"))
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn cached_thumbnail_is_served_without_ffmpeg() {
        let dir = TempDir::new().unwrap();
        let media = MediaService::new(dir.path().join("thumbs")).await.unwrap();

        let cached = media.thumbnail_path("abc");
        tokio::fs::write(&cached, b"jpeg bytes").await.unwrap();

        let result = media
            .thumbnail("abc", "mp4", Path::new("/nonexistent.mp4"))
            .await;
        assert_eq!(result, Some(cached));
    }
}
