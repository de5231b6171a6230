//! Last-frame extraction using an external ffmpeg binary

use super::traits::ReferenceDeriver;
use crate::artifacts::fetch_bytes;
use crate::error::{Error, Result};
use crate::types::WorkItem;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use url::Url;

/// Extracts the last frame of a video as a PNG with `ffmpeg`
///
/// Remote artifacts are downloaded into the work directory first. The frame is
/// written to `<work_dir>/frame_<id>.png` and that path is returned as the
/// reference for the next item.
///
/// # Examples
///
/// ```no_run
/// use vidgen_batch::chain::FfmpegFrameExtractor;
/// use std::path::PathBuf;
///
/// let extractor = FfmpegFrameExtractor::from_path(PathBuf::from("/tmp/frames"))
///     .expect("ffmpeg not found in PATH");
/// ```
#[derive(Clone, Debug)]
pub struct FfmpegFrameExtractor {
    binary_path: PathBuf,
    work_dir: PathBuf,
}

impl FfmpegFrameExtractor {
    /// Create an extractor with an explicit binary path
    pub fn new(binary_path: PathBuf, work_dir: PathBuf) -> Self {
        Self {
            binary_path,
            work_dir,
        }
    }

    /// Find `ffmpeg` in PATH
    pub fn from_path(work_dir: PathBuf) -> Option<Self> {
        which::which("ffmpeg")
            .ok()
            .map(|binary| Self::new(binary, work_dir))
    }

    /// Binary this extractor runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    async fn local_video(&self, item: &WorkItem, artifact: &str) -> Result<PathBuf> {
        if artifact.starts_with("http://") || artifact.starts_with("https://") {
            let bytes = fetch_bytes(artifact).await?;
            let path = self.work_dir.join(format!("source_{}.mp4", item.id));
            tokio::fs::write(&path, bytes).await?;
            return Ok(path);
        }
        if artifact.starts_with("file://") {
            return Url::parse(artifact)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| Error::NotSupported(format!("not a local file URL: {artifact}")));
        }
        Ok(PathBuf::from(artifact))
    }
}

#[async_trait]
impl ReferenceDeriver for FfmpegFrameExtractor {
    async fn derive(&self, item: &WorkItem, artifact: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let video = self.local_video(item, artifact).await?;
        let frame = self.work_dir.join(format!("frame_{}.png", item.id));

        let output = Command::new(&self.binary_path)
            .arg("-sseof")
            .arg("-1")
            .arg("-i")
            .arg(&video)
            .arg("-frames:v")
            .arg("1")
            .arg("-y")
            .arg(&frame)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
            return Err(Error::ExternalTool(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )));
        }
        if !tokio::fs::try_exists(&frame).await.unwrap_or(false) {
            return Err(Error::ExternalTool(format!(
                "ffmpeg produced no frame for {}",
                video.display()
            )));
        }

        tracing::debug!(item_id = %item.id, frame = %frame.display(), "last frame extracted");
        Ok(frame.display().to_string())
    }
}
