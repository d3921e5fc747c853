//! Frame sampling for the video variant of the scanner.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ExternalToolError;

/// Samples a video into still frames under `out_dir` and returns them in playback order.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract(&self, video: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, ExternalToolError>;
}

/// One frame per second via `ffmpeg -vf fps=1`. No deadline is applied to the child process.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    program: PathBuf,
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    async fn extract(&self, video: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, ExternalToolError> {
        let tool = self.program.display().to_string();
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|source| ExternalToolError::Io {
                path: out_dir.to_path_buf(),
                source,
            })?;

        let output = Command::new(&self.program)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(video)
            .arg("-vf")
            .arg("fps=1")
            .arg(out_dir.join("frame_%04d.jpg"))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ExternalToolError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExternalToolError::Failed {
                tool,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let frames = list_frames(out_dir).await?;
        tracing::debug!(video = %video.display(), frames = frames.len(), "frames extracted");
        Ok(frames)
    }
}

/// `*.jpg` files directly under `dir`, sorted by name.
pub async fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, ExternalToolError> {
    let io_err = |source| ExternalToolError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut frames = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        let is_jpg = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpg"));
        if is_jpg && entry.file_type().await.map_err(io_err)?.is_file() {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}
