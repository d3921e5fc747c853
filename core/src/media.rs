//! Media fetching and the probe/inspect capabilities the dispatcher uses.
//! Certificate validation is disabled on purpose: media comes from arbitrary third-party hosts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::config::{Config, DEFAULT_IMAGE_MAX_BYTES};
use crate::container;
use crate::dispatcher::{DurationProbe, MediaInspector};
use crate::error::{DecodeError, MediaError, Result};
use crate::qr::{FfmpegExtractor, FrameExtractor, QrScanner};

/// HTTP client for media hosts. Every request is single-shot and bounded by the timeout.
#[derive(Clone)]
pub struct MediaClient {
    http: reqwest::Client,
    prefix_limit: usize,
    image_limit: usize,
    data_dir: PathBuf,
}

impl MediaClient {
    pub fn new(timeout: Duration, prefix_limit: usize, data_dir: impl Into<PathBuf>) -> Result<Self, MediaError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(MediaError::Client)?;
        Ok(Self {
            http,
            prefix_limit,
            image_limit: DEFAULT_IMAGE_MAX_BYTES,
            data_dir: data_dir.into(),
        })
    }

    pub fn with_image_limit(mut self, limit: usize) -> Self {
        self.image_limit = limit;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, MediaError> {
        let res = self.http.get(url).send().await.map_err(|source| MediaError::Fetch {
            url: url.to_string(),
            source,
        })?;
        if !res.status().is_success() {
            return Err(MediaError::Status {
                url: url.to_string(),
                status: res.status().as_u16(),
            });
        }
        Ok(res)
    }

    /// Up to `prefix_limit` bytes from the start of the body. A read error after some data has
    /// arrived ends the read; what was captured is returned.
    pub async fn fetch_prefix(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        let mut res = self.get(url).await?;
        read_capped(&mut res, url, self.prefix_limit).await
    }

    /// Whole body, refused with `TooLarge` once it exceeds the image limit.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Bytes, MediaError> {
        let too_large = || MediaError::TooLarge {
            url: url.to_string(),
            limit: self.image_limit,
        };
        let mut res = self.get(url).await?;
        if res.content_length().is_some_and(|len| len > self.image_limit as u64) {
            return Err(too_large());
        }
        let body = read_capped(&mut res, url, self.image_limit.saturating_add(1)).await?;
        if body.len() > self.image_limit {
            return Err(too_large());
        }
        Ok(Bytes::from(body))
    }

    /// Stream the full body to `<data_dir>/<subdir>/<uuid>.<ext>`.
    pub async fn download(&self, url: &str, subdir: &str, ext: &str) -> Result<PathBuf, MediaError> {
        let mut res = self.get(url).await?;
        let dir = self.data_dir.join(subdir);
        let path = dir.join(format!("{}.{}", uuid::Uuid::new_v4(), ext));
        let io_err = |source| MediaError::Io {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&dir).await.map_err(io_err)?;
        let mut file = tokio::fs::File::create(&path).await.map_err(io_err)?;
        while let Some(chunk) = res.chunk().await.map_err(|source| MediaError::Fetch {
            url: url.to_string(),
            source,
        })? {
            file.write_all(&chunk).await.map_err(io_err)?;
        }
        file.flush().await.map_err(io_err)?;
        Ok(path)
    }
}

async fn read_capped(res: &mut reqwest::Response, url: &str, limit: usize) -> Result<Vec<u8>, MediaError> {
    let mut buf = Vec::with_capacity(limit.min(64 * 1024));
    while buf.len() < limit {
        match res.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(source) if buf.is_empty() => {
                return Err(MediaError::Fetch {
                    url: url.to_string(),
                    source,
                })
            }
            Err(e) => {
                tracing::debug!(url, read = buf.len(), error = %e, "body read ended early");
                break;
            }
        }
    }
    Ok(buf)
}

/// Default [`DurationProbe`] and [`MediaInspector`]: fetch over [`MediaClient`], parse the
/// container header, scan with [`QrScanner`] off the async runtime.
pub struct MediaPipeline {
    client: MediaClient,
    scanner: QrScanner,
    extractor: Arc<dyn FrameExtractor>,
    qr_limit: usize,
}

impl MediaPipeline {
    pub fn new(client: MediaClient, scanner: QrScanner, extractor: Arc<dyn FrameExtractor>, qr_limit: usize) -> Self {
        Self {
            client,
            scanner,
            extractor,
            qr_limit,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, MediaError> {
        let client = MediaClient::new(config.fetch_timeout(), config.media_prefix_bytes, &config.data_dir)?
            .with_image_limit(config.image_max_bytes);
        Ok(Self::new(
            client,
            QrScanner::default(),
            Arc::new(FfmpegExtractor::new(&config.ffmpeg_path)),
            config.qr_limit,
        ))
    }
}

#[async_trait]
impl DurationProbe for MediaPipeline {
    async fn duration_secs(&self, url: &str) -> Result<f64> {
        let prefix = self.client.fetch_prefix(url).await?;
        Ok(container::probe_duration(&prefix)?)
    }
}

#[async_trait]
impl MediaInspector for MediaPipeline {
    async fn download_video(&self, url: &str) -> Result<PathBuf> {
        let path = self.client.download(url, "clips", "mp4").await?;
        tracing::info!(url, path = %path.display(), "video saved");
        Ok(path)
    }

    async fn video_has_qr(&self, video: &Path) -> Result<bool> {
        let frames_dir = video.with_extension("frames");
        let frames = self.extractor.extract(video, &frames_dir).await?;
        let scanner = self.scanner.clone();
        let limit = self.qr_limit;
        let found = tokio::task::spawn_blocking(move || scanner.scan_frames(&frames, limit))
            .await
            .map_err(|e| DecodeError::Task(e.to_string()))?;
        Ok(found)
    }

    async fn image_has_qr(&self, url: &str) -> Result<bool> {
        let bytes = self.client.fetch_bytes(url).await?;
        let scanner = self.scanner.clone();
        let found = tokio::task::spawn_blocking(move || scanner.scan_bytes(&bytes))
            .await
            .map_err(|e| DecodeError::Task(e.to_string()))??;
        Ok(found)
    }
}
