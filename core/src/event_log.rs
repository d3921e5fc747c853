//! Moderation event log: one line per decision, appended to `<dir>/<YYYY-MM-DD>.log`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

/// Sink for moderation events (withdrawals, probe failures, QR verdicts).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, message: &str);
}

/// Daily-file sink. Write failures are reported through tracing and otherwise ignored.
pub struct DailyFileLog {
    dir: PathBuf,
}

impl DailyFileLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn append(&self, message: &str) -> std::io::Result<()> {
        let now = chrono::Local::now();
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.log", now.format("%Y-%m-%d")));
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
        let line = format!("{}: {}\n", now.format("%H:%M:%S"), message);
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl EventSink for DailyFileLog {
    async fn record(&self, message: &str) {
        tracing::info!(target: "withdraw::event", "{}", message);
        if let Err(e) = self.append(message).await {
            tracing::warn!(dir = %self.dir.display(), error = %e, "event log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_timestamped_lines_to_todays_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = DailyFileLog::new(dir.path().join("video"));
        log.record("first").await;
        log.record("second").await;

        let path = log
            .dir()
            .join(format!("{}.log", chrono::Local::now().format("%Y-%m-%d")));
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": first"));
        assert!(lines[1].ends_with(": second"));
    }
}
