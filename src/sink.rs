//! Where finished records go.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::models::JobRecord;

/// Append-only destination for job records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn emit(&self, record: &JobRecord) -> Result<()>;
}

/// One JSON object per line, to a file or stdout.
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    target: String,
}

impl JsonLinesSink {
    /// Append to `path`, creating it and its parent directory if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
        }
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open output file: {}", path.display()))?;

        Ok(Self {
            writer: Mutex::new(Box::new(file)),
            target: path.display().to_string(),
        })
    }

    pub fn stdout() -> Self {
        Self {
            writer: Mutex::new(Box::new(tokio::io::stdout())),
            target: "stdout".to_string(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn emit(&self, record: &JobRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record).context("Failed to serialize job record")?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .with_context(|| format!("Failed to write record to {}", self.target))?;
        writer.flush().await?;
        Ok(())
    }
}

/// Default output location: `<data dir>/kununu-jobs/jobs.jsonl`, else `./jobs.jsonl`.
pub fn default_output_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "kununu-jobs") {
        proj_dirs.data_dir().join("jobs.jsonl")
    } else {
        PathBuf::from("jobs.jsonl")
    }
}

/// Keeps records in memory, in emit order.
#[cfg(test)]
#[derive(Default)]
pub struct MemorySink {
    pub records: std::sync::Mutex<Vec<JobRecord>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn urls(&self) -> Vec<String> {
        self.records.lock().unwrap().iter().map(|r| r.url.clone()).collect()
    }
}

#[cfg(test)]
#[async_trait]
impl RecordSink for MemorySink {
    async fn emit(&self, record: &JobRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_lines_sink_appends_one_line_per_record() {
        let dir = std::env::temp_dir().join(format!("kununu-jobs-sink-{}", std::process::id()));
        let path = dir.join("out.jsonl");
        let _ = tokio::fs::remove_file(&path).await;

        let sink = JsonLinesSink::open(&path).await.unwrap();
        sink.emit(&JobRecord::stub("https://www.kununu.com/de/job/1")).await.unwrap();
        sink.emit(&JobRecord::stub("https://www.kununu.com/de/job/2")).await.unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: JobRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.url, "https://www.kununu.com/de/job/2");

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[test]
    fn test_default_output_path_names_file() {
        assert!(default_output_path().ends_with("jobs.jsonl"));
    }
}
