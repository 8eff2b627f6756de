use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append/write sink keyed by stream name.
///
/// Real implementation: `FileAuditSink`. In-memory double: `MemoryAuditSink`.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append `text` to the end of `stream`, creating it if needed.
    async fn append(&self, stream: &str, text: &str) -> Result<()>;

    /// Replace the contents of `stream` with `text`.
    async fn write(&self, stream: &str, text: &str) -> Result<()>;
}

/// Writes each stream as a file under the workspace directory.
pub struct FileAuditSink {
    workspace_dir: PathBuf,
}

impl FileAuditSink {
    pub fn new(workspace_dir: impl AsRef<Path>) -> Self {
        Self {
            workspace_dir: workspace_dir.as_ref().to_path_buf(),
        }
    }

    pub fn stream_path(&self, stream: &str) -> PathBuf {
        self.workspace_dir.join(stream)
    }

    async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.workspace_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create workspace directory {}",
                    self.workspace_dir.display()
                )
            })
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn append(&self, stream: &str, text: &str) -> Result<()> {
        self.ensure_dir().await?;
        let path = self.stream_path(stream);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open audit stream {}", path.display()))?;
        file.write_all(text.as_bytes())
            .await
            .with_context(|| format!("Failed to append to {}", path.display()))?;
        file.flush().await?;
        Ok(())
    }

    async fn write(&self, stream: &str, text: &str) -> Result<()> {
        self.ensure_dir().await?;
        let path = self.stream_path(stream);
        tokio::fs::write(&path, text)
            .await
            .with_context(|| format!("Failed to write audit stream {}", path.display()))
    }
}

/// Keeps streams in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    streams: Mutex<HashMap<String, String>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of `stream`, if it was ever touched.
    pub async fn contents(&self, stream: &str) -> Option<String> {
        self.streams.lock().await.get(stream).cloned()
    }

    pub async fn stream_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.streams.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, stream: &str, text: &str) -> Result<()> {
        self.streams
            .lock()
            .await
            .entry(stream.to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn write(&self, stream: &str, text: &str) -> Result<()> {
        self.streams
            .lock()
            .await
            .insert(stream.to_string(), text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_sink_creates_workspace_on_demand() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path().join("nested/workspace");
        let sink = FileAuditSink::new(&workspace);

        sink.append("outline.md", "first").await.unwrap();

        assert!(workspace.exists());
        let content = std::fs::read_to_string(workspace.join("outline.md")).unwrap();
        assert_eq!(content, "first");
    }

    #[tokio::test]
    async fn test_file_sink_append_accumulates() {
        let dir = TempDir::new().unwrap();
        let sink = FileAuditSink::new(dir.path());

        sink.append("content.md", "a").await.unwrap();
        sink.append("content.md", "b").await.unwrap();

        let content = std::fs::read_to_string(sink.stream_path("content.md")).unwrap();
        assert_eq!(content, "ab");
    }

    #[tokio::test]
    async fn test_file_sink_write_truncates() {
        let dir = TempDir::new().unwrap();
        let sink = FileAuditSink::new(dir.path());

        sink.append("final_report.md", "old trial output").await.unwrap();
        sink.write("final_report.md", "").await.unwrap();

        let content = std::fs::read_to_string(sink.stream_path("final_report.md")).unwrap();
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn test_memory_sink_tracks_streams() {
        let sink = MemoryAuditSink::new();
        sink.append("b.md", "x").await.unwrap();
        sink.append("b.md", "y").await.unwrap();
        sink.write("a.md", "z").await.unwrap();

        assert_eq!(sink.contents("b.md").await.as_deref(), Some("xy"));
        assert_eq!(sink.contents("a.md").await.as_deref(), Some("z"));
        assert_eq!(sink.contents("missing.md").await, None);
        assert_eq!(sink.stream_names().await, vec!["a.md", "b.md"]);
    }
}
