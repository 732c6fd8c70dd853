//! NDJSON transport for sync events
//!
//! One JSON object per line on stdout, optionally appended to a `.jsonl`
//! file as well. A failing writer is logged and dropped; the run never
//! notices.

use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tracing::warn;

use crate::application::EventStream;
use crate::domain::SyncEvent;

pub struct NdjsonSink<W> {
    writer: Option<W>,
    file: Option<File>,
}

impl NdjsonSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
            file: None,
        }
    }

    /// Also appends every line to `path`
    pub async fn with_file(mut self, path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.file = Some(OpenOptions::new().create(true).append(true).open(path).await?);
        Ok(self)
    }

    pub fn encode(event: &SyncEvent) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        Ok(line)
    }

    /// Pumps events until every emitter is dropped; returns the number written
    pub async fn run(mut self, mut stream: EventStream) -> usize {
        let mut written = 0;
        while let Some(event) = stream.recv().await {
            let line = match Self::encode(&event) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Event could not be encoded: {}", e);
                    continue;
                }
            };
            self.write_line(&line).await;
            written += 1;
        }
        self.flush().await;
        written
    }

    async fn write_line(&mut self, line: &str) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                warn!("Event output closed: {}", e);
                self.writer = None;
            } else {
                let _ = writer.flush().await;
            }
        }
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.write_all(line.as_bytes()).await {
                warn!("Event log file write failed: {}", e);
                self.file = None;
            }
        }
    }

    async fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush().await;
        }
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::EventEmitter;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_writes_one_line_per_event() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("events").join("run.jsonl");
        let (events, stream) = EventEmitter::channel();
        events.info("hello");
        events.emit(SyncEvent::fatal("stop"));
        drop(events);

        let mut out = Vec::new();
        let written = NdjsonSink::new(&mut out)
            .with_file(&log)
            .await
            .unwrap()
            .run(stream)
            .await;

        assert_eq!(written, 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["type"], "info");
        assert_eq!(first["message"], "hello");
        assert_eq!(std::fs::read_to_string(&log).unwrap(), text);
    }
}
