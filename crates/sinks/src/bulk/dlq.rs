//! Dead-letter file writer
//!
//! One JSON line per abandoned operation, appended to a file opened with
//! create + append so restarts keep accumulating into the same file.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::value::RawValue;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::bulk::accumulator::BulkOperation;

#[derive(Serialize)]
struct DlqLine<'a> {
    document: &'a RawValue,
    failure: &'a str,
    attempt: usize,
    #[serde(rename = "pluginId")]
    plugin_id: &'a str,
    #[serde(rename = "pipelineName")]
    pipeline_name: &'a str,
    timestamp: String,
}

/// Append-only dead-letter file, one per sink instance
pub struct DlqWriter {
    file: File,
    path: PathBuf,
}

impl DlqWriter {
    /// Open (or create) the file for appending
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        tracing::info!(path = %path.display(), "dead-letter file opened");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one failed operation
    pub async fn write(
        &mut self,
        operation: &BulkOperation,
        failure: &str,
        attempt: usize,
        plugin_id: &str,
        pipeline_name: &str,
    ) -> std::io::Result<()> {
        // the document is known-valid JSON; embed it unquoted
        let document = RawValue::from_string(operation.document().to_string())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let line = DlqLine {
            document: &document,
            failure,
            attempt,
            plugin_id,
            pipeline_name,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let mut bytes = serde_json::to_vec(&line)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        bytes.push(b'\n');
        self.file.write_all(&bytes).await
    }

    /// Flush and close
    pub async fn close(mut self) -> std::io::Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await
    }
}
