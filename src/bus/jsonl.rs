//! Append-only JSONL event sink.
//!
//! Each event becomes one line in the target file. Useful as an audit log or
//! as a hand-off point for an external broker shipper.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::bus::EventBus;
use crate::domain::EventEnvelope;
use crate::error::{JobBuildaError, Result};

pub struct JsonlBus {
    path: PathBuf,
    // serializes appends so concurrent events never interleave within a line
    lock: Mutex<()>,
}

impl JsonlBus {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventBus for JsonlBus {
    async fn publish(&self, event: &EventEnvelope) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| JobBuildaError::Bus(format!("Failed to open {}: {}", self.path.display(), e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| JobBuildaError::Bus(format!("Failed to append to {}: {}", self.path.display(), e)))?;
        file.flush().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}
