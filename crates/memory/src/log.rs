use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::io::AsyncWriteExt;

use crate::store::MemorySource;
use crate::MemoryError;

/// Append-only markdown audit trail, one line per stored memory.
#[derive(Clone, Debug)]
pub struct MemoryLog {
    path: PathBuf,
}

impl MemoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(
        &self,
        text: &str,
        source: MemorySource,
        timestamp: DateTime<Utc>,
    ) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| MemoryError::io(parent, source))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| MemoryError::io(&self.path, source))?;

        file.write_all(format_line(text, source, timestamp).as_bytes())
            .await
            .map_err(|source| MemoryError::io(&self.path, source))?;
        file.flush().await.map_err(|source| MemoryError::io(&self.path, source))
    }
}

fn format_line(text: &str, source: MemorySource, timestamp: DateTime<Utc>) -> String {
    let timestamp = timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
    format!("- **[{timestamp}]** ({source}) {text}\n")
}
