use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::MemoryError;

/// Small user-curated note that is always included in the memory context.
#[derive(Clone, Debug)]
pub struct CoreMemory {
    path: PathBuf,
}

impl CoreMemory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trimmed contents, or an empty string when the file is absent or unreadable.
    pub async fn read(&self) -> String {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw.trim().to_string(),
            Err(error) if error.kind() == ErrorKind::NotFound => String::new(),
            Err(error) => {
                warn!(
                    event_name = "memory.core.read_failed",
                    path = %self.path.display(),
                    error = %error,
                    "core memory unreadable, skipping"
                );
                String::new()
            }
        }
    }

    pub async fn set(&self, text: &str) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| MemoryError::io(parent, source))?;
        }

        let trimmed = text.trim();
        let contents = if trimmed.is_empty() { String::new() } else { format!("{trimmed}\n") };
        tokio::fs::write(&self.path, contents).await.map_err(|source| MemoryError::io(&self.path, source))
    }
}
