use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::MemoryError;

const STORE_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    User,
    Auto,
}

impl MemorySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub timestamp: DateTime<Utc>,
    pub source: MemorySource,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScoredEntry {
    pub entry: MemoryEntry,
    pub score: f32,
}

/// A store rewrite waiting in the staging file.
#[derive(Debug)]
pub struct StagedAppend {
    entry: MemoryEntry,
    staging: PathBuf,
}

impl StagedAppend {
    pub fn entry(&self) -> &MemoryEntry {
        &self.entry
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    entries: Vec<MemoryEntry>,
}

/// JSON file of memory entries, read and rewritten wholesale on every access.
#[derive(Clone, Debug)]
pub struct VectorStore {
    path: PathBuf,
}

impl VectorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing and unreadable files both load as an empty store.
    pub async fn load(&self) -> Vec<MemoryEntry> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(error) => {
                warn!(
                    event_name = "memory.store.read_failed",
                    path = %self.path.display(),
                    error = %error,
                    "memory store unreadable, treating as empty"
                );
                return Vec::new();
            }
        };

        match serde_json::from_str::<StoreFile>(&raw) {
            Ok(file) => file.entries,
            Err(error) => {
                warn!(
                    event_name = "memory.store.corrupt",
                    path = %self.path.display(),
                    error = %error,
                    "memory store is not valid JSON, treating as empty"
                );
                Vec::new()
            }
        }
    }

    fn staging_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    async fn write_staging(&self, entries: Vec<MemoryEntry>) -> Result<PathBuf, MemoryError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| MemoryError::io(parent, source))?;
        }

        let json = serde_json::to_string_pretty(&StoreFile { version: STORE_VERSION, entries })?;
        let staging = self.staging_path();
        tokio::fs::write(&staging, json).await.map_err(|source| MemoryError::io(&staging, source))?;
        Ok(staging)
    }

    pub async fn append(
        &self,
        text: &str,
        embedding: Vec<f32>,
        source: MemorySource,
    ) -> Result<MemoryEntry, MemoryError> {
        let staged = self.stage_append(text, embedding, source).await?;
        self.commit(staged).await
    }

    /// Writes the store with the new entry to a staging file. The live store
    /// is untouched until [`VectorStore::commit`].
    pub async fn stage_append(
        &self,
        text: &str,
        embedding: Vec<f32>,
        source: MemorySource,
    ) -> Result<StagedAppend, MemoryError> {
        let mut entries = self.load().await;

        if let Some(expected) = entries.first().map(|entry| entry.embedding.len()) {
            if expected != embedding.len() {
                return Err(MemoryError::DimensionMismatch { expected, actual: embedding.len() });
            }
        }

        let timestamp = Utc::now();
        let entry = MemoryEntry {
            id: new_memory_id(timestamp),
            text: text.to_string(),
            embedding,
            timestamp,
            source,
        };
        entries.push(entry.clone());
        let staging = self.write_staging(entries).await?;

        Ok(StagedAppend { entry, staging })
    }

    pub async fn commit(&self, staged: StagedAppend) -> Result<MemoryEntry, MemoryError> {
        tokio::fs::rename(&staged.staging, &self.path)
            .await
            .map_err(|source| MemoryError::io(&self.path, source))?;
        Ok(staged.entry)
    }

    pub async fn discard(&self, staged: StagedAppend) {
        if let Err(error) = tokio::fs::remove_file(&staged.staging).await {
            warn!(
                event_name = "memory.store.discard_failed",
                path = %staged.staging.display(),
                error = %error,
                "staged memory store could not be removed"
            );
        }
    }

    pub async fn search(&self, query: &[f32], top_k: usize) -> Vec<ScoredEntry> {
        rank(self.load().await, query, top_k)
    }

    pub async fn count(&self) -> usize {
        self.load().await.len()
    }
}

/// Scores every entry against `query`, highest first. Equal scores keep
/// insertion order. Entries of a different dimension are skipped.
pub fn rank(entries: Vec<MemoryEntry>, query: &[f32], top_k: usize) -> Vec<ScoredEntry> {
    let mut scored: Vec<ScoredEntry> = entries
        .into_iter()
        .filter(|entry| entry.embedding.len() == query.len())
        .map(|entry| {
            let score = cosine_similarity(query, &entry.embedding);
            ScoredEntry { entry, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);
    scored
}

fn new_memory_id(timestamp: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("mem_{}_{}", timestamp.timestamp_millis(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use super::{rank, MemoryEntry, MemorySource, VectorStore};
    use crate::MemoryError;

    fn entry(id: &str, embedding: Vec<f32>) -> MemoryEntry {
        MemoryEntry {
            id: id.to_string(),
            text: id.to_string(),
            embedding,
            timestamp: Utc::now(),
            source: MemorySource::User,
        }
    }

    #[test]
    fn rank_orders_descending_and_keeps_insertion_order_on_ties() {
        let entries = vec![
            entry("low", vec![0.0, 1.0]),
            entry("tie-first", vec![1.0, 1.0]),
            entry("tie-second", vec![1.0, 1.0]),
            entry("best", vec![1.0, 0.0]),
        ];

        let ranked = rank(entries, &[1.0, 0.0], 3);
        let ids: Vec<&str> = ranked.iter().map(|scored| scored.entry.id.as_str()).collect();

        assert_eq!(ids, vec!["best", "tie-first", "tie-second"]);
    }

    #[test]
    fn rank_skips_entries_with_other_dimensions() {
        let entries = vec![entry("short", vec![1.0]), entry("match", vec![1.0, 0.0])];
        let ranked = rank(entries, &[1.0, 0.0], 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].entry.id, "match");
    }

    #[tokio::test]
    async fn missing_and_corrupt_files_load_empty() {
        let dir = TempDir::new().expect("tempdir");
        let store = VectorStore::new(dir.path().join("memories.json"));
        assert!(store.load().await.is_empty());

        std::fs::write(store.path(), "{ not json").expect("write corrupt file");
        assert!(store.load().await.is_empty());

        let stored = store.append("fresh", vec![1.0, 0.0], MemorySource::Auto).await;
        assert!(stored.is_ok());
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn append_persists_versioned_file_with_generated_ids() {
        let dir = TempDir::new().expect("tempdir");
        let store = VectorStore::new(dir.path().join("nested").join("memories.json"));

        let first = store.append("one", vec![1.0, 0.0], MemorySource::User).await.expect("append");
        let second = store.append("two", vec![0.0, 1.0], MemorySource::Auto).await.expect("append");

        assert!(first.id.starts_with("mem_"));
        assert_ne!(first.id, second.id);

        let raw = std::fs::read_to_string(store.path()).expect("read store");
        let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(parsed["version"], 1);
        assert_eq!(parsed["entries"][1]["source"], "auto");
    }

    #[tokio::test]
    async fn staged_append_is_invisible_until_committed() {
        let dir = TempDir::new().expect("tempdir");
        let store = VectorStore::new(dir.path().join("memories.json"));
        store.append("kept", vec![1.0, 0.0], MemorySource::User).await.expect("append");

        let staged = store.stage_append("pending", vec![0.0, 1.0], MemorySource::Auto).await.expect("stage");
        assert_eq!(staged.entry().text, "pending");
        assert_eq!(store.count().await, 1);

        store.discard(staged).await;
        assert_eq!(store.count().await, 1);
        assert!(!dir.path().join("memories.json.tmp").exists());

        let staged = store.stage_append("pending", vec![0.0, 1.0], MemorySource::Auto).await.expect("stage");
        let committed = store.commit(staged).await.expect("commit");
        assert_eq!(committed.text, "pending");
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn append_rejects_mismatched_dimension() {
        let dir = TempDir::new().expect("tempdir");
        let store = VectorStore::new(dir.path().join("memories.json"));
        store.append("one", vec![1.0, 0.0], MemorySource::User).await.expect("append");

        let result = store.append("two", vec![1.0, 0.0, 0.0], MemorySource::User).await;
        assert!(matches!(result, Err(MemoryError::DimensionMismatch { expected: 2, actual: 3 })));
        assert_eq!(store.count().await, 1);
    }
}
