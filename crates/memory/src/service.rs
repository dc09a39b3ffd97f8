use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core_memory::CoreMemory;
use crate::embedding::Embedder;
use crate::log::MemoryLog;
use crate::store::{MemoryEntry, MemorySource, VectorStore};
use crate::MemoryError;

pub const DEFAULT_TOP_K: usize = 3;
/// Recalled entries must score strictly above this.
pub const RELEVANCE_THRESHOLD: f32 = 0.3;

const STORE_FILE: &str = "memories.json";
const LOG_FILE: &str = "memory_log.md";
const CORE_FILE: &str = "core_memory.md";
const PREVIEW_CHARS: usize = 60;

#[derive(Clone, Debug, PartialEq)]
pub struct RecalledMemory {
    pub text: String,
    pub score: f32,
    pub timestamp: DateTime<Utc>,
}

/// Facade over the vector store, audit log and core memory in one directory.
pub struct MemoryService {
    dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    log: MemoryLog,
    core: CoreMemory,
    write_lock: Mutex<()>,
}

impl MemoryService {
    pub fn new(dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        let dir = dir.into();
        Self {
            store: VectorStore::new(dir.join(STORE_FILE)),
            log: MemoryLog::new(dir.join(LOG_FILE)),
            core: CoreMemory::new(dir.join(CORE_FILE)),
            dir,
            embedder,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Embeds and persists `text`. The entry counts as stored only once both
    /// the store and the audit log are written.
    pub async fn store_memory(
        &self,
        text: &str,
        source: MemorySource,
    ) -> Result<MemoryEntry, MemoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MemoryError::EmptyText);
        }

        let embedding = self.embedder.embed(text).await?;

        let _guard = self.write_lock.lock().await;
        let staged = self.store.stage_append(text, embedding, source).await?;
        let logged = {
            let entry = staged.entry();
            self.log.append(&entry.text, source, entry.timestamp).await
        };
        if let Err(error) = logged {
            self.store.discard(staged).await;
            return Err(error);
        }
        let entry = self.store.commit(staged).await?;

        info!(
            event_name = "memory.entry.stored",
            memory_id = %entry.id,
            source = %source,
            preview = %preview(&entry.text),
            "memory stored"
        );
        Ok(entry)
    }

    pub async fn recall_memories(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RecalledMemory>, MemoryError> {
        let query_embedding = self.embedder.embed(query).await?;
        let recalled: Vec<RecalledMemory> = self
            .store
            .search(&query_embedding, top_k)
            .await
            .into_iter()
            .filter(|scored| scored.score > RELEVANCE_THRESHOLD)
            .map(|scored| RecalledMemory {
                text: scored.entry.text,
                score: scored.score,
                timestamp: scored.entry.timestamp,
            })
            .collect();

        debug!(event_name = "memory.recall.completed", top_k, hits = recalled.len(), "memories recalled");
        Ok(recalled)
    }

    /// Core memory plus the top recalled entries, formatted for the system
    /// instruction. Empty sections are left out; an empty string means there
    /// is nothing to inject.
    pub async fn memory_context(&self, query: &str, top_k: usize) -> Result<String, MemoryError> {
        let mut sections = Vec::new();

        let core = self.core.read().await;
        if !core.is_empty() {
            sections.push(format!("## Core Memory (stable preferences)\n{core}"));
        }

        let recalled = self.recall_memories(query, top_k).await?;
        if !recalled.is_empty() {
            let items = recalled
                .iter()
                .enumerate()
                .map(|(index, memory)| {
                    format!(
                        "{}. [{}] {}",
                        index + 1,
                        memory.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                        memory.text
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("## Recalled Memories\n{items}"));
        }

        Ok(sections.join("\n\n"))
    }

    pub async fn count(&self) -> usize {
        self.store.count().await
    }

    pub async fn core_memory(&self) -> String {
        self.core.read().await
    }

    pub async fn set_core_memory(&self, text: &str) -> Result<(), MemoryError> {
        let _guard = self.write_lock.lock().await;
        self.core.set(text).await?;
        info!(event_name = "memory.core.updated", chars = text.trim().chars().count(), "core memory updated");
        Ok(())
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...")
}
