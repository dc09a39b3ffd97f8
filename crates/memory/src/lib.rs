pub mod core_memory;
pub mod embedding;
pub mod log;
pub mod service;
pub mod store;

use std::path::PathBuf;

use thiserror::Error;

pub use core_memory::CoreMemory;
pub use embedding::{cosine_similarity, Embedder, GeminiEmbedder, HashEmbedder, EMBEDDING_DIMENSION};
pub use log::MemoryLog;
pub use service::{MemoryService, RecalledMemory, DEFAULT_TOP_K, RELEVANCE_THRESHOLD};
pub use store::{MemoryEntry, MemorySource, ScoredEntry, StagedAppend, VectorStore};

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory text must not be empty")]
    EmptyText,
    #[error("embedding request failed: {0}")]
    Embedding(String),
    #[error("embedding has {actual} dimensions but the store holds {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("memory file operation failed for `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("could not serialize memory store: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl MemoryError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}
