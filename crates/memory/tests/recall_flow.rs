use std::sync::Arc;

use clawby_memory::{
    cosine_similarity, Embedder, HashEmbedder, MemoryService, MemorySource, DEFAULT_TOP_K,
};
use tempfile::TempDir;

#[tokio::test]
async fn storing_two_memories_counts_each_write() {
    let dir = TempDir::new().expect("tempdir");
    let memory = MemoryService::new(dir.path(), Arc::new(HashEmbedder::default()));

    assert_eq!(memory.count().await, 0);
    memory.store_memory("A", MemorySource::User).await.expect("store A");
    assert_eq!(memory.count().await, 1);
    memory.store_memory("B", MemorySource::User).await.expect("store B");
    assert_eq!(memory.count().await, 2);

    let log = std::fs::read_to_string(dir.path().join("memory_log.md")).expect("audit log");
    assert_eq!(log.lines().count(), 2);
}

#[tokio::test]
async fn recall_orders_by_embedding_similarity() {
    let dir = TempDir::new().expect("tempdir");
    let embedder = HashEmbedder::default();
    let memory = MemoryService::new(dir.path(), Arc::new(embedder.clone()));

    let first = "My sister's birthday is on the 14th of May";
    let second = "I am allergic to peanuts";
    memory.store_memory(first, MemorySource::User).await.expect("store first");
    memory.store_memory(second, MemorySource::Auto).await.expect("store second");

    let recalled = memory.recall_memories(second, DEFAULT_TOP_K).await.expect("recall");

    assert!(!recalled.is_empty());
    assert!(recalled.len() <= DEFAULT_TOP_K);
    assert_eq!(recalled[0].text, second);
    assert!((recalled[0].score - 1.0).abs() < 1e-5);
    assert!(recalled.windows(2).all(|pair| pair[0].score >= pair[1].score));
    assert!(recalled.iter().all(|hit| hit.score > 0.3));

    let query = embedder.embed(second).await.expect("embed query");
    for hit in &recalled {
        let stored = embedder.embed(&hit.text).await.expect("embed stored");
        assert!((cosine_similarity(&query, &stored) - hit.score).abs() < 1e-5);
    }
}

#[tokio::test]
async fn identical_scores_keep_insertion_order() {
    let dir = TempDir::new().expect("tempdir");
    let memory = MemoryService::new(dir.path(), Arc::new(HashEmbedder::default()));

    memory.store_memory("same note", MemorySource::User).await.expect("store");
    memory.store_memory("same note", MemorySource::Auto).await.expect("store");

    let recalled = memory.recall_memories("same note", 2).await.expect("recall");
    assert_eq!(recalled.len(), 2);
    assert_eq!(recalled[0].score, recalled[1].score);
    assert!(recalled[0].timestamp <= recalled[1].timestamp);
}

#[tokio::test]
async fn corrupt_store_recalls_nothing_and_recovers_on_write() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("memories.json"), "[[[").expect("write corrupt store");
    let memory = MemoryService::new(dir.path(), Arc::new(HashEmbedder::default()));

    assert!(memory.recall_memories("anything", 3).await.expect("recall").is_empty());
    assert_eq!(memory.count().await, 0);

    memory.store_memory("recovered", MemorySource::User).await.expect("store");
    assert_eq!(memory.count().await, 1);
}
