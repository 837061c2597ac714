use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use common::storage::collections::CollectionManager;
use common::storage::db::SurrealDbClient;
use common::storage::types::document_chunk::{ChunkMetadata, SourceChunk};
use common::utils::embedding::EmbeddingProvider;
use common::utils::llm::LlmProvider;
use ingestion_pipeline::IngestionPipeline;
use monitoring::{EmbeddingMonitor, QueryMonitor};
use query_cache::QueryCache;
use retrieval_pipeline::RetrievalPipeline;

pub struct TestStack {
    pub ingestion: IngestionPipeline,
    pub retrieval: RetrievalPipeline,
    pub collections: Arc<CollectionManager>,
    pub cache: Arc<QueryCache>,
    pub query_monitor: Arc<QueryMonitor>,
    pub embedding_monitor: Arc<EmbeddingMonitor>,
}

/// Wires the full stack against an in-memory database with offline providers
/// (hashed embeddings, extractive answers), one isolated instance per test.
pub async fn setup_stack(data_dir: &Path) -> TestStack {
    let namespace = "test_ns";
    let database = Uuid::new_v4().to_string();

    let db = Arc::new(
        SurrealDbClient::memory(namespace, &database)
            .await
            .expect("Failed to start in-memory surrealdb"),
    );
    db.ensure_initialized(16)
        .await
        .expect("Failed to initialize indexes");

    let embedder =
        Arc::new(EmbeddingProvider::new_hashed(16).expect("Failed to create hashed embedder"));
    let llm = Arc::new(LlmProvider::new_extractive(3));
    let collections = Arc::new(CollectionManager::new(db, embedder, "docs".to_string()));
    let cache = Arc::new(
        QueryCache::new(data_dir.join("cache"), 3600, 100).expect("Failed to create cache"),
    );
    let query_monitor = Arc::new(QueryMonitor::new(data_dir.join("monitoring"), true));
    let embedding_monitor = Arc::new(EmbeddingMonitor::new(data_dir.join("monitoring"), true));

    let ingestion = IngestionPipeline::new(
        Arc::clone(&collections),
        Arc::clone(&embedding_monitor),
    );
    let retrieval = RetrievalPipeline::new(
        Arc::clone(&collections),
        llm,
        Arc::clone(&cache),
        Arc::clone(&query_monitor),
        true,
    );

    TestStack {
        ingestion,
        retrieval,
        collections,
        cache,
        query_monitor,
        embedding_monitor,
    }
}

pub fn doc_chunks(version: &str, texts: &[&str]) -> Vec<SourceChunk> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            SourceChunk::new(
                *text,
                ChunkMetadata {
                    source_file: format!("docs/v{version}/guide.md"),
                    file_format: "md".into(),
                    version: Some(version.to_string()),
                    chunk_index: Some(i),
                    ..Default::default()
                },
            )
        })
        .collect()
}
