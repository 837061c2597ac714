pub mod compare;
pub mod ensemble;
pub mod options;
pub mod query;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use common::storage::collections::CollectionManager;
use common::storage::types::document_chunk::ChunkMetadata;
use common::utils::llm::LlmProvider;
use monitoring::QueryMonitor;
use query_cache::QueryCache;

pub use options::{QueryMode, QueryOptions};

/// One retrieved passage as presented to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedSource {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Answer to a single-version query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub answer: String,
    pub query: String,
    pub source_documents: Vec<RetrievedSource>,
}

/// Answer synthesized from several versions at once, with sources grouped by
/// the version they came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnsembleResult {
    pub answer: String,
    pub query: String,
    pub versions_queried: Vec<String>,
    pub sources_by_version: BTreeMap<String, Vec<RetrievedSource>>,
    pub total_sources: usize,
}

/// Per-version outcome within a comparison. Either `answer` or `error` is
/// set, never both.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VersionAnswer {
    pub answer: Option<String>,
    pub source_count: usize,
    pub sources: Vec<RetrievedSource>,
    pub error: Option<String>,
}

/// Side-by-side answers per version, without cross-version synthesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionComparison {
    pub query: String,
    pub versions_compared: Vec<String>,
    pub results_by_version: BTreeMap<String, VersionAnswer>,
}

/// Orchestrates retrieval-augmented answering against versioned collections,
/// with result caching and usage telemetry. Each call runs to completion;
/// cache and telemetry failures never fail a query.
pub struct RetrievalPipeline {
    collections: Arc<CollectionManager>,
    llm: Arc<LlmProvider>,
    cache: Arc<QueryCache>,
    monitor: Arc<QueryMonitor>,
    use_cache: bool,
}

impl RetrievalPipeline {
    pub fn new(
        collections: Arc<CollectionManager>,
        llm: Arc<LlmProvider>,
        cache: Arc<QueryCache>,
        monitor: Arc<QueryMonitor>,
        use_cache: bool,
    ) -> Self {
        Self {
            collections,
            llm,
            cache,
            monitor,
            use_cache,
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use common::storage::db::SurrealDbClient;
    use common::storage::types::document_chunk::SourceChunk;
    use common::utils::embedding::EmbeddingProvider;
    use std::path::Path;
    use uuid::Uuid;

    pub struct TestEnv {
        pub pipeline: RetrievalPipeline,
        pub collections: Arc<CollectionManager>,
        pub cache: Arc<QueryCache>,
        pub monitor: Arc<QueryMonitor>,
    }

    pub async fn test_env(dir: &Path) -> TestEnv {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized(16)
            .await
            .expect("Failed to initialize indexes");

        let embedder = Arc::new(
            EmbeddingProvider::new_hashed(16).expect("Failed to create hashed embedder"),
        );
        let collections = Arc::new(CollectionManager::new(
            Arc::new(db),
            embedder,
            "docs".to_string(),
        ));
        let cache = Arc::new(
            QueryCache::new(dir.join("cache"), 3600, 100).expect("Failed to create cache"),
        );
        let monitor = Arc::new(QueryMonitor::new(dir.join("monitoring"), true));
        let llm = Arc::new(LlmProvider::new_extractive(3));

        let pipeline = RetrievalPipeline::new(
            Arc::clone(&collections),
            llm,
            Arc::clone(&cache),
            Arc::clone(&monitor),
            true,
        );

        TestEnv {
            pipeline,
            collections,
            cache,
            monitor,
        }
    }

    pub async fn seed_version(env: &TestEnv, version: Option<&str>, texts: &[&str]) {
        let chunks: Vec<SourceChunk> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                SourceChunk::new(
                    *text,
                    ChunkMetadata {
                        source_file: "seed.md".into(),
                        file_format: "md".into(),
                        version: version.map(ToOwned::to_owned),
                        chunk_index: Some(i),
                        ..Default::default()
                    },
                )
            })
            .collect();

        env.collections
            .write(&chunks, version, false)
            .await
            .expect("Failed to seed collection");
    }
}
