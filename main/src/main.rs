use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use common::{
    storage::{collections::CollectionManager, db::SurrealDbClient},
    utils::{config::get_config, embedding::EmbeddingProvider, llm::LlmProvider},
};
use ingestion_pipeline::IngestionPipeline;
use monitoring::{EmbeddingMonitor, QueryMonitor};
use query_cache::QueryCache;
use retrieval_pipeline::{QueryMode, QueryOptions, RetrievalPipeline};

#[derive(Parser)]
#[command(name = "docs-assistant", about = "Versioned documentation assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed a document or a directory of documents into a collection
    Embed {
        /// File or directory to embed
        path: PathBuf,
        /// Version the documents belong to (extracted from the path if omitted)
        #[arg(long)]
        version: Option<String>,
        /// Replace the collection's existing content instead of appending
        #[arg(long)]
        overwrite: bool,
    },
    /// Ask a question against one version
    Query {
        question: String,
        #[arg(long)]
        version: Option<String>,
        /// Number of chunks to retrieve
        #[arg(short, default_value_t = 3)]
        k: usize,
        #[arg(long, value_enum, default_value_t = QueryMode::MultiQuery)]
        mode: QueryMode,
        /// Bypass the query cache for this question
        #[arg(long)]
        no_cache: bool,
    },
    /// Ask a question against several versions at once
    Ensemble {
        question: String,
        #[arg(long, value_delimiter = ',', required = true)]
        versions: Vec<String>,
        #[arg(short, default_value_t = 3)]
        k: usize,
    },
    /// Compare how different versions answer the same question
    Compare {
        question: String,
        #[arg(long, value_delimiter = ',', required = true)]
        versions: Vec<String>,
        #[arg(short, default_value_t = 3)]
        k: usize,
    },
    /// Show query and embedding statistics
    Stats {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Show cache statistics
    CacheStats,
    /// Remove all cached query results
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let embedder = Arc::new(
        EmbeddingProvider::from_config(&config, Some(Arc::clone(&openai_client))).await?,
    );
    info!(
        embedding_backend = embedder.backend_label(),
        embedding_dimension = embedder.dimension(),
        "Embedding provider initialized"
    );

    db.ensure_initialized(embedder.dimension()).await?;

    let llm = Arc::new(LlmProvider::from_config(&config, Some(openai_client))?);
    let collections = Arc::new(CollectionManager::new(
        db,
        embedder,
        config.collection_name.clone(),
    ));
    let cache = Arc::new(QueryCache::new(
        &config.cache_dir,
        config.cache_ttl_seconds,
        config.cache_max_size,
    )?);
    let query_monitor = Arc::new(QueryMonitor::new(
        &config.monitoring_dir,
        config.monitoring_enabled,
    ));
    let embedding_monitor = Arc::new(EmbeddingMonitor::new(
        &config.monitoring_dir,
        config.monitoring_enabled,
    ));

    let ingestion = IngestionPipeline::new(Arc::clone(&collections), embedding_monitor.clone());
    let retrieval = RetrievalPipeline::new(
        collections,
        llm,
        Arc::clone(&cache),
        Arc::clone(&query_monitor),
        config.use_cache,
    );

    match cli.command {
        Command::Embed {
            path,
            version,
            overwrite,
        } => {
            if path.is_dir() {
                let report = ingestion
                    .embed_directory(&path, version.as_deref(), None)
                    .await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let handle = ingestion
                    .embed_file(&path, version.as_deref(), overwrite)
                    .await?;
                println!("Embedded into collection {}", handle.name);
            }
        }
        Command::Query {
            question,
            version,
            k,
            mode,
            no_cache,
        } => {
            let opts = QueryOptions {
                k,
                mode,
                use_cache: no_cache.then_some(false),
            };
            let result = retrieval.query(&question, version.as_deref(), opts).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Ensemble {
            question,
            versions,
            k,
        } => {
            let result = retrieval.query_ensemble(&question, &versions, k).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Compare {
            question,
            versions,
            k,
        } => {
            let result = retrieval.compare_versions(&question, &versions, k).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Stats { days } => {
            let stats = serde_json::json!({
                "queries": query_monitor.query_stats(days),
                "embeddings": embedding_monitor.embedding_stats(days),
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::CacheStats => {
            println!("{}", serde_json::to_string_pretty(&cache.stats())?);
        }
        Command::ClearCache => {
            cache.clear();
            println!("Cache cleared");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::document_chunk::{ChunkMetadata, SourceChunk};
    use uuid::Uuid;

    #[tokio::test]
    async fn smoke_embed_then_query_with_offline_providers() {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let data_dir = tempfile::tempdir().expect("failed to create temp data directory");

        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        db.ensure_initialized(16)
            .await
            .expect("failed to initialize indexes");

        // Use hashed embeddings and extractive answers to avoid external dependencies
        let embedder = Arc::new(
            EmbeddingProvider::new_hashed(16).expect("failed to create hashed embedding provider"),
        );
        let llm = Arc::new(LlmProvider::new_extractive(3));
        let collections = Arc::new(CollectionManager::new(db, embedder, "docs".to_string()));
        let cache = Arc::new(
            QueryCache::new(data_dir.path().join("cache"), 3600, 100).expect("cache"),
        );
        let query_monitor = Arc::new(QueryMonitor::new(data_dir.path().join("monitoring"), true));
        let embedding_monitor =
            Arc::new(EmbeddingMonitor::new(data_dir.path().join("monitoring"), true));

        let ingestion =
            IngestionPipeline::new(Arc::clone(&collections), embedding_monitor.clone());
        let retrieval = RetrievalPipeline::new(
            collections,
            llm,
            cache,
            Arc::clone(&query_monitor),
            true,
        );

        let chunks = vec![SourceChunk::new(
            "Widgets are configured in the settings panel.",
            ChunkMetadata {
                source_file: "widgets.md".into(),
                file_format: "md".into(),
                version: Some("1.0".into()),
                chunk_index: Some(0),
                ..Default::default()
            },
        )];
        ingestion
            .embed_chunks(chunks, Some("1.0"), false)
            .await
            .expect("embed");

        let result = retrieval
            .query(
                "how do I configure widgets?",
                Some("1.0"),
                QueryOptions::default(),
            )
            .await
            .expect("query");

        assert!(result.answer.contains("settings panel"));
        assert_eq!(query_monitor.query_stats(7).total_queries, 1);
        assert_eq!(embedding_monitor.embedding_stats(7).successful, 1);
    }
}
