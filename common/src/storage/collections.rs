use std::sync::Arc;

use serde::Deserialize;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::{debug, error, info, warn};

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            collection_record::CollectionRecord,
            document_chunk::{ChunkMetadata, DocumentChunk, SourceChunk},
            deserialize_flexible_id, StoredObject,
        },
    },
    utils::embedding::EmbeddingProvider,
};

/// Physical collection name for a logical `(base_name, version)` pair.
/// Pure function; the same identity always maps to the same name.
pub fn resolve_collection_name(base_name: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("{base_name}-v{version}"),
        None => base_name.to_string(),
    }
}

/// Opened handle to one physical collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionHandle {
    pub name: String,
    pub base_name: String,
    pub version: Option<String>,
}

impl From<CollectionRecord> for CollectionHandle {
    fn from(record: CollectionRecord) -> Self {
        Self {
            name: record.id,
            base_name: record.base_name,
            version: record.version,
        }
    }
}

/// One nearest-neighbor hit, ordered by ascending distance.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredChunk {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

/// Resolves logical `(base_name, version)` identities to physical collections
/// and owns their lifecycle: create on first write, append on incremental
/// writes, delete-then-create on overwrite.
///
/// Writes to the same logical collection must be serialized by the caller; a
/// concurrent append can land on a collection an overwrite is about to delete.
pub struct CollectionManager {
    db: Arc<SurrealDbClient>,
    embedder: Arc<EmbeddingProvider>,
    base_name: String,
}

impl CollectionManager {
    pub fn new(db: Arc<SurrealDbClient>, embedder: Arc<EmbeddingProvider>, base_name: String) -> Self {
        Self {
            db,
            embedder,
            base_name,
        }
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn resolve_name(&self, version: Option<&str>) -> String {
        resolve_collection_name(&self.base_name, version)
    }

    /// Opens the physical collection for a version if its catalog entry can be
    /// read. A catalog read error yields `None` just like a missing entry, so
    /// a temporarily unreachable catalog is indistinguishable from an absent
    /// collection for callers of this method.
    pub async fn get_existing(&self, version: Option<&str>) -> Option<CollectionHandle> {
        let name = self.resolve_name(version);
        match self.db.get_item::<CollectionRecord>(&name).await {
            Ok(Some(record)) => Some(CollectionHandle::from(record)),
            Ok(None) => None,
            Err(e) => {
                warn!(collection = %name, error = %e, "failed to open collection catalog entry; treating as absent");
                None
            }
        }
    }

    /// Writes chunks into the collection for `version`.
    ///
    /// With `overwrite` the existing collection is deleted before the new one
    /// is created; the delete is not transactional with the create, so a
    /// chunk-write failure afterwards leaves the collection empty and the
    /// error is surfaced to the caller.
    ///
    /// Without `overwrite` the chunks are appended to an existing collection
    /// (no deduplication against prior content) or a new collection is
    /// created.
    pub async fn write(
        &self,
        chunks: &[SourceChunk],
        version: Option<&str>,
        overwrite: bool,
    ) -> Result<CollectionHandle, AppError> {
        let name = self.resolve_name(version);

        if overwrite {
            info!(collection = %name, "overwrite mode: deleting existing collection");
            self.delete_collection(&name).await;
            return match self.create_collection(&name, version, chunks).await {
                Ok(handle) => {
                    info!(collection = %name, chunks = chunks.len(), "created new collection");
                    Ok(handle)
                }
                Err(e) => {
                    error!(
                        collection = %name,
                        error = %e,
                        "chunk write failed after overwrite deleted prior content; collection is empty"
                    );
                    Err(e)
                }
            };
        }

        if let Some(handle) = self.get_existing(version).await {
            info!(collection = %name, chunks = chunks.len(), "incremental update: appending to existing collection");
            self.append_chunks(&handle, chunks).await?;
            return Ok(handle);
        }

        let handle = self.create_collection(&name, version, chunks).await?;
        info!(collection = %name, chunks = chunks.len(), "created new collection");
        Ok(handle)
    }

    pub async fn count_chunks(&self, handle: &CollectionHandle) -> Result<usize, AppError> {
        self.db.count_chunks_in(&handle.name).await
    }

    /// Top-`k` nearest chunks for `query_text` within one collection.
    pub async fn search(
        &self,
        handle: &CollectionHandle,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let query_embedding = self.embedder.embed(query_text).await?;

        let closest_query = format!(
            "SELECT id, text, metadata, vector::distance::knn() AS distance FROM {} WHERE collection = '{}' AND embedding <|{},40|> {:?} ORDER BY distance",
            DocumentChunk::table_name(),
            handle.name,
            k,
            query_embedding
        );

        let closest_chunks: Vec<ScoredChunk> = self.db.query(closest_query).await?.take(0)?;

        Ok(closest_chunks)
    }

    async fn create_collection(
        &self,
        name: &str,
        version: Option<&str>,
        chunks: &[SourceChunk],
    ) -> Result<CollectionHandle, AppError> {
        let record = CollectionRecord::new(
            name.to_string(),
            self.base_name.clone(),
            version.map(ToOwned::to_owned),
        );
        let stored = self.db.store_item(record).await?;
        let record = stored.ok_or_else(|| {
            AppError::InternalError(format!("failed to store catalog entry for {name}"))
        })?;

        let handle = CollectionHandle::from(record);
        self.append_chunks(&handle, chunks).await?;
        Ok(handle)
    }

    async fn append_chunks(
        &self,
        handle: &CollectionHandle,
        chunks: &[SourceChunk],
    ) -> Result<(), AppError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let retry_strategy = ExponentialBackoff::from_millis(100).map(jitter).take(3);
        let embeddings = Retry::spawn(retry_strategy, || {
            self.embedder.embed_batch(texts.clone())
        })
        .await?;

        if embeddings.len() != chunks.len() {
            return Err(AppError::InternalError(format!(
                "embedding provider returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        for (source, embedding) in chunks.iter().zip(embeddings) {
            let chunk = DocumentChunk::new(handle.name.clone(), source.clone(), embedding);
            self.db.store_item(chunk).await?;
        }

        Ok(())
    }

    /// Drops the chunks and catalog entry for a physical collection. Failures
    /// (including "did not exist") are logged and swallowed; the overwrite
    /// path proceeds to recreate the collection either way.
    async fn delete_collection(&self, name: &str) {
        if let Err(e) = self.db.delete_chunks_in(name).await {
            debug!(collection = %name, error = %e, "collection chunks did not exist or could not be deleted");
        }
        if let Err(e) = self.db.delete_item::<CollectionRecord>(name).await {
            debug!(collection = %name, error = %e, "collection catalog entry did not exist or could not be deleted");
        }
    }
}
