use std::ops::Deref;

use serde::Deserialize;
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};

use crate::error::AppError;
use crate::storage::types::{document_chunk::DocumentChunk, StoredObject};

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    /// # Initialize a new database client
    ///
    /// # Arguments
    /// * Connection address plus root credentials and namespace/database
    ///
    /// # Returns
    /// * `SurrealDbClient` initialized
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        // Sign in to database
        db.signin(Root { username, password }).await?;

        // Set namespace
        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Defines the chunk vector index and catalog lookup index. Must run once
    /// before any chunk is written; the HNSW dimension has to match the
    /// configured embedding provider.
    pub async fn ensure_initialized(&self, embedding_dimensions: usize) -> Result<(), AppError> {
        self.client
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_embedding_chunks ON chunk FIELDS embedding HNSW DIMENSION {embedding_dimensions}"
            ))
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_chunk_collection ON chunk FIELDS collection")
            .await?;
        Ok(())
    }

    /// Operation to store an object, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `item` - The item to be stored
    ///
    /// # Returns
    /// * `Result` - Item or Error
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Operation to retrieve a single object by its ID, requires the struct to implement StoredObject
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Operation to delete a single object by its ID, requires the struct to implement StoredObject
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }

    /// Removes every chunk belonging to the named physical collection.
    /// Deleting from a collection that holds no chunks is not an error.
    pub async fn delete_chunks_in(&self, collection: &str) -> Result<(), AppError> {
        let query = format!(
            "DELETE {} WHERE collection = '{}'",
            DocumentChunk::table_name(),
            collection
        );
        self.client.query(query).await?;

        Ok(())
    }

    pub async fn count_chunks_in(&self, collection: &str) -> Result<usize, AppError> {
        #[derive(Debug, Deserialize)]
        struct CountResult {
            count: usize,
        }

        let result: Option<CountResult> = self
            .client
            .query("SELECT count() AS count FROM type::table($table) WHERE collection = $collection GROUP ALL")
            .bind(("table", DocumentChunk::table_name()))
            .bind(("collection", collection.to_owned()))
            .await?
            .take(0)?;

        Ok(result.map(|r| r.count).unwrap_or(0))
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::document_chunk::{ChunkMetadata, SourceChunk};
    use uuid::Uuid;

    async fn memory_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string(); // ensures isolation per test run
        SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    fn chunk_in(collection: &str, text: &str) -> DocumentChunk {
        DocumentChunk::new(
            collection.to_string(),
            SourceChunk::new(text, ChunkMetadata::default()),
            vec![0.1, 0.2, 0.3],
        )
    }

    #[tokio::test]
    async fn test_initialization_and_crud() {
        let db = memory_db().await;

        db.ensure_initialized(3)
            .await
            .expect("Failed to initialize indexes");

        let chunk = chunk_in("docs", "Widgets support TOML configuration.");

        let stored = db
            .store_item(chunk.clone())
            .await
            .expect("Failed to store");
        assert!(stored.is_some());

        let fetched = db
            .get_item::<DocumentChunk>(&chunk.id)
            .await
            .expect("Failed to fetch");
        assert_eq!(fetched, Some(chunk.clone()));

        let deleted = db
            .delete_item::<DocumentChunk>(&chunk.id)
            .await
            .expect("Failed to delete");
        assert_eq!(deleted, Some(chunk.clone()));

        let fetch_post = db
            .get_item::<DocumentChunk>(&chunk.id)
            .await
            .expect("Failed fetch post delete");
        assert!(fetch_post.is_none());
    }

    #[tokio::test]
    async fn test_count_and_delete_scoped_to_collection() {
        let db = memory_db().await;

        for text in ["first", "second"] {
            db.store_item(chunk_in("docs-v1.0", text))
                .await
                .expect("Failed to store chunk");
        }
        db.store_item(chunk_in("docs-v2.0", "other version"))
            .await
            .expect("Failed to store chunk");

        assert_eq!(
            db.count_chunks_in("docs-v1.0").await.expect("count"),
            2,
            "count should only see the requested collection"
        );

        db.delete_chunks_in("docs-v1.0")
            .await
            .expect("Failed to delete chunks");

        assert_eq!(db.count_chunks_in("docs-v1.0").await.expect("count"), 0);
        assert_eq!(
            db.count_chunks_in("docs-v2.0").await.expect("count"),
            1,
            "other collections must be untouched"
        );
    }

    #[tokio::test]
    async fn test_delete_chunks_in_missing_collection_is_noop() {
        let db = memory_db().await;

        db.delete_chunks_in("never-created")
            .await
            .expect("Deleting an absent collection should not fail");
    }
}
