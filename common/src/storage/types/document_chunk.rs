use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{deserialize_datetime, deserialize_flexible_id, serialize_datetime, StoredObject};

/// Provenance carried by every chunk through embedding and retrieval.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub source_file: String,
    #[serde(default)]
    pub file_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A chunk as produced by the document loader, before it has an embedding or
/// a home collection. Immutable once created; re-embedding the same source in
/// incremental mode produces additional independent chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl SourceChunk {
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// A chunk persisted in the vector store, tagged with the physical collection
/// it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub collection: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime",
        default
    )]
    pub created_at: DateTime<Utc>,
}

impl DocumentChunk {
    pub fn new(collection: String, source: SourceChunk, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            collection,
            text: source.text,
            metadata: source.metadata,
            embedding,
            created_at: Utc::now(),
        }
    }
}

impl StoredObject for DocumentChunk {
    fn table_name() -> &'static str {
        "chunk"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_chunk_creation() {
        let metadata = ChunkMetadata {
            source_file: "docs/intro.md".into(),
            file_format: "md".into(),
            version: Some("2.0".into()),
            chunk_index: Some(0),
            ..Default::default()
        };
        let source = SourceChunk::new("Widgets are configured via TOML.", metadata.clone());

        let chunk = DocumentChunk::new("docs-v2.0".into(), source, vec![0.1, 0.2, 0.3]);

        assert_eq!(chunk.collection, "docs-v2.0");
        assert_eq!(chunk.text, "Widgets are configured via TOML.");
        assert_eq!(chunk.metadata, metadata);
        assert!(!chunk.id.is_empty());
    }

    #[test]
    fn test_metadata_extra_fields_round_trip() {
        let mut metadata = ChunkMetadata {
            source_file: "guide.html".into(),
            file_format: "html".into(),
            ..Default::default()
        };
        metadata
            .extra
            .insert("page_title".into(), serde_json::json!("Install guide"));

        let serialized = serde_json::to_string(&metadata).expect("serialize metadata");
        let restored: ChunkMetadata =
            serde_json::from_str(&serialized).expect("deserialize metadata");

        assert_eq!(restored, metadata);
        assert_eq!(
            restored.extra.get("page_title"),
            Some(&serde_json::json!("Install guide"))
        );
    }
}
