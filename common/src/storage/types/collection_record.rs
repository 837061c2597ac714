use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{deserialize_datetime, deserialize_flexible_id, serialize_datetime, StoredObject};

/// Catalog entry for one physical collection. The record id is the physical
/// collection name, so the logical-to-physical mapping is never cached in
/// memory; it is re-read from this table on every resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionRecord {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub base_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime",
        default
    )]
    pub created_at: DateTime<Utc>,
}

impl CollectionRecord {
    pub fn new(physical_name: String, base_name: String, version: Option<String>) -> Self {
        Self {
            id: physical_name,
            base_name,
            version,
            created_at: Utc::now(),
        }
    }
}

impl StoredObject for CollectionRecord {
    fn table_name() -> &'static str {
        "collection"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}
