use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Retrieve with the raw question only (faster, less comprehensive)
    Simple,
    /// Expand the question into paraphrases and union the retrievals
    MultiQuery,
}

impl Default for QueryMode {
    fn default() -> Self {
        Self::MultiQuery
    }
}

impl std::str::FromStr for QueryMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "multi_query" | "multi-query" | "multi" => Ok(Self::MultiQuery),
            other => Err(format!("unknown query mode '{other}'")),
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QueryMode::Simple => "simple",
            QueryMode::MultiQuery => "multi_query",
        };
        f.write_str(label)
    }
}

/// Per-request knobs for a single-version query.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// Nearest neighbors to retrieve per query text.
    pub k: usize,
    pub mode: QueryMode,
    /// Overrides the pipeline-level cache toggle when set.
    pub use_cache: Option<bool>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            k: 3,
            mode: QueryMode::default(),
            use_cache: None,
        }
    }
}

impl QueryOptions {
    pub fn with_k(k: usize) -> Self {
        Self {
            k,
            ..Self::default()
        }
    }
}
