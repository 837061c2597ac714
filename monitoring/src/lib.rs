//! Append-only usage telemetry.
//!
//! Queries and embedding operations are logged one JSON line at a time and
//! aggregated over a trailing time window on demand. Telemetry must never
//! fail the operation it observes: every write error is logged and swallowed,
//! and stats over a missing or partially corrupt log degrade to whatever can
//! still be parsed.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;

const QUERIES_FILE: &str = "queries.jsonl";
const EMBEDDINGS_FILE: &str = "embeddings.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub version: Option<String>,
    pub response_time: Option<f64>,
    pub source_count: usize,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub timestamp: DateTime<Utc>,
    pub file_path: String,
    pub version: Option<String>,
    pub collection_name: String,
    pub chunk_count: usize,
    pub duration: Option<f64>,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryCount {
    pub query: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryStats {
    pub total_queries: usize,
    pub unique_queries: usize,
    pub avg_response_time: f64,
    pub cache_hit_rate: f64,
    pub top_queries: Vec<QueryCount>,
    pub period_days: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmbeddingStats {
    pub total_embeddings: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_chunks: usize,
    pub avg_duration: f64,
    pub period_days: u32,
}

/// Records queries for pattern analysis.
pub struct QueryMonitor {
    log_path: PathBuf,
    enabled: bool,
}

impl QueryMonitor {
    /// `enabled = false` turns every log call into a no-op; stats still read
    /// whatever was written while enabled.
    pub fn new(monitoring_dir: impl Into<PathBuf>, enabled: bool) -> Self {
        let monitoring_dir = monitoring_dir.into();
        Self {
            log_path: monitoring_dir.join(QUERIES_FILE),
            enabled,
        }
    }

    pub fn log_query(
        &self,
        query: &str,
        version: Option<&str>,
        response_time: Option<f64>,
        source_count: usize,
        cached: bool,
    ) {
        if !self.enabled {
            return;
        }

        let record = QueryRecord {
            timestamp: Utc::now(),
            query: query.to_string(),
            version: version.map(ToOwned::to_owned),
            response_time,
            source_count,
            cached,
        };

        append_record(&self.log_path, &record);
    }

    /// Aggregates query activity over the last `days` days. A missing log
    /// yields zeroed stats, never an error.
    pub fn query_stats(&self, days: u32) -> QueryStats {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let records: Vec<QueryRecord> =
            read_records_since(&self.log_path, cutoff, |r: &QueryRecord| r.timestamp);

        let total_queries = records.len();
        let mut query_counts: HashMap<String, usize> = HashMap::new();
        let mut response_times = Vec::new();
        let mut cached_count = 0usize;

        for record in &records {
            *query_counts.entry(record.query.to_lowercase()).or_insert(0) += 1;
            if let Some(response_time) = record.response_time {
                response_times.push(response_time);
            }
            if record.cached {
                cached_count += 1;
            }
        }

        let avg_response_time = if response_times.is_empty() {
            0.0
        } else {
            round_to(
                response_times.iter().sum::<f64>() / response_times.len() as f64,
                3,
            )
        };

        let cache_hit_rate = if total_queries == 0 {
            0.0
        } else {
            round_to(cached_count as f64 / total_queries as f64 * 100.0, 2)
        };

        let unique_queries = query_counts.len();
        let mut top_queries: Vec<QueryCount> = query_counts
            .into_iter()
            .map(|(query, count)| QueryCount { query, count })
            .collect();
        top_queries.sort_by(|a, b| b.count.cmp(&a.count));
        top_queries.truncate(10);

        QueryStats {
            total_queries,
            unique_queries,
            avg_response_time,
            cache_hit_rate,
            top_queries,
            period_days: days,
        }
    }
}

/// Records embedding operations.
pub struct EmbeddingMonitor {
    log_path: PathBuf,
    enabled: bool,
}

impl EmbeddingMonitor {
    pub fn new(monitoring_dir: impl Into<PathBuf>, enabled: bool) -> Self {
        let monitoring_dir = monitoring_dir.into();
        Self {
            log_path: monitoring_dir.join(EMBEDDINGS_FILE),
            enabled,
        }
    }

    pub fn log_embedding(
        &self,
        file_path: &str,
        version: Option<&str>,
        collection_name: &str,
        chunk_count: usize,
        duration: Option<f64>,
        success: bool,
    ) {
        if !self.enabled {
            return;
        }

        let record = EmbeddingRecord {
            timestamp: Utc::now(),
            file_path: file_path.to_string(),
            version: version.map(ToOwned::to_owned),
            collection_name: collection_name.to_string(),
            chunk_count,
            duration,
            success,
        };

        append_record(&self.log_path, &record);
    }

    /// Aggregates embedding activity over the last `days` days. A missing log
    /// yields zeroed stats, never an error.
    pub fn embedding_stats(&self, days: u32) -> EmbeddingStats {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let records: Vec<EmbeddingRecord> =
            read_records_since(&self.log_path, cutoff, |r: &EmbeddingRecord| r.timestamp);

        let total_embeddings = records.len();
        let successful = records.iter().filter(|r| r.success).count();
        let total_chunks = records.iter().map(|r| r.chunk_count).sum();

        let durations: Vec<f64> = records.iter().filter_map(|r| r.duration).collect();
        let avg_duration = if durations.is_empty() {
            0.0
        } else {
            round_to(durations.iter().sum::<f64>() / durations.len() as f64, 3)
        };

        EmbeddingStats {
            total_embeddings,
            successful,
            failed: total_embeddings - successful,
            total_chunks,
            avg_duration,
            period_days: days,
        }
    }
}

fn append_record<T: Serialize>(path: &Path, record: &T) {
    let line = match serde_json::to_string(record) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "error serializing usage record");
            return;
        }
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!(error = %e, "error creating monitoring directory");
            return;
        }
    }

    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{line}"));

    if let Err(e) = result {
        warn!(log = %path.display(), error = %e, "error appending usage record");
    }
}

// The single place where log parsing and corrupt-line tolerance live: lines
// that fail to parse are skipped, everything at or after the cutoff is kept.
fn read_records_since<T: DeserializeOwned>(
    path: &Path,
    cutoff: DateTime<Utc>,
    timestamp: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    let Ok(contents) = fs::read_to_string(path) else {
        return Vec::new();
    };

    contents
        .lines()
        .filter_map(|line| serde_json::from_str::<T>(line).ok())
        .filter(|record| timestamp(record) >= cutoff)
        .collect()
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
