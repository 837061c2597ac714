//! File-based cache for query results.
//!
//! One JSON file per entry, keyed on the semantics of the query rather than
//! its exact text. Expired entries are purged lazily when read; size pressure
//! is relieved at write time by evicting the oldest entries on disk. Caching
//! is a performance optimization only: every failure in here is logged and
//! swallowed so it can never fail the query it serves.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    timestamp: DateTime<Utc>,
    query: String,
    version: Option<String>,
    k: usize,
    result: T,
}

/// Cache observability snapshot; computing it has no side effects.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_size: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
    pub ttl_seconds: u64,
}

pub struct QueryCache {
    cache_dir: PathBuf,
    ttl_seconds: u64,
    max_size: usize,
}

impl QueryCache {
    /// Opens the cache rooted at `cache_dir`, creating the directory if
    /// needed. `max_size` bounds the number of live entries.
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        ttl_seconds: u64,
        max_size: usize,
    ) -> std::io::Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            ttl_seconds,
            max_size,
        })
    }

    /// Returns the cached result for `(query, version, k)` if present and not
    /// expired. Expired or unreadable entries are deleted as a side effect.
    pub fn get<T: DeserializeOwned>(
        &self,
        query: &str,
        version: Option<&str>,
        k: usize,
    ) -> Option<T> {
        let path = self.entry_path(&cache_key(query, version, k));

        if !path.exists() {
            return None;
        }

        let entry: CacheEntry<T> = match fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|contents| serde_json::from_str(&contents).map_err(|e| e.to_string()))
        {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "error reading cache entry; removing it");
                remove_entry(&path);
                return None;
            }
        };

        let age = Utc::now().signed_duration_since(entry.timestamp);
        if age.num_seconds() > self.ttl_seconds as i64 {
            debug!(query = %truncate(query, 50), "cache entry expired");
            remove_entry(&path);
            return None;
        }

        info!(query = %truncate(query, 50), "cache hit");
        Some(entry.result)
    }

    /// Caches a query result under `(query, version, k)`, evicting the oldest
    /// entries first if the store is full. Write failures are non-fatal.
    pub fn set<T: Serialize>(&self, query: &str, result: &T, version: Option<&str>, k: usize) {
        let path = self.entry_path(&cache_key(query, version, k));

        self.enforce_max_size();

        let entry = CacheEntry {
            timestamp: Utc::now(),
            query: query.to_string(),
            version: version.map(ToOwned::to_owned),
            k,
            result,
        };

        let serialized = match serde_json::to_string_pretty(&entry) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(error = %e, "error serializing cache entry");
                return;
            }
        };

        // Write-then-rename keeps each entry a single atomic publication, so
        // a concurrent reader never observes a half-written file.
        let tmp_path = path.with_extension("json.tmp");
        if let Err(e) = fs::write(&tmp_path, serialized).and_then(|()| fs::rename(&tmp_path, &path))
        {
            warn!(error = %e, "error writing cache entry");
            return;
        }

        info!(query = %truncate(query, 50), "cached query result");
    }

    /// Removes all cache entries unconditionally.
    pub fn clear(&self) {
        let entries = self.entry_files();
        for path in &entries {
            remove_entry(path);
        }
        info!(removed = entries.len(), "cleared cache entries");
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entry_files();
        let total_size_bytes: u64 = entries
            .iter()
            .filter_map(|path| fs::metadata(path).ok())
            .map(|metadata| metadata.len())
            .sum();

        CacheStats {
            entries: entries.len(),
            max_size: self.max_size,
            total_size_bytes,
            total_size_mb: (total_size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            ttl_seconds: self.ttl_seconds,
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        let Ok(dir) = fs::read_dir(&self.cache_dir) else {
            return Vec::new();
        };

        dir.filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }

    // Evicts oldest-by-mtime entries until one more entry fits. Ages are
    // taken from the on-disk write time, not access time; a hot entry is
    // still evicted if it was written before colder ones.
    fn enforce_max_size(&self) {
        let mut entries: Vec<(PathBuf, std::time::SystemTime)> = self
            .entry_files()
            .into_iter()
            .filter_map(|path| {
                let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
                Some((path, modified))
            })
            .collect();

        if entries.len() < self.max_size {
            return;
        }

        entries.sort_by_key(|(_, modified)| *modified);

        let to_remove = entries.len() - self.max_size + 1;
        for (path, _) in entries.iter().take(to_remove) {
            remove_entry(path);
            debug!(entry = %path.display(), "evicted old cache entry");
        }
    }
}

/// Deterministic entry key: hash of the normalized query text plus the
/// version and k that scoped it. Normalization is lowercase + trim, so
/// `"Foo "` and `"foo"` share an entry while different versions never do.
fn cache_key(query: &str, version: Option<&str>, k: usize) -> String {
    let canonical = serde_json::json!({
        "k": k,
        "query": query.trim().to_lowercase(),
        "version": version,
    })
    .to_string();

    let digest = Sha256::digest(canonical.as_bytes());
    let mut key = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(key, "{byte:02x}");
    }
    key
}

fn remove_entry(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(entry = %path.display(), error = %e, "error removing cache entry");
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
