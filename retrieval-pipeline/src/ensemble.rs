use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{info, warn};

use common::{
    error::AppError,
    storage::collections::{CollectionHandle, ScoredChunk},
    utils::llm::AnswerStyle,
};

use crate::{truncate_chars, EnsembleResult, RetrievalPipeline, RetrievedSource};

const SOURCE_PREVIEW_CHARS: usize = 500;

impl RetrievalPipeline {
    /// Answers one question from several versions at once.
    ///
    /// Each version is retrieved from independently and the per-version
    /// rankings are interleaved with equal weight; scores are never
    /// re-normalized across versions, so a hit from a small corpus counts the
    /// same as one from a large corpus. Versions whose collection cannot be
    /// opened are skipped with a warning as long as at least one version
    /// remains.
    ///
    /// The cache key is derived from the sorted, deduplicated version list,
    /// so `["2.0", "1.0"]` and `["1.0", "2.0"]` share an entry.
    pub async fn query_ensemble(
        &self,
        question: &str,
        versions: &[String],
        k: usize,
    ) -> Result<EnsembleResult, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::Validation("Question cannot be empty".into()));
        }
        if versions.is_empty() {
            return Err(AppError::Validation(
                "At least one version must be specified".into(),
            ));
        }

        let mut versions_sorted: Vec<String> = versions.to_vec();
        versions_sorted.sort();
        versions_sorted.dedup();
        let version_key = versions_sorted.join(",");

        let started = Instant::now();

        if let Some(result) =
            self.cache
                .get::<EnsembleResult>(question, Some(version_key.as_str()), k)
        {
            info!(query = %truncate_chars(question, 100), "returning cached multi-version result");
            self.monitor.log_query(
                question,
                Some(version_key.as_str()),
                Some(started.elapsed().as_secs_f64()),
                result.total_sources,
                true,
            );
            return Ok(result);
        }

        info!(
            query = %truncate_chars(question, 100),
            versions = versions_sorted.len(),
            "multi-version query"
        );

        let mut handles: Vec<(String, CollectionHandle)> = Vec::new();
        for version in &versions_sorted {
            match self.collections.get_existing(Some(version.as_str())).await {
                Some(handle) => handles.push((version.clone(), handle)),
                None => {
                    warn!(version = %version, "failed to open collection for version; skipping");
                }
            }
        }

        if handles.is_empty() {
            return Err(AppError::NoValidVersions(
                "No valid versions found to query".into(),
            ));
        }

        let mut per_version: Vec<(String, Vec<ScoredChunk>)> = Vec::new();
        for (version, handle) in &handles {
            let hits = self
                .collections
                .search(handle, question, k)
                .await
                .map_err(|e| AppError::Retrieval(e.to_string()))?;
            per_version.push((version.clone(), hits));
        }

        // Rank-interleaved merge: rank 0 of every version, then rank 1, and
        // so on. Equal per-version weight regardless of corpus size.
        let mut merged: Vec<(String, ScoredChunk)> = Vec::new();
        for rank in 0..k {
            for (version, hits) in &per_version {
                if let Some(hit) = hits.get(rank) {
                    merged.push((version.clone(), hit.clone()));
                }
            }
        }

        let context = merged
            .iter()
            .map(|(version, chunk)| format!("[version {version}] {}", chunk.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        let answer = self
            .llm
            .answer(question, &context, AnswerStyle::MultiVersion)
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;

        let total_sources = merged.len();
        let mut sources_by_version: BTreeMap<String, Vec<RetrievedSource>> = BTreeMap::new();
        for (version, chunk) in merged {
            sources_by_version
                .entry(version)
                .or_default()
                .push(RetrievedSource {
                    content: truncate_chars(&chunk.text, SOURCE_PREVIEW_CHARS),
                    metadata: chunk.metadata,
                });
        }

        let result = EnsembleResult {
            answer,
            query: question.to_string(),
            versions_queried: versions_sorted,
            sources_by_version,
            total_sources,
        };

        self.cache.set(question, &result, Some(version_key.as_str()), k);

        let elapsed = started.elapsed().as_secs_f64();
        self.monitor.log_query(
            question,
            Some(version_key.as_str()),
            Some(elapsed),
            total_sources,
            false,
        );
        info!(elapsed, total_sources, "multi-version query completed");

        Ok(result)
    }
}
