use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Instant;

use tracing::{info, warn};

use common::{
    error::AppError,
    storage::collections::{CollectionHandle, ScoredChunk},
    utils::llm::AnswerStyle,
};

use crate::{
    options::{QueryMode, QueryOptions},
    truncate_chars, QueryResult, RetrievalPipeline, RetrievedSource,
};

impl RetrievalPipeline {
    /// Answers a natural-language question against one version's collection.
    ///
    /// A cache hit returns immediately without touching the vector store or
    /// the language model. On a miss the collection is opened read-only
    /// (querying never creates collections), the top-k chunks are retrieved,
    /// an answer is synthesized, and the result is cached for next time.
    pub async fn query(
        &self,
        question: &str,
        version: Option<&str>,
        opts: QueryOptions,
    ) -> Result<QueryResult, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::Validation("Question cannot be empty".into()));
        }

        let use_cache = opts.use_cache.unwrap_or(self.use_cache);
        let started = Instant::now();

        if use_cache {
            if let Some(result) = self.cache.get::<QueryResult>(question, version, opts.k) {
                info!(query = %truncate_chars(question, 100), "returning cached result");
                self.monitor.log_query(
                    question,
                    version,
                    Some(started.elapsed().as_secs_f64()),
                    result.source_documents.len(),
                    true,
                );
                return Ok(result);
            }
        }

        info!(
            query = %truncate_chars(question, 100),
            ?version,
            mode = %opts.mode,
            "processing query"
        );

        let handle = self.collections.get_existing(version).await.ok_or_else(|| {
            AppError::NotFound(format!(
                "Collection {} does not exist",
                self.collections.resolve_name(version)
            ))
        })?;

        let scored = self.retrieve(&handle, question, opts).await?;

        let context = scored
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let answer = self
            .llm
            .answer(question, &context, AnswerStyle::SingleVersion)
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;

        let source_documents: Vec<RetrievedSource> = scored
            .into_iter()
            .map(|chunk| RetrievedSource {
                content: chunk.text,
                metadata: chunk.metadata,
            })
            .collect();

        let result = QueryResult {
            answer,
            query: question.to_string(),
            source_documents,
        };

        if use_cache {
            self.cache.set(question, &result, version, opts.k);
        }

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            sources = result.source_documents.len(),
            elapsed, "query processed"
        );
        self.monitor.log_query(
            question,
            version,
            Some(elapsed),
            result.source_documents.len(),
            false,
        );

        Ok(result)
    }

    /// Retrieves top-k chunks for the question. Multi-query mode unions the
    /// retrievals of up to three paraphrases with the original question,
    /// dedups by chunk id, and re-ranks by distance; a failed expansion falls
    /// back to the original question alone.
    pub(crate) async fn retrieve(
        &self,
        handle: &CollectionHandle,
        question: &str,
        opts: QueryOptions,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let mut query_texts = vec![question.to_string()];
        if opts.mode == QueryMode::MultiQuery {
            match self.llm.expand_query(question).await {
                Ok(alternatives) => query_texts.extend(alternatives),
                Err(e) => {
                    warn!(error = %e, "query expansion failed; retrieving with the original question");
                }
            }
        }

        let mut merged: Vec<ScoredChunk> = Vec::new();
        let mut seen = HashSet::new();
        for text in &query_texts {
            let hits = self
                .collections
                .search(handle, text, opts.k)
                .await
                .map_err(|e| AppError::Retrieval(e.to_string()))?;
            for hit in hits {
                if seen.insert(hit.id.clone()) {
                    merged.push(hit);
                }
            }
        }

        if query_texts.len() > 1 {
            merged.sort_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(Ordering::Equal)
            });
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_version, test_env};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let env = test_env(dir.path()).await;

        let result = env.pipeline.query("   ", None, QueryOptions::default()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_query_against_missing_collection() {
        let dir = tempdir().expect("tempdir");
        let env = test_env(dir.path()).await;

        let result = env
            .pipeline
            .query("anything?", Some("9.9"), QueryOptions::default())
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_query_returns_answer_with_sources() {
        let dir = tempdir().expect("tempdir");
        let env = test_env(dir.path()).await;
        seed_version(
            &env,
            Some("1.0"),
            &[
                "widgets are configured in the settings panel",
                "invoices are exported by the billing module",
            ],
        )
        .await;

        let result = env
            .pipeline
            .query(
                "how do I configure widgets?",
                Some("1.0"),
                QueryOptions::default(),
            )
            .await
            .expect("query");

        assert!(result.answer.contains("widgets"));
        assert!(!result.source_documents.is_empty());
        assert_eq!(result.query, "how do I configure widgets?");

        let stats = env.monitor.query_stats(7);
        assert_eq!(stats.total_queries, 1);
        assert_eq!(stats.cache_hit_rate, 0.0);
    }

    #[tokio::test]
    async fn test_second_query_is_served_from_cache() {
        let dir = tempdir().expect("tempdir");
        let env = test_env(dir.path()).await;
        seed_version(&env, Some("1.0"), &["widgets are configured in the settings panel"]).await;

        let first = env
            .pipeline
            .query("configure widgets?", Some("1.0"), QueryOptions::default())
            .await
            .expect("query");
        let second = env
            .pipeline
            .query("configure widgets?", Some("1.0"), QueryOptions::default())
            .await
            .expect("query");

        assert_eq!(first, second);

        let stats = env.monitor.query_stats(7);
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.cache_hit_rate, 50.0);
    }

    #[tokio::test]
    async fn test_cache_hit_is_normalized_on_query_text() {
        let dir = tempdir().expect("tempdir");
        let env = test_env(dir.path()).await;
        seed_version(&env, Some("1.0"), &["widgets are configured in the settings panel"]).await;

        env.pipeline
            .query("configure widgets?", Some("1.0"), QueryOptions::default())
            .await
            .expect("query");
        env.pipeline
            .query("  Configure Widgets? ", Some("1.0"), QueryOptions::default())
            .await
            .expect("query");

        assert_eq!(env.cache.stats().entries, 1);
        assert_eq!(env.monitor.query_stats(7).cache_hit_rate, 50.0);
    }

    #[tokio::test]
    async fn test_disabling_cache_skips_cache_entirely() {
        let dir = tempdir().expect("tempdir");
        let env = test_env(dir.path()).await;
        seed_version(&env, Some("1.0"), &["widgets are configured in the settings panel"]).await;

        let opts = QueryOptions {
            use_cache: Some(false),
            ..QueryOptions::default()
        };
        env.pipeline
            .query("configure widgets?", Some("1.0"), opts)
            .await
            .expect("query");

        assert_eq!(env.cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_simple_mode_retrieves_at_most_k_sources() {
        let dir = tempdir().expect("tempdir");
        let env = test_env(dir.path()).await;
        seed_version(
            &env,
            None,
            &[
                "first passage about widgets",
                "second passage about widgets",
                "third passage about widgets",
                "fourth passage about widgets",
            ],
        )
        .await;

        let opts = QueryOptions {
            k: 2,
            mode: QueryMode::Simple,
            use_cache: Some(false),
        };
        let result = env
            .pipeline
            .query("widgets", None, opts)
            .await
            .expect("query");

        assert!(result.source_documents.len() <= 2);
    }
}
