use tracing::{info, warn};

use common::error::AppError;

use crate::{
    truncate_chars, QueryOptions, RetrievalPipeline, RetrievedSource, VersionAnswer,
    VersionComparison,
};

const TOP_SOURCES_PER_VERSION: usize = 3;
const SOURCE_PREVIEW_CHARS: usize = 300;

impl RetrievalPipeline {
    /// Answers the same question once per version, side by side, to show how
    /// the documentation changed. There is no cross-version synthesis; each
    /// version gets its own independently cached query, and a version whose
    /// query fails is reported with an `error` instead of aborting the rest.
    pub async fn compare_versions(
        &self,
        question: &str,
        versions: &[String],
        k: usize,
    ) -> Result<VersionComparison, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::Validation("Question cannot be empty".into()));
        }
        if versions.len() < 2 {
            return Err(AppError::Validation(
                "At least 2 versions required for comparison".into(),
            ));
        }

        info!(query = %truncate_chars(question, 100), versions = versions.len(), "comparing versions");

        let opts = QueryOptions {
            k,
            use_cache: Some(true),
            ..QueryOptions::default()
        };

        let mut comparison = VersionComparison {
            query: question.to_string(),
            versions_compared: versions.to_vec(),
            results_by_version: Default::default(),
        };

        for version in versions {
            let entry = match self.query(question, Some(version.as_str()), opts).await {
                Ok(result) => VersionAnswer {
                    answer: Some(result.answer),
                    source_count: result.source_documents.len(),
                    sources: result
                        .source_documents
                        .into_iter()
                        .take(TOP_SOURCES_PER_VERSION)
                        .map(|source| RetrievedSource {
                            content: truncate_chars(&source.content, SOURCE_PREVIEW_CHARS),
                            metadata: source.metadata,
                        })
                        .collect(),
                    error: None,
                },
                Err(e) => {
                    warn!(version = %version, error = %e, "failed to query version");
                    VersionAnswer {
                        error: Some(e.to_string()),
                        ..VersionAnswer::default()
                    }
                }
            };
            comparison
                .results_by_version
                .insert(version.clone(), entry);
        }

        Ok(comparison)
    }
}
