pub mod document;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};

use common::{
    error::AppError,
    storage::{
        collections::{CollectionHandle, CollectionManager},
        types::document_chunk::SourceChunk,
    },
    utils::version::extract_version_from_path,
};
use document::{load_document, split_document, DocumentFormat};
use monitoring::EmbeddingMonitor;

const DEFAULT_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "html", "htm"];

/// Outcome of a directory embedding run. Per-file failures are collected here
/// instead of aborting the batch.
#[derive(Debug, Default, Serialize)]
pub struct EmbedReport {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<EmbedError>,
}

#[derive(Debug, Serialize)]
pub struct EmbedError {
    pub file: String,
    pub error: String,
}

/// Write path into the vector store: turns loader output into persisted,
/// version-scoped collections and records an embedding event per operation.
pub struct IngestionPipeline {
    collections: Arc<CollectionManager>,
    monitor: Arc<EmbeddingMonitor>,
}

impl IngestionPipeline {
    pub fn new(collections: Arc<CollectionManager>, monitor: Arc<EmbeddingMonitor>) -> Self {
        Self {
            collections,
            monitor,
        }
    }

    /// Embeds pre-chunked content into the collection for `version`. The
    /// chunks are written as-is; the pipeline never re-chunks. An embedding
    /// event is logged whether the write succeeds or fails; telemetry itself
    /// can never fail the operation.
    pub async fn embed_chunks(
        &self,
        chunks: Vec<SourceChunk>,
        version: Option<&str>,
        overwrite: bool,
    ) -> Result<CollectionHandle, AppError> {
        let collection_name = self.collections.resolve_name(version);
        let source = chunks
            .first()
            .map(|chunk| chunk.metadata.source_file.clone())
            .unwrap_or_default();
        let started = Instant::now();

        match self.collections.write(&chunks, version, overwrite).await {
            Ok(handle) => {
                self.monitor.log_embedding(
                    &source,
                    version,
                    &collection_name,
                    chunks.len(),
                    Some(started.elapsed().as_secs_f64()),
                    true,
                );
                Ok(handle)
            }
            Err(e) => {
                self.monitor.log_embedding(
                    &source,
                    version,
                    &collection_name,
                    chunks.len(),
                    Some(started.elapsed().as_secs_f64()),
                    false,
                );
                Err(e)
            }
        }
    }

    /// Loads, splits, and embeds a single document. When no version is given,
    /// one is extracted from the path if present (`docs/v1.2.3/...`).
    pub async fn embed_file(
        &self,
        path: &Path,
        version: Option<&str>,
        overwrite: bool,
    ) -> Result<CollectionHandle, AppError> {
        if !path.exists() {
            return Err(AppError::NotFound(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let format = DocumentFormat::from_path(path).ok_or_else(|| {
            AppError::Validation(format!("Unsupported document format: {}", path.display()))
        })?;

        let source_file = path.display().to_string();
        let extracted;
        let version = match version {
            Some(version) => Some(version),
            None => {
                extracted = extract_version_from_path(&source_file);
                extracted.as_deref()
            }
        };

        info!(file = %source_file, ?version, "embedding document");

        let text = load_document(path, format).await?;
        let chunks = split_document(&text, &source_file, format, version)?;
        info!(file = %source_file, chunks = chunks.len(), "split document into chunks");

        self.embed_chunks(chunks, version, overwrite).await
    }

    /// Embeds every supported file under `directory`, recursively. Batch runs
    /// are always incremental; a re-run therefore duplicates chunks for files
    /// embedded before. Individual failures are reported, not fatal.
    pub async fn embed_directory(
        &self,
        directory: &Path,
        version: Option<&str>,
        extensions: Option<&[&str]>,
    ) -> Result<EmbedReport, AppError> {
        if !directory.is_dir() {
            return Err(AppError::Validation(format!(
                "Not a directory: {}",
                directory.display()
            )));
        }

        let extensions = extensions.unwrap_or(DEFAULT_EXTENSIONS);
        let files = collect_files(directory, extensions)?;
        info!(
            directory = %directory.display(),
            files = files.len(),
            "found files to embed"
        );

        let mut report = EmbedReport::default();
        for file in files {
            match self.embed_file(&file, version, false).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    error!(file = %file.display(), error = %e, "failed to embed file");
                    report.failed += 1;
                    report.errors.push(EmbedError {
                        file: file.display().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "embedding batch complete"
        );
        Ok(report)
    }
}

fn collect_files(directory: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, AppError> {
    let mut files = Vec::new();
    let mut pending = vec![directory.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(directory = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };

        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    let ext = ext.to_ascii_lowercase();
                    extensions.iter().any(|wanted| *wanted == ext)
                })
            {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}
