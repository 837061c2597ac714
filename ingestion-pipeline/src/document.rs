use std::fmt;
use std::path::Path;

use dom_smoothie::{Article, Readability, TextMode};
use text_splitter::{ChunkConfig, MarkdownSplitter, TextSplitter};

use common::{
    error::AppError,
    storage::types::document_chunk::{ChunkMetadata, SourceChunk},
};

const CHUNK_SIZE_CHARS: usize = 1000;
const CHUNK_OVERLAP_CHARS: usize = 200;

/// Document formats the loader understands, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Markdown,
    Text,
    Html,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "txt" => Some(Self::Text),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Markdown => "md",
            Self::Text => "txt",
            Self::Html => "html",
        };
        f.write_str(label)
    }
}

/// Reads a document and returns its plain-text content. HTML is reduced to
/// readable article text first; markdown and plain text pass through as-is.
pub async fn load_document(path: &Path, format: DocumentFormat) -> Result<String, AppError> {
    let raw = tokio::fs::read_to_string(path).await?;

    match format {
        DocumentFormat::Markdown | DocumentFormat::Text => Ok(raw),
        DocumentFormat::Html => {
            let config = dom_smoothie::Config {
                text_mode: TextMode::Markdown,
                ..Default::default()
            };
            let mut readability = Readability::new(raw, None, Some(config))?;
            let article: Article = readability.parse()?;
            Ok(article.text_content.into())
        }
    }
}

/// Splits document text into embedding-sized chunks, each tagged with its
/// source file, format, version, and position.
pub fn split_document(
    text: &str,
    source_file: &str,
    format: DocumentFormat,
    version: Option<&str>,
) -> Result<Vec<SourceChunk>, AppError> {
    let chunk_config = ChunkConfig::new(CHUNK_SIZE_CHARS)
        .with_overlap(CHUNK_OVERLAP_CHARS)
        .map_err(|e| AppError::Processing(format!("invalid chunk overlap: {e}")))?;

    let pieces: Vec<String> = match format {
        DocumentFormat::Markdown => MarkdownSplitter::new(chunk_config)
            .chunks(text)
            .map(str::to_owned)
            .collect(),
        DocumentFormat::Text | DocumentFormat::Html => TextSplitter::new(chunk_config)
            .chunks(text)
            .map(str::to_owned)
            .collect(),
    };

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| {
            SourceChunk::new(
                piece,
                ChunkMetadata {
                    source_file: source_file.to_string(),
                    file_format: format.to_string(),
                    version: version.map(ToOwned::to_owned),
                    chunk_index: Some(index),
                    ..Default::default()
                },
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("guide.md")),
            Some(DocumentFormat::Markdown)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("notes.TXT")),
            Some(DocumentFormat::Text)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("index.htm")),
            Some(DocumentFormat::Html)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("report.pdf")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_split_tags_chunks_with_metadata() {
        let text = "Widgets are configured in the settings panel.";
        let chunks = split_document(text, "docs/widgets.md", DocumentFormat::Markdown, Some("2.0"))
            .expect("split");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].metadata.source_file, "docs/widgets.md");
        assert_eq!(chunks[0].metadata.file_format, "md");
        assert_eq!(chunks[0].metadata.version.as_deref(), Some("2.0"));
        assert_eq!(chunks[0].metadata.chunk_index, Some(0));
    }

    #[test]
    fn test_split_long_text_produces_bounded_chunks() {
        let paragraph = "The retrieval system stores versioned documentation. ".repeat(60);
        let chunks =
            split_document(&paragraph, "docs/long.txt", DocumentFormat::Text, None).expect("split");

        assert!(chunks.len() > 1, "long input should produce several chunks");
        assert!(chunks.iter().all(|c| c.text.len() <= CHUNK_SIZE_CHARS));
        let indexes: Vec<usize> = chunks.iter().filter_map(|c| c.metadata.chunk_index).collect();
        assert_eq!(indexes, (0..chunks.len()).collect::<Vec<_>>());
    }
}
