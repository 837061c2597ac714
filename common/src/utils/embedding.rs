use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    str::FromStr,
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use async_openai::{types::CreateEmbeddingRequestArgs, Client};
use fastembed::{EmbeddingModel, ModelTrait, TextEmbedding, TextInitOptions};
use tokio::sync::Mutex;

use crate::utils::config::AppConfig;

const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingBackend {
    OpenAI,
    #[default]
    FastEmbed,
    Hashed,
}

impl FromStr for EmbeddingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "hashed" => Ok(Self::Hashed),
            "fastembed" | "fast-embed" | "fast" => Ok(Self::FastEmbed),
            other => Err(anyhow!(
                "unknown embedding backend '{other}'. Expected 'openai', 'hashed', or 'fastembed'."
            )),
        }
    }
}

/// Embedding backend selected once at configuration-load time. The hashed
/// variant is fully offline and deterministic, which keeps tests independent
/// of model downloads and API keys.
#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: EmbeddingInner,
}

#[derive(Clone)]
enum EmbeddingInner {
    OpenAI {
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        model: String,
        dimensions: u32,
    },
    Hashed {
        dimension: usize,
    },
    FastEmbed {
        model: Arc<Mutex<TextEmbedding>>,
        dimension: usize,
    },
}

impl EmbeddingProvider {
    pub async fn from_config(
        config: &AppConfig,
        openai_client: Option<Arc<Client<async_openai::config::OpenAIConfig>>>,
    ) -> Result<Self> {
        match EmbeddingBackend::from_str(&config.embedding_backend)? {
            EmbeddingBackend::OpenAI => {
                let client = openai_client
                    .ok_or_else(|| anyhow!("OpenAI embedding backend requires a client"))?;
                let model = config
                    .embedding_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_EMBEDDING_MODEL.to_string());
                Ok(Self::new_openai(client, model, config.embedding_dimensions))
            }
            EmbeddingBackend::FastEmbed => {
                Self::new_fastembed(config.embedding_model.clone()).await
            }
            EmbeddingBackend::Hashed => Self::new_hashed(config.embedding_dimensions as usize),
        }
    }

    pub fn new_openai(
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        model: String,
        dimensions: u32,
    ) -> Self {
        Self {
            inner: EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            },
        }
    }

    pub async fn new_fastembed(model_override: Option<String>) -> Result<Self> {
        let model_name = match model_override {
            Some(code) => EmbeddingModel::from_str(&code).map_err(|err| anyhow!(err))?,
            None => EmbeddingModel::default(),
        };

        // Model initialization downloads weights on first use and is
        // CPU-heavy, so it runs off the async runtime.
        let options = TextInitOptions::new(model_name.clone()).with_show_download_progress(true);
        let (model, dimension) = tokio::task::spawn_blocking(move || -> Result<_> {
            let text_model =
                TextEmbedding::try_new(options).context("initialising FastEmbed text model")?;
            let info = EmbeddingModel::get_model_info(&model_name)
                .ok_or_else(|| anyhow!("FastEmbed model metadata missing for {model_name}"))?;
            Ok((text_model, info.dim))
        })
        .await
        .context("joining FastEmbed initialisation task")??;

        Ok(Self {
            inner: EmbeddingInner::FastEmbed {
                model: Arc::new(Mutex::new(model)),
                dimension,
            },
        })
    }

    pub fn new_hashed(dimension: usize) -> Result<Self> {
        Ok(Self {
            inner: EmbeddingInner::Hashed {
                dimension: dimension.max(1),
            },
        })
    }

    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            EmbeddingInner::OpenAI { .. } => "openai",
            EmbeddingInner::FastEmbed { .. } => "fastembed",
            EmbeddingInner::Hashed { .. } => "hashed",
        }
    }

    /// Vector width this provider produces; the store's HNSW index must be
    /// defined with the same dimension.
    pub fn dimension(&self) -> usize {
        match &self.inner {
            EmbeddingInner::OpenAI { dimensions, .. } => *dimensions as usize,
            EmbeddingInner::FastEmbed { dimension, .. } => *dimension,
            EmbeddingInner::Hashed { dimension } => *dimension,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(vec![text.to_owned()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedding backend returned no vector for input"))
    }

    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(texts
                .iter()
                .map(|text| hashed_embedding(text, *dimension))
                .collect()),
            EmbeddingInner::FastEmbed { model, .. } => {
                let mut guard = model.lock().await;
                guard
                    .embed(texts, None)
                    .context("generating fastembed batch embeddings")
            }
            EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            } => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model.clone())
                    .input(texts)
                    .dimensions(*dimensions)
                    .build()?;

                let response = client.embeddings().create(request).await?;
                if response.data.is_empty() {
                    return Err(anyhow!("No embedding data received from OpenAI API"));
                }

                Ok(response
                    .data
                    .into_iter()
                    .map(|item| item.embedding)
                    .collect())
            }
        }
    }
}

// Bag-of-tokens vector, L2-normalized. Deterministic across runs.
fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];

    for token in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        token.to_ascii_lowercase().hash(&mut hasher);
        let bucket = (hasher.finish() as usize) % dim;
        vector[bucket] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}
