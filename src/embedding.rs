//! Embedding provider abstraction and implementations.
//!
//! - **[`VocabularyProvider`]**: bag-of-words counts over a vocabulary fitted
//!   to the whole corpus. No network access.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API with batching,
//!   retry, and backoff.
//!
//! Documents and queries must be embedded by the same provider, fitted the
//! same way; [`crate::retrieval`] enforces that when it loads an index.
//!
//! # Provider Selection
//!
//! | Config Value | Provider |
//! |-------------|----------|
//! | `"vocabulary"` | [`VocabularyProvider`] |
//! | `"openai"` | [`OpenAIProvider`] |

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::{credential, EmbeddingConfig, OPENAI_API_KEY};
use crate::openai;
use crate::vectorize::Vocabulary;

/// Model name recorded for bag-of-words indexes.
pub const VOCABULARY_MODEL: &str = "bag-of-words";

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

// ============ Vocabulary Provider ============

/// Raw term counts over a fixed vocabulary.
pub struct VocabularyProvider {
    vocabulary: Vocabulary,
}

impl VocabularyProvider {
    /// Fit a vocabulary over every text in the corpus.
    pub fn fit<S: AsRef<str>>(corpus: &[S]) -> Self {
        Self {
            vocabulary: Vocabulary::build(corpus),
        }
    }

    pub fn from_vocabulary(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}

#[async_trait]
impl EmbeddingProvider for VocabularyProvider {
    fn model_name(&self) -> &str {
        VOCABULARY_MODEL
    }
    fn dims(&self) -> usize {
        self.vocabulary.len()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vocabulary.vectorize(t)).collect())
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls the `POST /v1/embeddings` endpoint with the configured model,
/// `batch_size` texts per request.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config,
    /// or if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = credential(OPENAI_API_KEY)?;

        Ok(Self {
            model,
            dims,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            api_key,
            client: openai::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = openai::post_with_retry(
                &self.client,
                openai::EMBEDDINGS_URL,
                &self.api_key,
                &body,
                self.max_retries,
            )
            .await?;
            let batch_vectors = parse_openai_response(&json)?;
            if batch_vectors.len() != batch.len() {
                bail!(
                    "OpenAI returned {} embeddings for {} inputs",
                    batch_vectors.len(),
                    batch.len()
                );
            }
            for v in &batch_vectors {
                if v.len() != self.dims {
                    bail!(
                        "OpenAI returned {}-dimensional vectors, embedding.dims is {}",
                        v.len(),
                        self.dims
                    );
                }
            }
            vectors.extend(batch_vectors);
        }
        Ok(vectors)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays, ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push((index, vec));
    }

    embeddings.sort_by_key(|(index, _)| *index);
    Ok(embeddings.into_iter().map(|(_, v)| v).collect())
}
