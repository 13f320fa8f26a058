//! Vector index over the canonical store, and question answering on top of it.
//!
//! The index records which embedding space its vectors live in: the
//! provider's model name, its dimensionality, and for bag-of-words indexes
//! the fitted vocabulary itself. Queries are embedded in that same space,
//! so a query vector and every document vector always have the same length.
//! An index built with one model is never queried with another.
//!
//! # Answering
//!
//! 1. Embed the question with the index's own space.
//! 2. Rank every entry by cosine similarity, dropping `NaN` scores.
//! 3. Join the top-k entries' text into a context block.
//! 4. Hand context and question to the generation provider, if one is configured.

use std::collections::HashMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::EmbeddingConfig;
use crate::embedding::{embed_query, EmbeddingProvider, OpenAIProvider, VocabularyProvider};
use crate::generation::GenerationProvider;
use crate::models::{CanonicalRecord, VectorEntry};
use crate::vectorize::{rank_top_k, Vocabulary};

/// Separator between retrieved passages in the generation prompt.
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorIndex {
    pub model: String,
    pub dims: usize,
    /// Fitted terms, for bag-of-words indexes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocabulary: Option<Vec<String>>,
    pub entries: Vec<VectorEntry>,
}

impl VectorIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn same_space(&self, provider: &dyn EmbeddingProvider, vocabulary: Option<&Vocabulary>) -> bool {
        let terms = vocabulary.map(|v| v.terms().map(str::to_string).collect::<Vec<_>>());
        self.model == provider.model_name() && self.dims == provider.dims() && self.vocabulary == terms
    }
}

/// SHA-256 of `text`, lowercase hex.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The provider used to build a fresh index over `records`.
pub fn index_provider(
    config: &EmbeddingConfig,
    records: &[CanonicalRecord],
) -> Result<(Box<dyn EmbeddingProvider>, Option<Vocabulary>)> {
    match config.provider.as_str() {
        "vocabulary" => {
            let texts: Vec<String> = records.iter().map(CanonicalRecord::raw_text).collect();
            let provider = VocabularyProvider::fit(&texts);
            let vocabulary = provider.vocabulary().clone();
            Ok((Box::new(provider), Some(vocabulary)))
        }
        "openai" => Ok((Box::new(OpenAIProvider::new(config)?), None)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// The provider that embeds queries in `index`'s space.
pub fn query_provider(index: &VectorIndex, config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match &index.vocabulary {
        Some(terms) => Ok(Box::new(VocabularyProvider::from_vocabulary(
            Vocabulary::from_terms(terms.iter().cloned()),
        ))),
        None => {
            if !config.is_remote() {
                bail!(
                    "Vector index was built with model '{}' but embedding.provider is '{}'; rebuild with `harvest index`",
                    index.model,
                    config.provider
                );
            }
            Ok(Box::new(OpenAIProvider::new(config)?))
        }
    }
}

/// Embed every record, reusing vectors from `previous` for unchanged text in the same space.
pub async fn build_index(
    provider: &dyn EmbeddingProvider,
    vocabulary: Option<&Vocabulary>,
    records: &[CanonicalRecord],
    previous: Option<&VectorIndex>,
) -> Result<VectorIndex> {
    let reusable: HashMap<(&str, &str), &[f32]> = previous
        .filter(|p| p.same_space(provider, vocabulary))
        .map(|p| {
            p.entries
                .iter()
                .map(|e| ((e.url.as_str(), e.content_hash.as_str()), e.vector.as_slice()))
                .collect()
        })
        .unwrap_or_default();

    let prepared: Vec<(String, String)> = records
        .iter()
        .map(|r| {
            let text = r.raw_text();
            let hash = content_hash(&text);
            (text, hash)
        })
        .collect();

    let missing: Vec<usize> = prepared
        .iter()
        .zip(records)
        .enumerate()
        .filter(|(_, ((_, hash), r))| !reusable.contains_key(&(r.url.as_str(), hash.as_str())))
        .map(|(i, _)| i)
        .collect();
    let texts: Vec<String> = missing.iter().map(|&i| prepared[i].0.clone()).collect();
    let fresh = if texts.is_empty() {
        Vec::new()
    } else {
        provider.embed(&texts).await?
    };
    if fresh.len() != texts.len() {
        bail!("Embedding provider returned {} vectors for {} texts", fresh.len(), texts.len());
    }
    let mut fresh: HashMap<usize, Vec<f32>> = missing.into_iter().zip(fresh).collect();

    tracing::info!(
        records = records.len(),
        embedded = fresh.len(),
        reused = records.len() - fresh.len(),
        model = provider.model_name(),
        "Built vector index"
    );

    let mut entries = Vec::with_capacity(records.len());
    for (i, (record, (text, hash))) in records.iter().zip(prepared).enumerate() {
        let vector = match fresh.remove(&i) {
            Some(v) => v,
            None => reusable
                .get(&(record.url.as_str(), hash.as_str()))
                .map(|v| v.to_vec())
                .unwrap_or_default(),
        };
        if vector.len() != provider.dims() {
            bail!(
                "Vector for {} has {} dimensions, expected {}",
                record.url,
                vector.len(),
                provider.dims()
            );
        }
        entries.push(VectorEntry {
            url: record.url.clone(),
            raw_text: text,
            vector,
            content_hash: hash,
            source_record: record.clone(),
        });
    }

    Ok(VectorIndex {
        model: provider.model_name().to_string(),
        dims: provider.dims(),
        vocabulary: vocabulary.map(|v| v.terms().map(str::to_string).collect()),
        entries,
    })
}

/// One retrieved entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub url: String,
    pub score: f32,
    #[serde(skip)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// `None` when generation is disabled.
    pub answer: Option<String>,
    pub sources: Vec<Hit>,
}

/// Top-k entries for `question`, best first.
pub async fn retrieve(
    index: &VectorIndex,
    provider: &dyn EmbeddingProvider,
    question: &str,
    k: usize,
) -> Result<Vec<Hit>> {
    if provider.model_name() != index.model {
        bail!(
            "Query model '{}' does not match index model '{}'",
            provider.model_name(),
            index.model
        );
    }
    let query = embed_query(provider, question).await?;
    if query.len() != index.dims {
        bail!(
            "Query vector has {} dimensions, index has {}",
            query.len(),
            index.dims
        );
    }

    let ranked = rank_top_k(
        &query,
        index.entries.iter().map(|e| e.vector.as_slice()),
        k,
    );
    Ok(ranked
        .into_iter()
        .map(|(i, score)| Hit {
            url: index.entries[i].url.clone(),
            score,
            text: index.entries[i].raw_text.clone(),
        })
        .collect())
}

pub async fn answer(
    index: &VectorIndex,
    embedder: &dyn EmbeddingProvider,
    generator: Option<&dyn GenerationProvider>,
    system_prompt: &str,
    question: &str,
    k: usize,
) -> Result<Answer> {
    let sources = retrieve(index, embedder, question, k).await?;
    tracing::debug!(question, hits = sources.len(), "Retrieved context");

    let answer = match generator {
        Some(generator) => {
            let context = sources
                .iter()
                .map(|h| h.text.as_str())
                .collect::<Vec<_>>()
                .join(CONTEXT_SEPARATOR);
            let user_prompt = format!("Context:\n{}\n\nQuestion: {}", context, question);
            Some(generator.complete(system_prompt, &user_prompt).await?)
        }
        None => None,
    };

    Ok(Answer { answer, sources })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CrawlTarget, ExtractedRecord};
    use async_trait::async_trait;

    fn record(url: &str, title: &str) -> CanonicalRecord {
        let mut r = ExtractedRecord::new(&CrawlTarget::new(url, ""));
        r.fields.insert("title".into(), title.into());
        r
    }

    struct CountingProvider {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls
                .fetch_add(texts.len(), std::sync::atomic::Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_query_and_documents_share_dimensions() {
        let records = vec![
            record("https://x.com/a", "Router X fast router"),
            record("https://x.com/b", "Switch Y managed switch"),
        ];
        let (provider, vocabulary) = index_provider(&EmbeddingConfig::default(), &records).unwrap();
        let index = build_index(provider.as_ref(), vocabulary.as_ref(), &records, None)
            .await
            .unwrap();
        assert!(index.entries.iter().all(|e| e.vector.len() == index.dims));

        let query = query_provider(&index, &EmbeddingConfig::default()).unwrap();
        let vector = embed_query(query.as_ref(), "some unseen words and router").await.unwrap();
        assert_eq!(vector.len(), index.dims);

        let hits = retrieve(&index, query.as_ref(), "fast router", 1).await.unwrap();
        assert_eq!(hits[0].url, "https://x.com/a");
    }

    #[tokio::test]
    async fn test_unrelated_query_matches_nothing() {
        let records = vec![record("https://x.com/a", "router")];
        let provider = VocabularyProvider::fit(&[records[0].raw_text()]);
        let index = build_index(&provider, Some(provider.vocabulary()), &records, None)
            .await
            .unwrap();
        let hits = retrieve(&index, &provider, "banana", 3).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_reuses_unchanged_vectors() {
        let provider = CountingProvider {
            calls: Default::default(),
        };
        let first = vec![record("a", "one"), record("b", "two")];
        let index = build_index(&provider, None, &first, None).await.unwrap();
        assert_eq!(provider.calls.load(std::sync::atomic::Ordering::SeqCst), 2);

        let second = vec![record("a", "one"), record("b", "two changed"), record("c", "three")];
        let rebuilt = build_index(&provider, None, &second, Some(&index)).await.unwrap();
        assert_eq!(provider.calls.load(std::sync::atomic::Ordering::SeqCst), 4);
        assert_eq!(rebuilt.entries[0].vector, index.entries[0].vector);
        assert_eq!(rebuilt.len(), 3);
    }

    #[tokio::test]
    async fn test_model_mismatch_is_an_error() {
        let records = vec![record("a", "router")];
        let provider = CountingProvider {
            calls: Default::default(),
        };
        let index = build_index(&provider, None, &records, None).await.unwrap();
        let other = VocabularyProvider::fit(&["router"]);
        assert!(retrieve(&index, &other, "router", 1).await.is_err());
        assert!(query_provider(&index, &EmbeddingConfig::default()).is_err());
    }
}
