//! Pluggable embedding providers for the vector index.
//!
//! Provides a trait-based abstraction over embedding models, with implementations
//! for a local hashed term-frequency model (always available, no network),
//! the OpenAI embeddings API, and the Ollama embeddings API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EmbeddingError;

/// Trait for embedding providers.
///
/// The same embedder must be used at index-build time and at query time so
/// that similarity scores are comparable.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for a batch of texts, preserving order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Return the dimensionality of embeddings.
    fn dimensions(&self) -> usize;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Configuration for embedding providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "local" (default), "openai", "ollama"
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Provider-specific model name.
    #[serde(default)]
    pub model: Option<String>,
    /// Optional base URL override for the embeddings endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key (OpenAI only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Embedding dimensions (auto-detected from provider if 0).
    #[serde(default)]
    pub dimensions: usize,
    /// Batch size for bulk embedding operations.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_provider() -> String {
    "local".into()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

fn default_batch_size() -> usize {
    32
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            api_key_env: default_api_key_env(),
            dimensions: 0,
            batch_size: default_batch_size(),
        }
    }
}

impl EmbeddingConfig {
    fn local_dimensions(&self) -> usize {
        if self.dimensions > 0 {
            self.dimensions
        } else {
            LocalEmbedder::DEFAULT_DIMENSIONS
        }
    }
}

/// Local hashed term-frequency embedder.
///
/// Lowercases, splits on non-alphanumerics, hashes each distinct term into a
/// bucket, and L2-normalizes. Deterministic and dependency-free.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub const DEFAULT_DIMENSIONS: usize = 128;

    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        if words.is_empty() {
            return vector;
        }

        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in &words {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            let idx = simple_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

/// djb2 string hash.
fn simple_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

/// Cosine similarity between two vectors. Returns 0.0 for mismatched,
/// empty, or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn parse_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value.as_array().map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect()
    })
}

fn request_error(e: reqwest::Error) -> EmbeddingError {
    EmbeddingError::Request {
        message: e.to_string(),
    }
}

/// OpenAI API embedder (uses text-embedding-3-small by default).
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    base_url: String,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| "text-embedding-3-small".into());
        let dims = match model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        };
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            dims,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".into()),
            batch_size: default_batch_size(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn embed_api_call(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Request {
                message: format!("HTTP {}: {}", status, text),
            });
        }

        let json: serde_json::Value = resp.json().await.map_err(request_error)?;
        let data = json["data"]
            .as_array()
            .ok_or_else(|| EmbeddingError::ResponseParse {
                message: "missing 'data' array".into(),
            })?;

        let mut indexed: Vec<(usize, Vec<f32>)> = data
            .iter()
            .enumerate()
            .filter_map(|(pos, item)| {
                let idx = item["index"].as_u64().map(|i| i as usize).unwrap_or(pos);
                parse_vector(&item["embedding"]).map(|v| (idx, v))
            })
            .collect();
        if indexed.len() != inputs.len() {
            return Err(EmbeddingError::ResponseParse {
                message: format!(
                    "expected {} embeddings, got {}",
                    inputs.len(),
                    indexed.len()
                ),
            });
        }
        indexed.sort_by_key(|(idx, _)| *idx);
        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_api_call(&[text]).await?;
        vectors.pop().ok_or_else(|| EmbeddingError::ResponseParse {
            message: "empty embedding response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_api_call(batch).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

/// Ollama embedder (uses local Ollama API).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    base_url: String,
}

impl OllamaEmbedder {
    pub fn new(model: Option<String>, base_url: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| "nomic-embed-text".into());
        let dims = match model.as_str() {
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768,
        };
        Self {
            client: reqwest::Client::new(),
            model,
            dims,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".into()),
        }
    }

    async fn embed_api_call(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable {
                provider: "ollama".into(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Request {
                message: format!("HTTP {}: {}", status, text),
            });
        }

        let json: serde_json::Value = resp.json().await.map_err(request_error)?;
        let vectors: Vec<Vec<f32>> = json["embeddings"]
            .as_array()
            .map(|arr| arr.iter().filter_map(parse_vector).collect())
            .unwrap_or_default();
        if vectors.len() != inputs.len() {
            return Err(EmbeddingError::ResponseParse {
                message: format!(
                    "expected {} embeddings, got {}",
                    inputs.len(),
                    vectors.len()
                ),
            });
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_api_call(&[text]).await?;
        vectors.pop().ok_or_else(|| EmbeddingError::ResponseParse {
            message: "empty embedding response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed_api_call(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}

/// Factory function to create an embedder based on configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Box<dyn Embedder> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
            if api_key.is_empty() {
                tracing::warn!(
                    env = %config.api_key_env,
                    "API key not set, falling back to local embedder"
                );
                Box::new(LocalEmbedder::new(config.local_dimensions()))
            } else {
                Box::new(
                    OpenAiEmbedder::new(api_key, config.model.clone(), config.base_url.clone())
                        .with_batch_size(config.batch_size),
                )
            }
        }
        "ollama" => Box::new(OllamaEmbedder::new(
            config.model.clone(),
            config.base_url.clone(),
        )),
        "local" => Box::new(LocalEmbedder::new(config.local_dimensions())),
        other => {
            tracing::warn!(provider = other, "Unknown embedding provider, using local");
            Box::new(LocalEmbedder::new(config.local_dimensions()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_embedder_dimensions() {
        let embedder = LocalEmbedder::new(128);
        assert_eq!(embedder.dimensions(), 128);
        let v = embedder.embed("hello world").await.unwrap();
        assert_eq!(v.len(), 128);
    }

    #[tokio::test]
    async fn test_local_embedder_normalized() {
        let embedder = LocalEmbedder::new(128);
        let v = embedder
            .embed("test input text for normalization")
            .await
            .unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!(
            (norm - 1.0).abs() < 0.01,
            "Expected normalized vector, got norm={}",
            norm
        );
    }

    #[tokio::test]
    async fn test_local_embedder_empty_text() {
        let embedder = LocalEmbedder::new(128);
        let v = embedder.embed("").await.unwrap();
        assert_eq!(v.len(), 128);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_local_embedder_deterministic() {
        let embedder = LocalEmbedder::new(64);
        let a = embedder.embed("The capital of France is Paris.").await.unwrap();
        let b = embedder.embed("The capital of France is Paris.").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_local_embedder_batch_matches_single() {
        let embedder = LocalEmbedder::new(64);
        let batch = embedder.embed_batch(&["alpha beta", "gamma"]).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed("alpha beta").await.unwrap());
        assert_eq!(batch[1], embedder.embed("gamma").await.unwrap());
    }

    #[tokio::test]
    async fn test_related_text_scores_higher() {
        let embedder = LocalEmbedder::new(128);
        let query = embedder.embed("What is the capital of France?").await.unwrap();
        let paris = embedder.embed("The capital of France is Paris.").await.unwrap();
        let tokyo = embedder.embed("The capital of Japan is Tokyo.").await.unwrap();
        assert!(cosine_similarity(&query, &paris) > cosine_similarity(&query, &tokyo));
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_create_embedder_defaults_to_local() {
        let embedder = create_embedder(&EmbeddingConfig::default());
        assert_eq!(embedder.provider_name(), "local");
        assert_eq!(embedder.dimensions(), LocalEmbedder::DEFAULT_DIMENSIONS);
    }

    #[test]
    fn test_create_embedder_ollama() {
        let config = EmbeddingConfig {
            provider: "ollama".into(),
            model: Some("all-minilm".into()),
            ..Default::default()
        };
        let embedder = create_embedder(&config);
        assert_eq!(embedder.provider_name(), "ollama");
        assert_eq!(embedder.dimensions(), 384);
    }

    #[test]
    fn test_create_embedder_openai_without_key_falls_back() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            api_key_env: "RAGENT_TEST_UNSET_EMBEDDING_KEY".into(),
            dimensions: 32,
            ..Default::default()
        };
        let embedder = create_embedder(&config);
        assert_eq!(embedder.provider_name(), "local");
        assert_eq!(embedder.dimensions(), 32);
    }

    #[test]
    fn test_embedding_config_serde_defaults() {
        let config: EmbeddingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.provider, "local");
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.api_key_env, "OPENAI_API_KEY");
    }
}
