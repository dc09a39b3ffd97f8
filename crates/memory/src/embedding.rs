use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::MemoryError;

pub const EMBEDDING_DIMENSION: usize = 768;

/// Text to unit-length vector. Every vector produced by one embedder has the
/// same length.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}

/// Deterministic offline embedder. Identical text always yields the identical
/// vector, with no network access.
#[derive(Clone, Debug)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimension: EMBEDDING_DIMENSION }
    }
}

impl HashEmbedder {
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        Ok(hash_embedding(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Seeds a Lehmer-style sequence from a 31-multiplier string hash over UTF-16
/// code units, all in wrapping 32-bit arithmetic.
pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut hash: i32 = 0;
    for unit in text.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(i32::from(unit));
    }

    let scale = f64::from(i32::MAX);
    let raw: Vec<f64> = (0..dimension)
        .map(|_| {
            hash = hash.wrapping_mul(16_807).wrapping_add(1);
            f64::from(hash & i32::MAX) / scale
        })
        .collect();

    let magnitude = raw.iter().map(|value| value * value).sum::<f64>().sqrt();
    if magnitude == 0.0 {
        return raw.into_iter().map(|value| value as f32).collect();
    }
    raw.into_iter().map(|value| (value / magnitude) as f32).collect()
}

pub fn normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vector.iter_mut().for_each(|value| *value /= magnitude);
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

pub struct GeminiEmbedder {
    client: Client,
    api_key: SecretString,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, MemoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| MemoryError::Embedding(format!("http client setup failed: {error}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/models/{model}:embedContent", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let request = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent { parts: [EmbedPart { text }] },
            output_dimensionality: EMBEDDING_DIMENSION,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| MemoryError::Embedding(format!("request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemoryError::Embedding(format!("HTTP {}: {body}", status.as_u16())));
        }

        let parsed: EmbedContentResponse = response
            .json()
            .await
            .map_err(|error| MemoryError::Embedding(format!("invalid response body: {error}")))?;

        let mut values = parsed.embedding.values;
        if values.len() != EMBEDDING_DIMENSION {
            return Err(MemoryError::DimensionMismatch {
                expected: EMBEDDING_DIMENSION,
                actual: values.len(),
            });
        }
        normalize(&mut values);
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::{cosine_similarity, hash_embedding, normalize, Embedder, HashEmbedder};

    const EPSILON: f32 = 1e-5;

    fn norm(vector: &[f32]) -> f32 {
        vector.iter().map(|value| value * value).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn hash_embedding_is_deterministic_and_unit_length() {
        let embedder = HashEmbedder::default();
        let first = embedder.embed("I prefer window seats").await.expect("embed");
        let second = embedder.embed("I prefer window seats").await.expect("embed");

        assert_eq!(first, second);
        assert_eq!(first.len(), 768);
        assert!((norm(&first) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn different_text_gives_different_vectors() {
        assert_ne!(hash_embedding("alpha", 16), hash_embedding("beta", 16));
    }

    #[test]
    fn empty_text_still_produces_unit_vector() {
        let vector = hash_embedding("", 32);
        assert!((norm(&vector) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn self_similarity_is_one() {
        let vector = hash_embedding("coffee with oat milk", 768);
        assert!((cosine_similarity(&vector, &vector) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn zero_vector_similarity_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn normalize_scales_to_unit_length() {
        let mut vector = vec![3.0, 4.0];
        normalize(&mut vector);
        assert!((vector[0] - 0.6).abs() < EPSILON);
        assert!((vector[1] - 0.8).abs() < EPSILON);
    }
}
