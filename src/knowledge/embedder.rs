use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::EmbedderConfig;
use crate::error::{AgentError, Result};

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimensions(&self) -> usize;
}

/// Lowercased word tokens hashed into fixed buckets, L2-normalised.
/// Deterministic within a build, for tests and offline runs.
pub struct HashingEmbedder {
    buckets: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { buckets: 384 }
    }
}

impl HashingEmbedder {
    pub fn new(buckets: usize) -> Self {
        Self {
            buckets: buckets.max(1),
        }
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.buckets];

        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        for token in tokens {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.hash(&mut hasher);
            let idx = (hasher.finish() as usize) % self.buckets;
            vector[idx] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.buckets
    }
}

/// Sentence embeddings from the HuggingFace Inference feature-extraction pipeline.
pub struct HuggingFaceEmbedder {
    http: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
    dimensions: usize,
}

impl HuggingFaceEmbedder {
    pub fn from_config(cfg: &EmbedderConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AgentError::Config("missing HuggingFace API key in embedder config".into()))?;
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|err| AgentError::Embedding(format!("http client error: {err}")))?,
            model: cfg.id.clone(),
            api_key,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            dimensions: cfg.dimensions,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}/pipeline/feature-extraction", self.base_url, self.model)
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(model = %self.model, chars = text.len(), "huggingface embedding");
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&json!({ "inputs": text, "options": { "wait_for_model": true } }))
            .send()
            .await
            .map_err(|err| AgentError::Embedding(format!("HuggingFace request failed: {err}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Embedding(format!(
                "HuggingFace request failed with {status}: {body}"
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|err| AgentError::Embedding(format!("HuggingFace parse error: {err}")))?;
        let embedding = pool_embedding(&body).ok_or_else(|| {
            AgentError::Embedding("HuggingFace returned an unexpected embedding shape".into())
        })?;

        if embedding.len() != self.dimensions {
            return Err(AgentError::Embedding(format!(
                "expected {} dimensions from `{}`, got {}",
                self.dimensions,
                self.model,
                embedding.len()
            )));
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Accepts a sentence vector `[f]`, token vectors `[[f]]` (mean-pooled) or a
/// batch of one `[[[f]]]`.
fn pool_embedding(value: &Value) -> Option<Vec<f32>> {
    let items = value.as_array()?;
    match items.first()? {
        Value::Number(_) => items.iter().map(|v| v.as_f64().map(|f| f as f32)).collect(),
        Value::Array(inner) if inner.first().map_or(false, Value::is_array) => {
            if items.len() == 1 {
                pool_embedding(&items[0])
            } else {
                None
            }
        }
        Value::Array(_) => {
            let rows: Vec<Vec<f32>> = items
                .iter()
                .map(pool_embedding)
                .collect::<Option<Vec<_>>>()?;
            let width = rows.first()?.len();
            if rows.iter().any(|row| row.len() != width) {
                return None;
            }
            let mut mean = vec![0.0f32; width];
            for row in &rows {
                for (acc, v) in mean.iter_mut().zip(row) {
                    *acc += v;
                }
            }
            let count = rows.len() as f32;
            mean.iter_mut().for_each(|v| *v /= count);
            Some(mean)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashing_embedder_is_normalised_and_case_insensitive() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("Vacation DAYS").await.unwrap();
        let b = embedder.embed("vacation days!").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn pools_token_level_outputs() {
        let sentence = json!([0.5, 1.0]);
        assert_eq!(pool_embedding(&sentence).unwrap(), vec![0.5, 1.0]);

        let tokens = json!([[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(pool_embedding(&tokens).unwrap(), vec![2.0, 3.0]);

        let batch = json!([[[1.0, 1.0], [3.0, 3.0]]]);
        assert_eq!(pool_embedding(&batch).unwrap(), vec![2.0, 2.0]);

        assert!(pool_embedding(&json!({"error": "loading"})).is_none());
    }
}
