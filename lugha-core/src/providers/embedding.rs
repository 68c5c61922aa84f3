//! Embedding provider clients.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{EmbeddingProvider, map_http_error, map_transport_error, with_retry};
use crate::config::{EmbeddingConfig, RetryConfig};
use crate::error::{ConfigError, ProviderError};

/// The default Google Gemini API base URL.
pub(crate) const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Offline embedder: hashed term frequencies, L2-normalised.
///
/// Deterministic and network-free. Good enough for smoke-testing a batch
/// file; not a substitute for a semantic model.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Synchronous embedding, used by the async trait impl and by tests.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            let idx = djb2(term) % self.dimensions;
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

fn djb2(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

/// Google Gemini embedding client (`models/{model}:embedContent`).
pub struct GeminiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl GeminiEmbedder {
    pub fn new(
        config: &EmbeddingConfig,
        api_key: String,
        retry: RetryConfig,
    ) -> Result<Self, ConfigError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        let dims = match config.model.as_str() {
            "text-embedding-004" | "embedding-001" => 768,
            "gemini-embedding-001" => 3072,
            _ => 768,
        };
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            dims,
            retry,
            request_timeout,
        })
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    fn request_body(&self, text: &str) -> Value {
        serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
        })
    }

    /// Extract `embedding.values` from an `embedContent` response.
    fn parse_response(body: &Value) -> Result<Vec<f32>, ProviderError> {
        let values = body["embedding"]["values"]
            .as_array()
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "Missing 'embedding.values' in response".to_string(),
            })?;
        values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| ProviderError::ResponseParse {
                        message: format!("Non-numeric embedding component: {v}"),
                    })
            })
            .collect()
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = self.endpoint_url();
        debug!(model = self.model.as_str(), chars = text.len(), "Sending Gemini embedding request");

        let response = self
            .client
            .post(&url)
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.request_timeout))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, self.request_timeout))?;
        if !status.is_success() {
            return Err(map_http_error("Gemini", status, &body_text));
        }

        let json: Value = serde_json::from_str(&body_text).map_err(|e| ProviderError::ResponseParse {
            message: format!("Invalid JSON in response: {e}"),
        })?;
        Self::parse_response(&json)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        with_retry(&self.retry, || self.embed_once(text)).await
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_embedder_dimensions() {
        let embedder = LocalEmbedder::new(128);
        assert_eq!(embedder.embed_text("hello world").len(), 128);
    }

    #[test]
    fn test_local_embedder_normalized() {
        let v = LocalEmbedder::new(128).embed_text("Habari ya asubuhi rafiki yangu");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01, "expected unit norm, got {norm}");
    }

    #[test]
    fn test_local_embedder_empty_text_is_zero() {
        let v = LocalEmbedder::new(16).embed_text("");
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_local_embedder_deterministic_and_case_insensitive() {
        let e = LocalEmbedder::new(64);
        assert_eq!(e.embed_text("Same Text"), e.embed_text("same text"));
        assert_ne!(e.embed_text("hello world"), e.embed_text("goodbye universe"));
    }

    #[test]
    fn test_local_embedder_zero_dimensions_clamped() {
        assert_eq!(LocalEmbedder::new(0).dimensions(), 1);
    }

    #[tokio::test]
    async fn test_local_embedder_trait_object() {
        let embedder: Box<dyn EmbeddingProvider> = Box::new(LocalEmbedder::new(8));
        assert_eq!(embedder.provider_name(), "local");
        assert_eq!(embedder.embed("test").await.unwrap().len(), 8);
    }

    #[test]
    fn test_gemini_parse_response() {
        let body = serde_json::json!({ "embedding": { "values": [0.1, -0.2, 0.3] } });
        let v = GeminiEmbedder::parse_response(&body).unwrap();
        assert_eq!(v.len(), 3);
        assert!((v[1] + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_gemini_parse_response_missing_values() {
        let body = serde_json::json!({ "error": { "message": "quota" } });
        assert!(matches!(
            GeminiEmbedder::parse_response(&body),
            Err(ProviderError::ResponseParse { .. })
        ));
    }

    #[test]
    fn test_gemini_request_shape() {
        let embedder =
            GeminiEmbedder::new(&EmbeddingConfig::default(), "k".into(), RetryConfig::default())
                .unwrap();
        assert_eq!(embedder.dimensions(), 768);
        assert!(
            embedder
                .endpoint_url()
                .ends_with("/models/text-embedding-004:embedContent?key=k")
        );
        let body = embedder.request_body("jambo");
        assert_eq!(body["model"], "models/text-embedding-004");
        assert_eq!(body["content"]["parts"][0]["text"], "jambo");
    }

    #[test]
    fn test_gemini_request_timeout_from_config() {
        let config = EmbeddingConfig {
            request_timeout_secs: 7,
            ..Default::default()
        };
        let embedder = GeminiEmbedder::new(&config, "k".into(), RetryConfig::default()).unwrap();
        assert_eq!(embedder.request_timeout, Duration::from_secs(7));
    }
}
