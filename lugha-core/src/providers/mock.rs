//! Scripted providers for tests and dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::embedding::LocalEmbedder;
use super::{EmbeddingProvider, GenerationOptions, GenerationProvider};
use crate::error::ProviderError;

/// Embedder with pinned vectors, injected failures and an optional delay.
///
/// Texts without a pinned vector or failure fall through to a [`LocalEmbedder`].
/// Every call is counted so tests can assert on reuse.
pub struct MockEmbedder {
    fallback: LocalEmbedder,
    vectors: HashMap<String, Vec<f32>>,
    failures: HashMap<String, ProviderError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            fallback: LocalEmbedder::new(dimensions),
            vectors: HashMap::new(),
            failures: HashMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    pub fn failing_on(mut self, text: impl Into<String>, error: ProviderError) -> Self {
        self.failures.insert(text.into(), error);
        self
    }

    /// Sleep before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Texts embedded so far, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(text.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failures.get(text) {
            return Err(err.clone());
        }
        if let Some(vector) = self.vectors.get(text) {
            return Ok(vector.clone());
        }
        Ok(self.fallback.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        self.fallback.dimensions()
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

/// Generator that replays queued replies, then a default reply.
pub struct MockGenerator {
    responses: Mutex<Vec<Result<String, ProviderError>>>,
    default_response: Result<String, ProviderError>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            default_response: Ok(String::new()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A generator that always answers with `text`.
    pub fn with_response(text: impl Into<String>) -> Self {
        Self {
            default_response: Ok(text.into()),
            ..Self::new()
        }
    }

    /// A generator whose every call fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            default_response: Err(error),
            ..Self::new()
        }
    }

    /// Queue a one-shot reply, served before the default.
    pub fn queue(self, reply: Result<String, ProviderError>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push(reply);
        }
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for MockGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self
            .responses
            .lock()
            .ok()
            .and_then(|mut r| (!r.is_empty()).then(|| r.remove(0)));
        queued.unwrap_or_else(|| self.default_response.clone())
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
