//! Provider handle caching.
//!
//! Building a provider client is cheap but not free (HTTP client pools, key
//! lookup), and a long-running harness asks for the same provider many times.
//! [`ProviderCache`] keys built handles by target language and a SHA-256 hash
//! of the provider configuration, so a config change always yields a fresh
//! handle. Nothing expires on its own; callers invalidate explicitly.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{EmbeddingConfig, GenerationConfig, RetryConfig};
use crate::error::ConfigError;
use crate::providers::{EmbeddingProvider, GenerationProvider, create_embedder, create_generator};

/// Identity of a cached provider handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub language: String,
    /// Hex SHA-256 of the serialized provider configuration.
    pub config_hash: String,
}

impl CacheKey {
    pub fn new(language: impl Into<String>, config: &impl Serialize) -> Result<Self, ConfigError> {
        let bytes = serde_json::to_vec(config).map_err(|e| ConfigError::ParseError {
            message: format!("cannot hash provider config: {e}"),
        })?;
        Ok(Self {
            language: language.into(),
            config_hash: format!("{:x}", Sha256::digest(&bytes)),
        })
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
}

impl CacheMetrics {
    /// Compute the hit rate as a fraction (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn accumulate(&mut self, other: &CacheMetrics) {
        self.hits += other.hits;
        self.misses += other.misses;
    }
}

struct CacheState<P: ?Sized> {
    entries: HashMap<CacheKey, Arc<P>>,
    metrics: CacheMetrics,
}

/// Thread-safe map from [`CacheKey`] to a shared provider handle.
pub struct ProviderCache<P: ?Sized> {
    state: Mutex<CacheState<P>>,
}

impl<P: ?Sized> Default for ProviderCache<P> {
    fn default() -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                metrics: CacheMetrics::default(),
            }),
        }
    }
}

impl<P: ?Sized> ProviderCache<P> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<P>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached handle or build, store and return a new one.
    /// A failed build is not cached.
    pub fn get_or_try_init<E>(
        &self,
        key: &CacheKey,
        init: impl FnOnce() -> Result<Arc<P>, E>,
    ) -> Result<Arc<P>, E> {
        let mut state = self.lock();
        if let Some(handle) = state.entries.get(key).cloned() {
            state.metrics.hits += 1;
            return Ok(handle);
        }
        state.metrics.misses += 1;
        let handle = init()?;
        state.entries.insert(key.clone(), Arc::clone(&handle));
        tracing::debug!(
            language = key.language.as_str(),
            config_hash = key.config_hash.get(..12).unwrap_or_default(),
            "Cached new provider handle"
        );
        Ok(handle)
    }

    /// Cached handle without counting a hit or miss.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<P>> {
        self.lock().entries.get(key).cloned()
    }

    /// Drop one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    /// Drop every entry for a language. Returns how many were removed.
    pub fn invalidate_language(&self, language: &str) -> usize {
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|k, _| k.language != language);
        before - state.entries.len()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.lock().metrics
    }
}

/// Embedding and generation caches behind the provider factories.
#[derive(Default)]
pub struct ProviderRegistry {
    embedders: ProviderCache<dyn EmbeddingProvider>,
    generators: ProviderCache<dyn GenerationProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn embedder(
        &self,
        language: &str,
        config: &EmbeddingConfig,
        retry: &RetryConfig,
    ) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
        let key = CacheKey::new(language, &(config, retry))?;
        self.embedders
            .get_or_try_init(&key, || create_embedder(config, retry))
    }

    pub fn generator(
        &self,
        language: &str,
        config: &GenerationConfig,
        retry: &RetryConfig,
    ) -> Result<Arc<dyn GenerationProvider>, ConfigError> {
        let key = CacheKey::new(language, &(config, retry))?;
        self.generators
            .get_or_try_init(&key, || create_generator(config, retry))
    }

    pub fn clear(&self) {
        self.embedders.clear();
        self.generators.clear();
    }

    /// Combined counters for both caches.
    pub fn metrics(&self) -> CacheMetrics {
        let mut metrics = self.embedders.metrics();
        metrics.accumulate(&self.generators.metrics());
        metrics
    }
}
