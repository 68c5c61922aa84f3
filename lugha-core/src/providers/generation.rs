//! Generation provider clients.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::embedding::GEMINI_BASE_URL;
use super::{GenerationOptions, GenerationProvider, map_http_error, map_transport_error, with_retry};
use crate::config::{GenerationConfig, RetryConfig};
use crate::error::{ConfigError, ProviderError};

/// Google Gemini text generation client (`models/{model}:generateContent`).
pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl GeminiGenerator {
    pub fn new(
        config: &GenerationConfig,
        api_key: String,
        retry: RetryConfig,
    ) -> Result<Self, ConfigError> {
        // Per-request timeouts come from GenerationOptions.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            retry,
        })
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    fn request_body(prompt: &str, options: &GenerationOptions) -> Value {
        let mut generation_config = serde_json::json!({
            "temperature": options.temperature,
        });
        if let Some(max_tokens) = options.max_tokens {
            generation_config["maxOutputTokens"] = serde_json::json!(max_tokens);
        }
        serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        })
    }

    /// Concatenate the text parts of the first candidate.
    ///
    /// A candidate without parts (e.g. blocked by safety filters) yields empty
    /// text, which is a valid if unhelpful result.
    fn parse_response(body: &Value) -> Result<String, ProviderError> {
        let candidates = body["candidates"]
            .as_array()
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "Missing 'candidates' array in response".to_string(),
            })?;
        let Some(candidate) = candidates.first() else {
            return Ok(String::new());
        };
        let text = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(text)
    }

    async fn generate_once(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        debug!(
            model = self.model.as_str(),
            prompt_chars = prompt.len(),
            "Sending Gemini generation request"
        );

        let response = self
            .client
            .post(self.endpoint_url())
            .timeout(options.timeout)
            .json(&Self::request_body(prompt, options))
            .send()
            .await
            .map_err(|e| map_transport_error(e, options.timeout))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, options.timeout))?;
        if !status.is_success() {
            return Err(map_http_error("Gemini", status, &body_text));
        }

        let json: Value =
            serde_json::from_str(&body_text).map_err(|e| ProviderError::ResponseParse {
                message: format!("Invalid JSON in response: {e}"),
            })?;
        Self::parse_response(&json)
    }
}

#[async_trait]
impl GenerationProvider for GeminiGenerator {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        with_retry(&self.retry, || self.generate_once(prompt, options)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Stand-in used when no generation backend is configured. Every call fails,
/// so generation-graded metrics fall back or report unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullGenerator;

#[async_trait]
impl GenerationProvider for NullGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Request {
            message: "no generation provider configured".into(),
        })
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_joins_parts() {
        let body = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "0." }, { "text": "75" }] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(GeminiGenerator::parse_response(&body).unwrap(), "0.75");
    }

    #[test]
    fn test_parse_response_blocked_candidate_is_empty() {
        let body = serde_json::json!({ "candidates": [{ "finishReason": "SAFETY" }] });
        assert_eq!(GeminiGenerator::parse_response(&body).unwrap(), "");
    }

    #[test]
    fn test_parse_response_no_candidates_is_empty() {
        let body = serde_json::json!({ "candidates": [] });
        assert_eq!(GeminiGenerator::parse_response(&body).unwrap(), "");
    }

    #[test]
    fn test_parse_response_missing_candidates() {
        let body = serde_json::json!({ "promptFeedback": {} });
        assert!(GeminiGenerator::parse_response(&body).is_err());
    }

    #[test]
    fn test_request_body() {
        let options = GenerationOptions {
            temperature: 0.0,
            max_tokens: Some(8),
            timeout: Duration::from_secs(5),
        };
        let body = GeminiGenerator::request_body("grade this", &options);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "grade this");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8);
        assert_eq!(body["generationConfig"]["temperature"], 0.0);
    }

    #[test]
    fn test_default_request_has_no_token_cap() {
        let options = GenerationOptions::from(&GenerationConfig::default());
        let body = GeminiGenerator::request_body("x", &options);
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[tokio::test]
    async fn test_null_generator_fails() {
        let result = NullGenerator
            .generate("prompt", &GenerationOptions::default())
            .await;
        assert!(matches!(result, Err(ProviderError::Request { .. })));
    }
}
