//! OpenAI-compatible embedding client.
//!
//! Posts to `{api_base}/embeddings` with bearer auth. Transient failures
//! (transport errors, 429, 5xx) are retried with exponential backoff; auth
//! and request errors fail immediately.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kbq_core::config::EmbeddingSettings;
use kbq_core::traits::Embedder;
use kbq_core::{Error, Result};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

/// Known output sizes; anything else must be configured explicitly.
pub fn default_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

enum Failure {
    Retryable(String),
    Fatal(String),
}

pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
    request_dimensions: Option<usize>,
    max_retries: u32,
    initial_backoff: Duration,
    id: String,
}

impl OpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(Error::Config("missing required setting embedding.api_key".to_string()));
        }
        let dimensions = settings.dimensions.or_else(|| default_dimensions(&settings.model)).ok_or_else(|| {
            Error::Config(format!("embedding.dimensions is required for model '{}'", settings.model))
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", settings.api_base.trim().trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            dimensions,
            request_dimensions: settings.dimensions,
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(200),
            id: format!("openai:{}:d{}", settings.model, dimensions),
        })
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }

    fn send(&self, text: &str) -> std::result::Result<Vec<f32>, Failure> {
        let body = EmbedRequest { model: &self.model, input: vec![text], dimensions: self.request_dimensions };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| Failure::Retryable(format!("provider unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            let detail = detail.chars().take(200).collect::<String>();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Failure::Fatal(format!("authentication rejected ({status}): {detail}"))
                }
                StatusCode::TOO_MANY_REQUESTS => Failure::Retryable(format!("rate limited ({status})")),
                s if s.is_server_error() => Failure::Retryable(format!("provider returned {status}: {detail}")),
                _ => Failure::Fatal(format!("provider returned {status}: {detail}")),
            });
        }

        let parsed: EmbedResponse =
            response.json().map_err(|e| Failure::Fatal(format!("malformed provider response: {e}")))?;
        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Failure::Fatal("provider returned no embeddings".to_string()))?;
        if embedding.len() != self.dimensions {
            return Err(Failure::Fatal(format!(
                "provider returned {} dimensions, expected {}",
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(embedding)
    }
}

impl Embedder for OpenAiEmbedder {
    fn id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { self.dimensions }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;
        loop {
            match self.send(text) {
                Ok(v) => return Ok(v),
                Err(Failure::Fatal(reason)) => return Err(Error::Embedding(reason)),
                Err(Failure::Retryable(reason)) if attempt >= self.max_retries => {
                    return Err(Error::Embedding(format!("{reason} (after {} attempts)", attempt + 1)));
                }
                Err(Failure::Retryable(reason)) => {
                    attempt += 1;
                    warn!(attempt, error = %reason, "embedding request failed, retrying");
                    std::thread::sleep(backoff);
                    backoff = backoff.saturating_mul(2);
                    debug!(backoff_ms = backoff.as_millis() as u64, "next embedding backoff");
                }
            }
        }
    }
}
