//! Ollama HTTP client and the provider implementations built on it
//!
//! One `OllamaClient` is shared by the vision judge, the embedder and the
//! metadata model. Retries are not done here; the pipeline's stage policy
//! owns retry and timeout decisions.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingConfig, MetadataConfig, OllamaConfig, VisionConfig};
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::llm::{LlmProvider, VisionModel};

const PROVIDER: &str = "ollama";

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    stream: bool,
    options: GenerateOptions,
}

/// Sampling options forwarded to `/api/generate`
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Non-streaming completion, optionally with base64-encoded images
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        images: &[&[u8]],
        options: GenerateOptions,
    ) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model,
            prompt,
            images: images
                .iter()
                .map(|img| base64::engine::general_purpose::STANDARD.encode(img))
                .collect(),
            stream: false,
            options,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("Generation", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                PROVIDER,
                format!("Generation failed: HTTP {} - {}", status, body),
            ));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("Failed to parse generation response: {}", e)))?;

        Ok(generated.response.trim().to_string())
    }

    /// Single-text embedding
    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest { model, prompt: text })
            .send()
            .await
            .map_err(|e| transport_error("Embedding", e))?;

        if !response.status().is_success() {
            return Err(Error::provider(
                PROVIDER,
                format!("Embedding failed: HTTP {}", response.status()),
            ));
        }

        let embedded: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("Failed to parse embedding response: {}", e)))?;

        Ok(embedded.embedding)
    }
}

fn transport_error(operation: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::provider(PROVIDER, format!("{} request timed out: {}", operation, e))
    } else {
        Error::provider(PROVIDER, format!("{} request failed: {}", operation, e))
    }
}

/// Ollama embedding provider
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(client: Arc<OllamaClient>, config: &EmbeddingConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            dimensions: config.dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.client.embed(&self.model, text).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Ollama text model for metadata extraction
pub struct OllamaLlm {
    client: Arc<OllamaClient>,
    model: String,
    options: GenerateOptions,
}

impl OllamaLlm {
    pub fn new(client: Arc<OllamaClient>, config: &MetadataConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            options: GenerateOptions {
                temperature: config.temperature,
                top_p: config.top_p,
                num_ctx: Some(config.context_size),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        tracing::debug!("Generating with model: {}", self.model);
        self.client.generate(&self.model, prompt, &[], self.options).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Ollama vision model (llava) for quality judgment
pub struct OllamaVision {
    client: Arc<OllamaClient>,
    model: String,
    options: GenerateOptions,
}

impl OllamaVision {
    pub fn new(client: Arc<OllamaClient>, config: &VisionConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            options: GenerateOptions {
                temperature: config.temperature,
                top_p: config.top_p,
                num_ctx: None,
            },
        }
    }
}

#[async_trait]
impl VisionModel for OllamaVision {
    async fn judge_image(&self, png: &[u8], prompt: &str) -> Result<String> {
        self.client.generate(&self.model, prompt, &[png], self.options).await
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_shape() {
        let png: &[u8] = b"\x89PNG";
        let request = GenerateRequest {
            model: "llava",
            prompt: "judge",
            images: vec![base64::engine::general_purpose::STANDARD.encode(png)],
            stream: false,
            options: GenerateOptions { temperature: 0.1, top_p: 0.9, num_ctx: None },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["images"][0], "iVBORw==");
        assert!(json["options"].get("num_ctx").is_none());
    }

    #[test]
    fn text_requests_omit_images() {
        let request = GenerateRequest {
            model: "llama3.1:latest",
            prompt: "extract",
            images: Vec::new(),
            stream: false,
            options: GenerateOptions { temperature: 0.1, top_p: 0.9, num_ctx: Some(4096) },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("images").is_none());
        assert_eq!(json["options"]["num_ctx"], 4096);
    }

    #[tokio::test]
    async fn unreachable_server_is_unhealthy() {
        let client = OllamaClient::new(&OllamaConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 1,
        })
        .unwrap();
        assert!(!client.health_check().await.unwrap());
    }
}
