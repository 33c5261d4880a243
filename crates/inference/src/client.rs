//! REST client for the model server's generation and tag endpoints.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default sampling temperature when the request does not set one.
const DEFAULT_TEMPERATURE: f64 = 0.7;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for a model server.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base HTTP URL, e.g. `http://localhost:11434`.
    pub base_url: String,
    /// Model name to generate with, e.g. `llama2`.
    pub model: String,
    /// Per-request timeout for generation calls.
    pub timeout: Duration,
}

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// A single generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// The user prompt.
    pub prompt: String,
    /// Optional system prompt.
    pub system: Option<String>,
    /// Sampling temperature; defaults to 0.7.
    pub temperature: Option<f64>,
    /// Maximum tokens to generate, unbounded if absent.
    pub max_tokens: Option<u32>,
}

/// The generated text plus token accounting.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    /// Generated text.
    pub text: String,
    /// Model that produced the response.
    pub model: String,
    /// Tokens consumed by the prompt, when reported.
    pub prompt_tokens: Option<u64>,
    /// Tokens generated, when reported.
    pub generated_tokens: Option<u64>,
}

/// Raw body of the server's `/api/generate` response.
#[derive(Debug, Deserialize)]
struct RawGenerateResponse {
    response: String,
    model: String,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

/// Raw body of the server's `/api/tags` response.
#[derive(Debug, Deserialize)]
struct RawTagsResponse {
    models: Vec<RawModelEntry>,
}

#[derive(Debug, Deserialize)]
struct RawModelEntry {
    name: String,
}

/// Body sent to `/api/generate`.
#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the inference client.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The model server returned a non-2xx status code.
    #[error("Inference API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

// ---------------------------------------------------------------------------
// InferenceClient
// ---------------------------------------------------------------------------

/// HTTP client for a single model server.
pub struct InferenceClient {
    client: reqwest::Client,
    config: InferenceConfig,
}

impl InferenceClient {
    /// Create a client with a pre-configured request timeout.
    pub fn new(config: InferenceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { client, config }
    }

    /// The configured model name.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Generate a completion for the given request.
    ///
    /// Sends `POST /api/generate` with streaming disabled and returns the
    /// full response text plus token counts.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, InferenceError> {
        let body = GenerateBody {
            model: &self.config.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.config.base_url))
            .json(&body)
            .send()
            .await?;

        let raw: RawGenerateResponse = Self::parse_response(response).await?;
        Ok(GenerationResponse {
            text: raw.response,
            model: raw.model,
            prompt_tokens: raw.prompt_eval_count,
            generated_tokens: raw.eval_count,
        })
    }

    /// List the model names available on the server (`GET /api/tags`).
    pub async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.config.base_url))
            .send()
            .await?;

        let raw: RawTagsResponse = Self::parse_response(response).await?;
        Ok(raw.models.into_iter().map(|m| m.name).collect())
    }

    // ---- private helpers ----

    /// Parse a successful JSON response body, or surface status and body
    /// text as an [`InferenceError::Api`].
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, InferenceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
