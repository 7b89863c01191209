//! Language model access
//!
//! The pipeline only needs `prompt in -> text out`, captured by the
//! [`LanguageModel`] trait. [`GeminiClient`] is the production
//! implementation over the Google Generative Language REST API.

use crate::config::LlmConfig;
use crate::PdfError;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A text-completion model
pub trait LanguageModel {
    /// Send a single prompt and return the model's raw text reply
    fn generate(&self, prompt: &str) -> Result<String, PdfError>;
}

impl<M: LanguageModel + ?Sized> LanguageModel for &M {
    fn generate(&self, prompt: &str) -> Result<String, PdfError> {
        (**self).generate(prompt)
    }
}

impl<M: LanguageModel + ?Sized> LanguageModel for Box<M> {
    fn generate(&self, prompt: &str) -> Result<String, PdfError> {
        (**self).generate(prompt)
    }
}

/// Blocking client for Gemini `generateContent`
pub struct GeminiClient {
    config: LlmConfig,
    http_client: Client,
}

impl GeminiClient {
    pub fn new(config: LlmConfig) -> Result<Self, PdfError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(config.api_key())
            .map_err(|_| PdfError::Config("API key contains invalid characters".to_string()))?;
        headers.insert("x-goog-api-key", key);

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds()))
            .default_headers(headers)
            .build()
            .map_err(|e| PdfError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }
}

impl LanguageModel for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, PdfError> {
        log::debug!(
            "Sending {} character prompt to {}",
            prompt.len(),
            self.config.model()
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
                role: Some("user".to_string()),
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature(),
            },
        };

        let response = self
            .http_client
            .post(self.config.generate_content_url())
            .json(&request)
            .send()
            .map_err(|e| PdfError::Llm {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) if status.as_u16() == 429 => {
                    format!("rate limit exceeded: {}", err.error.message)
                }
                Ok(err) => format!("{} ({})", err.error.message, err.error.status),
                Err(_) => format!("API request failed: {} - {}", status, body),
            };
            return Err(PdfError::Llm {
                message,
                status: Some(status.as_u16()),
            });
        }

        let body: GenerateContentResponse = response.json().map_err(|e| PdfError::Llm {
            message: format!("Invalid response body: {}", e),
            status: Some(status.as_u16()),
        })?;

        Ok(body.text())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate
    fn text(&self) -> String {
        self.candidates
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}
