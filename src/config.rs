//! LLM configuration
//!
//! Settings are held in an explicit [`LlmConfig`] value that callers pass to
//! the model client. [`LlmConfig::from_env`] is the only place the process
//! environment is consulted.

use crate::PdfError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_API_VERSION: &str = "v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

pub const API_KEY_VAR: &str = "GOOGLE_GENAI_API_KEY";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    api_key: String,
    model: String,
    base_url: String,
    api_version: String,
    temperature: f32,
    timeout_seconds: u64,
}

impl LlmConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Result<Self, PdfError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(PdfError::Config("API key cannot be empty".to_string()));
        }

        Ok(Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        })
    }

    /// Build a configuration from the environment, loading `.env` first.
    ///
    /// A missing API key is fatal: no pipeline stage can run without it.
    pub fn from_env() -> Result<Self, PdfError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PdfError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR).ok_or_else(|| {
            PdfError::Config(format!(
                "Google GenAI API key not found. Please set {} in your .env file or environment variables.",
                API_KEY_VAR
            ))
        })?;

        let mut config = Self::new(api_key)?;

        if let Some(model) = lookup("GOOGLE_GENAI_MODEL").filter(|v| !v.is_empty()) {
            config.model = model;
        }

        if let Some(base_url) = lookup("GOOGLE_GENAI_BASE_URL").filter(|v| !v.is_empty()) {
            config.base_url = base_url;
        }

        if let Some(raw) = lookup("GOOGLE_GENAI_TEMPERATURE") {
            match raw.parse::<f32>() {
                Ok(t) => config.temperature = t,
                Err(_) => log::warn!("Ignoring invalid GOOGLE_GENAI_TEMPERATURE: {}", raw),
            }
        }

        if let Some(raw) = lookup("GOOGLE_GENAI_TIMEOUT_SECONDS") {
            match raw.parse::<u64>() {
                Ok(t) => config.timeout_seconds = t,
                Err(_) => log::warn!("Ignoring invalid GOOGLE_GENAI_TIMEOUT_SECONDS: {}", raw),
            }
        }

        Ok(config)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Endpoint for `generateContent` on the configured model
    pub fn generate_content_url(&self) -> String {
        format!(
            "{}/{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.api_version,
            self.model
        )
    }
}
