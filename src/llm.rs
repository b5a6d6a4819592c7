//! Answer generation
//!
//! Questions are answered by a Gemini model that only sees the retrieved
//! chunks. The trait lets tests (and other providers) stand in for Gemini.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;

/// Trait for LLM-based answer generation
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Answer `question` using only `context`
    async fn generate(&self, question: &str, context: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Grounding prompt sent with every question
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a knowledge assistant. Answer the following question based solely on the provided context. \
         Do not add information beyond the context. If the context doesn't contain enough information, say so.\n\n\
         Context:\n{}\n\n\
         Question:\n{}\n\n\
         Answer in a concise and accurate manner.",
        context, question
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Gemini wire format (shared with speech synthesis)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct GenerateRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Part {
    pub text: String,
}

impl GenerateRequest {
    pub fn user_text(text: &str) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part { text: text.to_string() }],
            }],
            generation_config: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Candidate {
    pub content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsePart {
    pub text: Option<String>,
    #[serde(rename = "inlineData")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

impl GenerateResponse {
    /// Parts of the first candidate
    pub fn into_parts(self) -> Vec<ResponsePart> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gemini client
// ─────────────────────────────────────────────────────────────────────────────

/// Gemini client via the Generative Language API
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Build a client from config; fails if the API key is not set
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(&config.base_url, &config.api_key()?, &config.model, config.timeout_secs)
    }

    pub fn new(base_url: &str, api_key: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    /// POST a generateContent request for `model`
    pub(crate) async fn generate_content(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse> {
        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .context("Gemini request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini returned {}: {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse Gemini response")
    }
}

#[async_trait]
impl AnswerGenerator for GeminiClient {
    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        let prompt = build_prompt(question, context);
        let response = self
            .generate_content(&self.model, &GenerateRequest::user_text(&prompt))
            .await?;

        let text: String = response
            .into_parts()
            .into_iter()
            .filter_map(|p| p.text)
            .collect();

        if text.trim().is_empty() {
            anyhow::bail!("No text in Gemini response");
        }
        Ok(text.trim().to_string())
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Stand-in used when Gemini is not configured; every call fails with `reason`
pub struct Unavailable {
    reason: String,
}

impl Unavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl AnswerGenerator for Unavailable {
    async fn generate(&self, _question: &str, _context: &str) -> Result<String> {
        anyhow::bail!("{}", self.reason)
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}
