//! Generative backend interaction.
//!
//! The pipeline talks to the LLM through the [`Generate`] trait so the
//! summarization and chunking engines can be driven by an in-process fake in
//! tests. [`GeminiClient`] is the production implementation over the Gemini
//! REST `generateContent` endpoint.
//!
//! Retries are *not* handled here: the summarization engine owns its retry
//! policy because it must also record failures and track usage per attempt.

use crate::error::{NewsfeedError, Result};
use crate::models::Usage;
use crate::utils::truncate_for_log;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_TIMEOUT: Duration = Duration::from_secs(120);

/// One backend response: the generated text plus the tokens it cost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub usage: Usage,
}

/// Trait for async text generation.
///
/// `schema` is `Some` when the caller wants structured-output mode; the
/// backend should then return a JSON document matching it.
pub trait Generate {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        schema: Option<&Value>,
    ) -> impl Future<Output = Result<Generation>> + Send;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

impl GenerateResponse {
    fn into_generation(self) -> Result<Generation> {
        let usage = self
            .usage_metadata
            .map(|u| Usage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(NewsfeedError::Backend("response had no candidate text".into()));
        }
        Ok(Generation { text, usage })
    }
}

/// Gemini REST client.
///
/// Constructed once per run and passed by reference. A missing API key is
/// not an error until the first call, so runs that never summarise (or only
/// backfill tags) still work without one.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("newsfeed/", env!("CARGO_PKG_VERSION")))
            .timeout(GEMINI_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/{model}:generateContent", self.base_url.trim_end_matches('/'))
    }
}

impl Generate for GeminiClient {
    #[instrument(level = "info", skip_all, fields(model = %model, structured = schema.is_some()))]
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        schema: Option<&Value>,
    ) -> Result<Generation> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(NewsfeedError::MissingApiKey("GOOGLE_API_KEY"))?;

        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            generation_config: schema.map(|response_schema| GenerationConfig {
                response_mime_type: "application/json",
                response_schema,
            }),
        };

        let t0 = Instant::now();
        let url = self.endpoint(model);
        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let elapsed_ms = t0.elapsed().as_millis();

        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                elapsed_ms,
                body = %truncate_for_log(&detail, 300),
                "generateContent returned an error status"
            );
            return Err(NewsfeedError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let parsed: GenerateResponse = resp.json().await?;
        let generation = parsed.into_generation()?;
        debug!(
            elapsed_ms,
            input_tokens = generation.usage.input_tokens,
            output_tokens = generation.usage.output_tokens,
            response = %truncate_for_log(&generation.text, 200),
            "generateContent succeeded"
        );
        Ok(generation)
    }
}
