//! DeepSeek (OpenAI-compatible) chat/completions batch client.
//! One request per batch: texts are numbered, joined with a separator and
//! sent with an instruction to answer one numbered line per input.
//! Retries 429 and 5xx with backoff; every other failure is final.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{BatchTranslator, TranslateError};
use crate::config::ApiConfig;

/// Joins the numbered texts inside the user message.
pub const BATCH_SEPARATOR: &str = "\n---\n";

const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 30_000;

pub struct DeepSeekClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f64,
    max_retries: u32,
    system_prompt: String,
    user_preamble: String,
}

impl DeepSeekClient {
    pub fn new(api: &ApiConfig, api_key: impl Into<String>) -> Result<Self, TranslateError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(TranslateError::Config("API key is empty".into()));
        }

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()
            .map_err(|e| TranslateError::Config(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            endpoint: format!("{}/chat/completions", api.base_url.trim_end_matches('/')),
            model: api.model.clone(),
            temperature: api.temperature,
            max_retries: api.max_retries,
            system_prompt: system_prompt(&api.source_language, &api.target_language),
            user_preamble: format!(
                "Translate the following texts from {} to {}, keeping the same numbering format:",
                api.source_language, api.target_language
            ),
        })
    }

    /// Create a client with the key from `DEEPSEEK_API_KEY`.
    pub fn from_env(api: &ApiConfig) -> Result<Self, TranslateError> {
        let api_key = std::env::var("DEEPSEEK_API_KEY").map_err(|_| {
            TranslateError::Config("DEEPSEEK_API_KEY environment variable not set".into())
        })?;
        Self::new(api, api_key)
    }

    fn build_request<'a>(&'a self, texts: &[String]) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            stream: false,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("{}\n{}", self.user_preamble, number_texts(texts)),
                },
            ],
        }
    }

    /// One attempt: POST, check status, extract the first choice's content.
    async fn send_once(
        &self,
        request: &ChatCompletionRequest<'_>,
    ) -> Result<String, TranslateError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranslateError::Timeout
                } else {
                    TranslateError::Api(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(0);
            return Err(TranslateError::RateLimited { retry_after_ms });
        }

        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                TranslateError::Timeout
            } else {
                TranslateError::Api(e.to_string())
            }
        })?;
        if status.is_server_error() {
            return Err(TranslateError::Server {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }
        if !status.is_success() {
            return Err(TranslateError::Api(format!(
                "unexpected status {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        extract_content(&body)
    }
}

#[async_trait]
impl BatchTranslator for DeepSeekClient {
    async fn translate_batch(&self, texts: &[String]) -> Result<String, TranslateError> {
        let request = self.build_request(texts);
        debug!(count = texts.len(), model = %self.model, "calling chat/completions");

        let mut attempt: u32 = 0;
        loop {
            match self.send_once(&request).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let wait = match &e {
                        TranslateError::RateLimited { retry_after_ms } if *retry_after_ms > 0 => {
                            Duration::from_millis(*retry_after_ms)
                        }
                        _ => backoff(attempt),
                    };
                    warn!(
                        attempt,
                        error = %e,
                        wait_ms = wait.as_millis() as u64,
                        "translation request failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn system_prompt(source_language: &str, target_language: &str) -> String {
    format!(
        "You are a helpful assistant that translates {source_language} text to {target_language}. \
         Please translate each text separately and maintain the numbering. \
         Return only the translations, one per line, with the same numbering format: \
         '1. translation', '2. translation', etc."
    )
}

/// `1. a\n---\n2. b`: 1-based ordinals in request order.
pub fn number_texts(texts: &[String]) -> String {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("{}. {}", i + 1, text))
        .collect::<Vec<_>>()
        .join(BATCH_SEPARATOR)
}

/// Pull `choices[0].message.content` out of a response body.
fn extract_content(body: &str) -> Result<String, TranslateError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| TranslateError::InvalidResponse(format!("failed to parse response: {e}")))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| TranslateError::InvalidResponse("no choices in API response".into()))?;
    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(TranslateError::InvalidResponse("empty content in first choice".into())),
    }
}

/// 500ms, 1s, 2s, ... capped at 30s.
fn backoff(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f64,
    stream: bool,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
}

#[derive(Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
