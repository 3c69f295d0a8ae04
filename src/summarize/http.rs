//! OpenAI-compatible chat-completions summary engine.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use super::SummaryEngine;
use crate::config::env_value;
use crate::error::SummaryError;

const ENGINE_NAME: &str = "http";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection settings for an HTTP summary engine.
#[derive(Debug, Clone)]
pub struct SummaryApiConfig {
    /// Base URL; `/chat/completions` is appended.
    pub api_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout: Duration,
}

impl SummaryApiConfig {
    /// Load from `SUMMARY_API_URL`, `SUMMARY_API_KEY` and `SUMMARY_MODEL`.
    /// Returns `None` when no URL is configured.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(env_value)
    }

    /// Build from an arbitrary variable lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = var("SUMMARY_API_URL")?;
        let api_key = var("SUMMARY_API_KEY").map(SecretString::from);
        let model = var("SUMMARY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Some(Self {
            api_url,
            api_key,
            model,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }
}

/// Summary engine backed by a remote chat-completions endpoint.
pub struct HttpSummaryEngine {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl HttpSummaryEngine {
    pub fn new(config: SummaryApiConfig) -> Result<Self, SummaryError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SummaryError::RequestFailed {
                engine: ENGINE_NAME.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            model: config.model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl SummaryEngine for HttpSummaryEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn summarize(
        &self,
        text: &str,
        max_output_length: usize,
    ) -> Result<String, SummaryError> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&json!({
                "model": self.model,
                "messages": [
                    {
                        "role": "system",
                        "content": format!(
                            "Summarize the email the user sends. Reply with plain prose only, \
                             no more than {max_output_length} words."
                        )
                    },
                    {"role": "user", "content": text}
                ],
                "max_tokens": max_output_length * 2,
                "temperature": 0.0
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| SummaryError::RequestFailed {
                engine: ENGINE_NAME.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummaryError::RequestFailed {
                engine: ENGINE_NAME.to_string(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let result: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| SummaryError::InvalidResponse {
                    engine: ENGINE_NAME.to_string(),
                    reason: e.to_string(),
                })?;

        let content = result["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| SummaryError::InvalidResponse {
                engine: ENGINE_NAME.to_string(),
                reason: "missing choices[0].message.content".to_string(),
            })?
            .trim();

        if content.is_empty() {
            return Err(SummaryError::Empty {
                engine: ENGINE_NAME.to_string(),
            });
        }
        Ok(content.to_string())
    }
}
