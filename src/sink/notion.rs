//! Notion database sink.
//!
//! Each page is created in a fixed database with these properties:
//! - `Title` (title), `Sender` (rich text), `Date` and `Deadline` (date)
//! - `Status` (status, always "New")
//! - `Short Summary (about)` (rich text snippet)
//!
//! The page body holds the summary bullets, the full text as quote blocks
//! and a links section.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{KnowledgeSink, PageRequest};
use crate::error::SinkError;

const SINK_NAME: &str = "notion";
const DEFAULT_API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// Notion connection settings.
#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub token: SecretString,
    pub database_id: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl NotionConfig {
    /// Load from `NOTION_TOKEN` and `NOTION_DATABASE_ID`; `None` unless both are set.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("NOTION_TOKEN").ok().filter(|t| !t.is_empty())?;
        let database_id = std::env::var("NOTION_DATABASE_ID")
            .ok()
            .filter(|d| !d.is_empty())?;

        Some(Self {
            token: SecretString::from(token),
            database_id,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        })
    }
}

/// Writes one page per email into a Notion database.
pub struct NotionSink {
    client: Client,
    config: NotionConfig,
}

impl NotionSink {
    pub fn new(config: NotionConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SinkError::Unavailable {
                sink: SINK_NAME.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.api_base.trim_end_matches('/'))
    }

    /// Check that the token can read the configured database.
    pub async fn verify(&self) -> Result<(), SinkError> {
        let response = self
            .client
            .get(self.url(&format!("databases/{}", self.config.database_id)))
            .bearer_auth(self.config.token.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .map_err(|e| SinkError::Unavailable {
                sink: SINK_NAME.to_string(),
                reason: e.to_string(),
            })?;

        match response.status() {
            status if status.is_success() => {
                info!(database_id = %self.config.database_id, "Connected to Notion database");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(SinkError::Unavailable {
                sink: SINK_NAME.to_string(),
                reason: format!(
                    "database {} not found, check NOTION_DATABASE_ID",
                    self.config.database_id
                ),
            }),
            StatusCode::UNAUTHORIZED => Err(SinkError::Unavailable {
                sink: SINK_NAME.to_string(),
                reason: "invalid token, check NOTION_TOKEN".to_string(),
            }),
            status => Err(SinkError::Unavailable {
                sink: SINK_NAME.to_string(),
                reason: format!("HTTP {status}"),
            }),
        }
    }
}

fn rich_text(content: &str) -> Value {
    json!([{"type": "text", "text": {"content": content}}])
}

fn date_property(date: Option<&str>) -> Value {
    match date {
        Some(start) => json!({"date": {"start": start}}),
        None => json!({"date": null}),
    }
}

fn children(page: &PageRequest) -> Vec<Value> {
    let mut blocks: Vec<Value> = page
        .bullets
        .iter()
        .map(|b| {
            json!({
                "object": "block",
                "type": "bulleted_list_item",
                "bulleted_list_item": {"rich_text": rich_text(b)}
            })
        })
        .collect();

    if !page.body_blocks.is_empty() {
        blocks.push(json!({
            "object": "block",
            "type": "heading_3",
            "heading_3": {"rich_text": rich_text("Full Email Text")}
        }));
        blocks.extend(page.body_blocks.iter().map(|chunk| {
            json!({
                "object": "block",
                "type": "quote",
                "quote": {"rich_text": rich_text(chunk)}
            })
        }));
    }

    if !page.links.is_empty() {
        blocks.push(json!({
            "object": "block",
            "type": "heading_3",
            "heading_3": {"rich_text": rich_text("Links")}
        }));
        blocks.extend(page.links.iter().map(|link| {
            json!({
                "object": "block",
                "type": "bulleted_list_item",
                "bulleted_list_item": {
                    "rich_text": [{"type": "text", "text": {"content": link, "link": {"url": link}}}]
                }
            })
        }));
    }

    blocks
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl KnowledgeSink for NotionSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    async fn create_page(&self, page: &PageRequest) -> Result<String, SinkError> {
        let response = self
            .client
            .post(self.url("pages"))
            .bearer_auth(self.config.token.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
            .json(&self.render_payload(page))
            .send()
            .await
            .map_err(|e| SinkError::RequestFailed {
                sink: SINK_NAME.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SinkError::RateLimited {
                sink: SINK_NAME.to_string(),
                retry_after: retry_after(&response),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::RequestFailed {
                sink: SINK_NAME.to_string(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| SinkError::InvalidResponse {
                sink: SINK_NAME.to_string(),
                reason: e.to_string(),
            })?;

        let page_id = result["id"]
            .as_str()
            .ok_or_else(|| SinkError::InvalidResponse {
                sink: SINK_NAME.to_string(),
                reason: "response has no page id".to_string(),
            })?
            .to_string();

        debug!(message_id = %page.message_id, page_id = %page_id, "Notion page created");
        Ok(page_id)
    }

    fn render_payload(&self, page: &PageRequest) -> Value {
        json!({
            "parent": {"database_id": self.config.database_id},
            "properties": {
                "Title": {"title": rich_text(&page.title)},
                "Sender": {"rich_text": rich_text(&page.sender)},
                "Date": date_property(page.date.as_deref()),
                "Status": {"status": {"name": "New"}},
                "Deadline": date_property(page.deadline.as_deref()),
                "Short Summary (about)": {"rich_text": rich_text(&page.snippet)}
            },
            "children": children(page)
        })
    }
}
