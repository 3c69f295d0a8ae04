//! Sink-independent page content built from an email record.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::normalize::header_date_iso;
use crate::pipeline::types::EmailRecord;
use crate::summarize::truncate_chars;

/// Longest summary snippet carried as a page property.
pub const SNIPPET_CHARS: usize = 200;
/// Most bullets derived from the summary.
pub const MAX_BULLETS: usize = 5;
/// Largest text block the sink accepts.
pub const BLOCK_CHARS: usize = 2000;
/// Most links listed on a page.
pub const MAX_LINKS: usize = 10;

/// Everything a knowledge sink needs to render one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// For logs only; not rendered.
    pub message_id: String,
    pub title: String,
    pub sender: String,
    /// RFC 3339, when the record's date is parseable.
    pub date: Option<String>,
    /// RFC 3339.
    pub deadline: Option<String>,
    pub snippet: String,
    pub bullets: Vec<String>,
    pub body_blocks: Vec<String>,
    pub links: Vec<String>,
}

impl PageRequest {
    pub fn from_record(record: &EmailRecord, title: impl Into<String>) -> Self {
        let date = if DateTime::parse_from_rfc3339(&record.date).is_ok() {
            Some(record.date.clone())
        } else {
            header_date_iso(&record.date)
        };

        let bullets = record
            .summary
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .take(MAX_BULLETS)
            .map(str::to_string)
            .collect();

        let links = record
            .links
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .take(MAX_LINKS)
            .map(str::to_string)
            .collect();

        Self {
            message_id: record.message_id.clone(),
            title: title.into(),
            sender: record.sender.clone(),
            date,
            deadline: record.deadline.map(|d| d.to_rfc3339()),
            snippet: truncate_chars(&record.summary, SNIPPET_CHARS),
            bullets,
            body_blocks: split_blocks(&record.body, BLOCK_CHARS),
            links,
        }
    }
}

/// Consecutive pieces of at most `max_chars` characters.
fn split_blocks(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
