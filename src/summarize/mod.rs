//! Summarization orchestration.
//!
//! Inference is delegated to a [`SummaryEngine`]; this module owns chunking,
//! recombination and degrade-on-failure. The orchestrator never fails: a
//! failed engine call falls back to truncated input text.

pub mod http;
pub mod lead;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::SummaryError;

pub use http::{HttpSummaryEngine, SummaryApiConfig};
pub use lead::LeadSentenceEngine;

/// Largest chunk handed to the engine in one call, in characters.
pub const CHUNK_CHARS: usize = 3000;

/// Joined chunk summaries longer than this get one compression pass.
pub const COMPRESSION_THRESHOLD: usize = 2000;

/// Default output budget for body summaries.
pub const DEFAULT_SUMMARY_MAX_LEN: usize = 120;

const TITLE_MAX_LEN: usize = 60;
const TITLE_CAP_CHARS: usize = 100;
const FALLBACK_TITLE: &str = "Email Summary";

/// External summarization capability.
#[async_trait]
pub trait SummaryEngine: Send + Sync {
    /// Short engine name for logs and errors.
    fn name(&self) -> &str;

    /// Summarize `text` into roughly `max_output_length` units of output.
    async fn summarize(&self, text: &str, max_output_length: usize)
    -> Result<String, SummaryError>;

    /// One-line title from a subject and the opening lines of a body.
    async fn title(
        &self,
        subject: &str,
        opening: &str,
        max_output_length: usize,
    ) -> Result<String, SummaryError> {
        self.summarize(&format!("Subject: {subject}\n\n{opening}"), max_output_length)
            .await
    }
}

/// Split text into sequential windows of at most [`CHUNK_CHARS`] characters.
///
/// A window is cut after its last `.` when that cut lands past the window's
/// midpoint, otherwise at the window boundary. Chunks are trimmed and empty
/// ones dropped.
pub fn chunk_text(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= CHUNK_CHARS {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + CHUNK_CHARS).min(chars.len());
        let window = &chars[start..end];
        if let Some(pos) = window.iter().rposition(|c| *c == '.') {
            let cut = pos + 1;
            if cut > window.len() / 2 {
                end = start + cut;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        start = end;
    }
    chunks
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Chunking summarizer over a pluggable engine.
#[derive(Clone)]
pub struct Summarizer {
    engine: Arc<dyn SummaryEngine>,
}

impl Summarizer {
    pub fn new(engine: Arc<dyn SummaryEngine>) -> Self {
        Self { engine }
    }

    /// Summarize a body of any length.
    pub async fn summarize(&self, text: &str, max_len: usize) -> String {
        let chunks = chunk_text(text);
        if chunks.is_empty() {
            return String::new();
        }

        let mut summaries = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            summaries.push(self.summarize_or_truncate(chunk, max_len).await);
        }

        let combined = summaries.join("\n");
        if chunks.len() > 1 && combined.chars().count() > COMPRESSION_THRESHOLD {
            debug!(
                chunks = chunks.len(),
                chars = combined.chars().count(),
                "Compressing joined chunk summaries"
            );
            return self.summarize_or_truncate(&combined, max_len).await;
        }
        combined
    }

    /// One-line page title from the subject and the first lines of the body.
    ///
    /// Falls back to the subject, then the first body line, then a fixed
    /// placeholder when the engine fails or returns nothing.
    pub async fn title(&self, subject: &str, body: &str) -> String {
        let first_lines = body.lines().take(3).collect::<Vec<_>>().join("\n");

        match self.engine.title(subject, &first_lines, TITLE_MAX_LEN).await {
            Ok(raw) => {
                let title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
                if title.is_empty() {
                    fallback_title(subject, body)
                } else if title.chars().count() > TITLE_CAP_CHARS {
                    format!("{}...", truncate_chars(&title, TITLE_CAP_CHARS - 3))
                } else {
                    title
                }
            }
            Err(e) => {
                warn!(engine = self.engine.name(), error = %e, "Title generation failed, using fallback");
                fallback_title(subject, body)
            }
        }
    }

    async fn summarize_or_truncate(&self, text: &str, max_len: usize) -> String {
        match self.engine.summarize(text, max_len).await {
            Ok(summary) => summary.trim().to_string(),
            Err(e) => {
                warn!(
                    engine = self.engine.name(),
                    error = %e,
                    chars = text.chars().count(),
                    "Summary engine failed, truncating input"
                );
                truncate_chars(text, max_len)
            }
        }
    }
}

fn fallback_title(subject: &str, body: &str) -> String {
    let subject = subject.trim();
    if !subject.is_empty() {
        return truncate_chars(subject, TITLE_CAP_CHARS);
    }
    match body.lines().next().map(str::trim) {
        Some(line) if !line.is_empty() => truncate_chars(line, TITLE_CAP_CHARS),
        _ => FALLBACK_TITLE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every call and answers with a fixed reply (or fails).
    struct ScriptedEngine {
        reply: Option<String>,
        calls: Mutex<Vec<(usize, usize)>>,
    }

    impl ScriptedEngine {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(usize, usize)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SummaryEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn summarize(&self, text: &str, max: usize) -> Result<String, SummaryError> {
            self.calls.lock().unwrap().push((text.chars().count(), max));
            self.reply.clone().ok_or_else(|| SummaryError::RequestFailed {
                engine: "scripted".into(),
                reason: "offline".into(),
            })
        }
    }

    fn periodic_body(total: usize) -> String {
        let sentence = format!("{}. ", "x".repeat(198));
        sentence.repeat(total / 200)
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("  Hello there.  "), vec!["Hello there."]);
        assert!(chunk_text("   ").is_empty());
    }

    #[test]
    fn long_text_cuts_at_periods() {
        let body = periodic_body(7000);
        let chunks = chunk_text(&body);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= CHUNK_CHARS);
            assert!(chunk.ends_with('.'));
            assert!(chunk.chars().count() > CHUNK_CHARS / 2 || chunk == chunks.last().unwrap());
        }
    }

    #[test]
    fn hard_cut_without_late_period() {
        let body = format!("Intro. {}", "y".repeat(5000));
        let chunks = chunk_text(&body);
        assert_eq!(chunks[0].chars().count(), CHUNK_CHARS);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundaries() {
        let body = "é".repeat(4000);
        let chunks = chunk_text(&body);
        assert_eq!(chunks[0].chars().count(), 3000);
        assert_eq!(chunks[1].chars().count(), 1000);
    }

    #[tokio::test]
    async fn empty_text_skips_engine() {
        let engine = ScriptedEngine::replying("unused");
        let summarizer = Summarizer::new(engine.clone());
        assert_eq!(summarizer.summarize("", 120).await, "");
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn chunks_joined_with_newlines() {
        let engine = ScriptedEngine::replying(" short ");
        let summarizer = Summarizer::new(engine.clone());
        let summary = summarizer.summarize(&periodic_body(7000), 120).await;
        assert_eq!(summary, "short\nshort\nshort");
        assert_eq!(engine.calls().len(), 3);
    }

    #[tokio::test]
    async fn failure_degrades_to_truncation() {
        let engine = ScriptedEngine::failing();
        let summarizer = Summarizer::new(engine.clone());
        let summary = summarizer.summarize("Quarterly numbers are in. Revenue grew.", 10).await;
        assert_eq!(summary, "Quarterly ");
    }

    #[tokio::test]
    async fn long_join_gets_compressed() {
        let engine = ScriptedEngine::failing();
        let summarizer = Summarizer::new(engine.clone());
        // Chunks of 2999, 2999 and 999 chars truncate to 1000, 1000 and 999.
        let summary = summarizer.summarize(&periodic_body(7000), 1000).await;
        let calls = engine.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[3].0, 1000 + 1 + 1000 + 1 + 999);
        assert_eq!(summary.chars().count(), 1000);
    }

    #[tokio::test]
    async fn title_from_engine_is_collapsed() {
        let summarizer = Summarizer::new(ScriptedEngine::replying("  Budget\n review   due "));
        assert_eq!(summarizer.title("Budget", "body").await, "Budget review due");
    }

    #[tokio::test]
    async fn title_is_capped() {
        let summarizer = Summarizer::new(ScriptedEngine::replying(&"word ".repeat(40)));
        let title = summarizer.title("s", "b").await;
        assert_eq!(title.chars().count(), 100);
        assert!(title.ends_with("..."));
    }

    #[tokio::test]
    async fn title_fallbacks() {
        let summarizer = Summarizer::new(ScriptedEngine::failing());
        assert_eq!(summarizer.title("Invoice #42", "body").await, "Invoice #42");
        assert_eq!(summarizer.title("  ", "First line\nSecond").await, "First line");
        assert_eq!(summarizer.title("", "").await, "Email Summary");
    }
}
