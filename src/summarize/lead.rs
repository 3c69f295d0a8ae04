//! Offline extractive engine: the leading sentences of the text.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{SummaryEngine, truncate_chars};
use crate::error::SummaryError;

static SENTENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?]+[.!?]*").expect("valid sentence regex"));

/// Keeps whole leading sentences while they fit in the character budget.
///
/// When even the first sentence is too long it is cut at the budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeadSentenceEngine;

#[async_trait]
impl SummaryEngine for LeadSentenceEngine {
    fn name(&self) -> &str {
        "lead"
    }

    async fn summarize(
        &self,
        text: &str,
        max_output_length: usize,
    ) -> Result<String, SummaryError> {
        let mut summary = String::new();
        for sentence in SENTENCE_RE.find_iter(text) {
            let sentence = sentence.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
            if sentence.is_empty() {
                continue;
            }
            if summary.is_empty() {
                if sentence.chars().count() > max_output_length {
                    return Ok(truncate_chars(&sentence, max_output_length));
                }
                summary = sentence;
                continue;
            }
            if summary.chars().count() + 1 + sentence.chars().count() > max_output_length {
                break;
            }
            summary.push(' ');
            summary.push_str(&sentence);
        }

        if summary.is_empty() {
            return Err(SummaryError::Empty {
                engine: "lead".to_string(),
            });
        }
        Ok(summary)
    }

    /// The subject as written; the lead sentence only when there is none.
    async fn title(
        &self,
        subject: &str,
        opening: &str,
        max_output_length: usize,
    ) -> Result<String, SummaryError> {
        let subject = subject.trim();
        if subject.is_empty() {
            self.summarize(opening, max_output_length).await
        } else {
            Ok(subject.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_sentences_within_budget() {
        let text = "The launch moved to May.\nPlease update the deck. Thanks for all the help!";
        let summary = LeadSentenceEngine.summarize(text, 50).await.unwrap();
        assert_eq!(summary, "The launch moved to May. Please update the deck.");
    }

    #[tokio::test]
    async fn long_first_sentence_is_cut() {
        let summary = LeadSentenceEngine
            .summarize("An extremely long opening sentence", 10)
            .await
            .unwrap();
        assert_eq!(summary, "An extreme");
    }

    #[tokio::test]
    async fn title_is_the_subject() {
        let title = LeadSentenceEngine
            .title(
                "Quarterly report for the regional sales teams, second half",
                "Please submit the report by next Monday.",
                20,
            )
            .await
            .unwrap();
        assert_eq!(title, "Quarterly report for the regional sales teams, second half");
    }

    #[tokio::test]
    async fn title_without_subject_uses_opening() {
        let title = LeadSentenceEngine
            .title("  ", "Lunch moved to noon. See you there.", 60)
            .await
            .unwrap();
        assert_eq!(title, "Lunch moved to noon. See you there.");
    }

    #[tokio::test]
    async fn summarizer_title_has_no_prompt_label() {
        let summarizer = crate::summarize::Summarizer::new(std::sync::Arc::new(LeadSentenceEngine));
        let title = summarizer
            .title("Quarterly report", "Please submit the report by next Monday.")
            .await;
        assert_eq!(title, "Quarterly report");
    }

    #[tokio::test]
    async fn blank_text_is_empty_error() {
        let err = LeadSentenceEngine.summarize(" \n ", 10).await.unwrap_err();
        assert!(matches!(err, SummaryError::Empty { .. }));
    }
}
