//! Date candidate extraction: whole text, pattern library, keyword sentences.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use super::grammar::{parse_exact, parse_scan};
use super::{DateMethod, ExtractedDate};

/// Maximum number of date candidates kept.
pub const MAX_DATES: usize = 5;

const FULL_TEXT_CONFIDENCE: f64 = 0.8;
const PATTERN_CONFIDENCE: f64 = 0.9;
const KEYWORD_CONFIDENCE: f64 = 0.7;

/// Longest prefix of the body quoted by a whole-text candidate.
const FULL_TEXT_QUOTE_CHARS: usize = 100;

#[derive(Debug, Clone, Copy)]
enum ParseMode {
    Exact,
    Scan,
}

struct DatePattern {
    regex: Regex,
    mode: ParseMode,
}

static DATE_PATTERNS: LazyLock<Vec<DatePattern>> = LazyLock::new(|| {
    const WEEKDAYS: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";
    const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

    let exact = |pattern: String| DatePattern {
        regex: Regex::new(&format!("(?i){pattern}")).expect("valid date pattern"),
        mode: ParseMode::Exact,
    };

    vec![
        // Relative weekdays and units
        exact(format!(r"\b(?:next|this|last)\s+(?:{WEEKDAYS}|week|month|year)\b")),
        exact(r"\b(?:tomorrow|yesterday|today)\b".to_string()),
        // Month-day and day-month
        exact(format!(r"\b(?:{MONTHS})\.?\s+\d{{1,2}}(?:st|nd|rd|th)?\b")),
        exact(format!(r"\b\d{{1,2}}(?:st|nd|rd|th)?\s+(?:{MONTHS})\b")),
        // Numeric forms
        exact(r"\b\d{1,2}/(?:\d{4}|\d{1,2}(?:/(?:\d{4}|\d{2}))?)\b".to_string()),
        exact(r"\b\d{1,2}-\d{1,2}-(?:\d{4}|\d{2})\b".to_string()),
        exact(r"\b\d{4}-\d{1,2}-\d{1,2}\b".to_string()),
        // Signal-prefixed phrases
        exact(format!(
            r"\b(?:by|before|after|on|at)\s+(?:(?:next|this|last)\s+)?(?:{WEEKDAYS}|week|month|year)\b"
        )),
        exact(format!(
            r"\b(?:by|before|after|on|at)\s+\d{{1,2}}(?:st|nd|rd|th)?\s+(?:{MONTHS})\b"
        )),
        exact(r"\b(?:by|before|after|on|at)\s+\d{1,2}/\d{1,2}(?:/(?:\d{4}|\d{2}))?\b".to_string()),
        // "due by: ..." / "deadline: ..." up to end of line
        DatePattern {
            regex: Regex::new(r"(?im)\b(?:due|deadline)\b[ \t]*(?:by|on|before)?[ \t]*:?[ \t]*[^\r\n]+")
                .expect("valid due pattern"),
            mode: ParseMode::Scan,
        },
    ]
});

static SENTENCE_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("valid sentence regex"));

// Whole words only: "online" or "debut" do not mark a deadline sentence.
static DEADLINE_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:deadline|due|by|before|after|on|at)\b").expect("valid keyword regex")
});

/// Extract up to [`MAX_DATES`] date candidates from `text`.
///
/// Candidates are ordered by descending confidence (stable), then
/// deduplicated by matched text so the highest-confidence occurrence wins.
pub fn extract_dates(text: &str, now: DateTime<Utc>) -> Vec<ExtractedDate> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut candidates = Vec::new();

    if let Some(instant) = parse_exact(text, now) {
        candidates.push(ExtractedDate {
            source_text: quote_prefix(text),
            parsed_instant: instant,
            confidence: FULL_TEXT_CONFIDENCE,
            method: DateMethod::FullText,
        });
    }

    for pattern in DATE_PATTERNS.iter() {
        for m in pattern.regex.find_iter(text) {
            let matched = m.as_str().trim_end();
            let parsed = match pattern.mode {
                ParseMode::Exact => parse_exact(matched, now),
                ParseMode::Scan => parse_scan(matched, now),
            };
            match parsed {
                Some(instant) => candidates.push(ExtractedDate {
                    source_text: matched.to_string(),
                    parsed_instant: instant,
                    confidence: PATTERN_CONFIDENCE,
                    method: DateMethod::PatternMatch,
                }),
                None => debug!(matched, "Date pattern matched but did not resolve"),
            }
        }
    }

    for sentence in SENTENCE_SPLIT_RE.split(text) {
        let sentence = sentence.trim();
        if sentence.is_empty() || !DEADLINE_KEYWORD_RE.is_match(sentence) {
            continue;
        }
        if let Some(instant) = parse_scan(sentence, now) {
            candidates.push(ExtractedDate {
                source_text: sentence.to_string(),
                parsed_instant: instant,
                confidence: KEYWORD_CONFIDENCE,
                method: DateMethod::KeywordContext,
            });
        }
    }

    rank(candidates)
}

fn rank(mut candidates: Vec<ExtractedDate>) -> Vec<ExtractedDate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.source_text.clone()));
    candidates.truncate(MAX_DATES);
    candidates
}

fn quote_prefix(text: &str) -> String {
    if text.chars().count() > FULL_TEXT_QUOTE_CHARS {
        let prefix: String = text.chars().take(FULL_TEXT_QUOTE_CHARS).collect();
        format!("{prefix}...")
    } else {
        text.to_string()
    }
}
